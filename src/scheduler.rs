use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::collector::{collect_standings, CollectOptions};
use crate::config::Config;
use crate::error::WatchError;
use crate::extract::Extractor;
use crate::metrics::METRICS;
use crate::schema::{SessionPhase, SessionState, StandingsSnapshot};
use crate::session::BrowserSession;
use crate::store;
use crate::util;

/// ============================================================
/// Scheduler
/// ============================================================
///
/// The one owned poll state machine:
///
///     Uninitialized -> Authenticating -> Ready
///         -> Polling <-> Refreshing -> ... (indefinitely)
///
/// with Error reachable from any active state, resolving to
/// RetryBackoff (transient, loop continues) or Closed (fatal).
///
/// Design constraints:
/// - Exactly one browser session, owned here, never shared
/// - A new poll never starts while the previous one (including
///   its backoff) is in flight
/// - Every sleep checks the cancellation flag once per second
/// - External readers observe only the status watch channel and
///   the persisted snapshot directory
pub struct Scheduler {
    cfg: Config,
    extractor: Extractor,
    stop: Arc<AtomicBool>,
    status_tx: watch::Sender<SessionState>,
    state: SessionState,
    last_time_index: Option<i64>,
}

/// Cheap cloneable handle for the supervising context: request a
/// stop, read the current status. This is the only control
/// surface; scheduler internals stay private.
#[derive(Clone)]
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    status: watch::Receiver<SessionState>,
}

impl SchedulerHandle {
    /// Requests a cooperative stop. The loop exits within one
    /// sleep tick; an in-flight browser operation is allowed to
    /// complete first.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn status(&self) -> SessionState {
        self.status.borrow().clone()
    }
}

impl Scheduler {
    pub fn new(cfg: Config) -> (Self, SchedulerHandle) {
        let stop = Arc::new(AtomicBool::new(false));
        let (status_tx, status_rx) = watch::channel(SessionState::default());

        let handle = SchedulerHandle { stop: stop.clone(), status: status_rx };
        let scheduler = Self {
            cfg,
            extractor: Extractor::default(),
            stop,
            status_tx,
            state: SessionState::default(),
            last_time_index: None,
        };
        (scheduler, handle)
    }

    /// Runs the poll loop until cancellation or a fatal error.
    /// Consumes the scheduler: one instance drives one session,
    /// once.
    pub async fn run(mut self) -> Result<(), WatchError> {
        // No loop without a target. Missing/blank contest file is
        // the canonical fatal configuration error.
        let contest_url = match self.cfg.read_contest_url() {
            Ok(url) => url,
            Err(e) => {
                self.set_phase(SessionPhase::Error);
                self.set_phase(SessionPhase::Closed);
                return Err(e);
            }
        };

        self.set_phase(SessionPhase::Authenticating);
        let mut session = match BrowserSession::initialize(&self.cfg, &contest_url).await {
            Ok(s) => s,
            Err(e) => {
                self.set_phase(SessionPhase::Error);
                self.set_phase(SessionPhase::Closed);
                return Err(e);
            }
        };
        self.set_phase(SessionPhase::Ready);
        log::info!("session ready, polling every {}s", self.cfg.poll.interval_secs);

        // Let the client-side app finish its first render.
        self.sleep_ticks(Duration::from_secs(self.cfg.poll.page_load_wait_secs)).await;

        let result = self.poll_loop(&mut session).await;

        session.close().await;
        self.set_phase(SessionPhase::Closed);
        result
    }

    async fn poll_loop(&mut self, session: &mut BrowserSession) -> Result<(), WatchError> {
        let mut first_cycle = true;

        loop {
            if self.cancelled() {
                return Ok(());
            }

            // Reload before every poll except the very first one,
            // which still sees the fresh initial navigation.
            if !first_cycle {
                self.set_phase(SessionPhase::Refreshing);
                match session.reload().await {
                    Ok(()) => {
                        METRICS.page_reloads.fetch_add(1, Ordering::Relaxed);
                        self.sleep_ticks(Duration::from_secs(self.cfg.poll.reload_settle_secs))
                            .await;
                    }
                    Err(e) => {
                        self.transient_failure(session, e).await?;
                        continue;
                    }
                }
                if self.cancelled() {
                    return Ok(());
                }
            }
            first_cycle = false;

            self.set_phase(SessionPhase::Polling);
            match self.poll_once(session).await {
                Ok(snapshot) => {
                    METRICS.polls_completed.fetch_add(1, Ordering::Relaxed);
                    self.state.last_success = Some(snapshot.time_index);
                    self.state.consecutive_failures = 0;
                    self.publish();

                    self.sleep_ticks(Duration::from_secs(self.cfg.poll.interval_secs)).await;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.transient_failure(session, e).await?,
            }
        }
    }

    /// One complete poll: wait for the table, run the incremental
    /// collector to stabilization, wrap and persist the snapshot.
    /// Partial (mid-scroll) data never leaves this function.
    async fn poll_once(
        &mut self,
        session: &BrowserSession,
    ) -> Result<StandingsSnapshot, WatchError> {
        session
            .wait_for_standings_table(Duration::from_secs(self.cfg.poll.table_wait_secs))
            .await?;

        let rows = collect_standings(
            session,
            &self.extractor,
            CollectOptions {
                settle: Duration::from_millis(self.cfg.poll.scroll_settle_ms),
                max_passes: self.cfg.poll.max_scroll_passes,
            },
        )
        .await?;

        let time_index = bump_time_index(self.last_time_index, util::now_time_index());
        self.last_time_index = Some(time_index);

        let snapshot = StandingsSnapshot::new(time_index, rows);
        store::write_snapshot(Path::new(&self.cfg.output_dir), &snapshot)?;
        log::info!("t={time_index}: {} contestants", snapshot.len());
        Ok(snapshot)
    }

    /// Transient failure disposition: log, count, probe the
    /// session, back off. Only a dead session escalates to a
    /// fatal error; otherwise the existing session is retried
    /// without re-authentication.
    async fn transient_failure(
        &mut self,
        session: &BrowserSession,
        e: WatchError,
    ) -> Result<(), WatchError> {
        METRICS.polls_failed.fetch_add(1, Ordering::Relaxed);
        self.state.consecutive_failures += 1;
        self.set_phase(SessionPhase::Error);
        log::error!(
            "poll failed ({} consecutive): {e}",
            self.state.consecutive_failures
        );

        if !session.is_alive().await {
            return Err(WatchError::Session(format!(
                "session dead after poll failure: {e}"
            )));
        }

        self.set_phase(SessionPhase::RetryBackoff);
        self.sleep_ticks(Duration::from_secs(self.cfg.poll.backoff_secs)).await;
        Ok(())
    }

    fn cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.state.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        // Send only fails with no receivers, which is fine: the
        // loop runs supervised or not.
        let _ = self.status_tx.send(self.state.clone());
    }

    async fn sleep_ticks(&self, total: Duration) {
        sleep_cancellable(&self.stop, total).await;
    }
}

/// Sleeps for `total`, checking the stop flag once per second.
/// Returns early (true) when a stop was requested.
pub async fn sleep_cancellable(stop: &AtomicBool, total: Duration) -> bool {
    let tick = Duration::from_secs(1);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let step = remaining.min(tick);
        sleep(step).await;
        remaining -= step;
    }
    stop.load(Ordering::Relaxed)
}

/// Next snapshot TimeIndex. Epoch minutes are coarser than the
/// poll interval, so two polls can land inside one minute; the
/// bump keeps the series strictly monotonic.
fn bump_time_index(prev: Option<i64>, now: i64) -> i64 {
    match prev {
        Some(p) if now <= p => p + 1,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn time_index_bumps_on_collision() {
        assert_eq!(bump_time_index(None, 100), 100);
        assert_eq!(bump_time_index(Some(99), 100), 100);
        assert_eq!(bump_time_index(Some(100), 100), 101);
        assert_eq!(bump_time_index(Some(105), 100), 106);
    }

    #[tokio::test]
    async fn stop_during_sleep_exits_within_one_tick() {
        let stop = Arc::new(AtomicBool::new(false));

        let setter = stop.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            setter.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        let cancelled = sleep_cancellable(&stop, Duration::from_secs(60)).await;
        assert!(cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn sleep_without_stop_runs_to_completion() {
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        let cancelled = sleep_cancellable(&stop, Duration::from_millis(50)).await;
        assert!(!cancelled);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn handle_reports_initial_status() {
        let (_scheduler, handle) = Scheduler::new(Config::default());
        let state = handle.status();
        assert_eq!(state.phase, SessionPhase::Uninitialized);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_success.is_none());
    }

    #[tokio::test]
    async fn missing_contest_file_is_fatal_before_any_session() {
        let cfg = Config {
            contest_file: "does-not-exist.txt".to_string(),
            ..Config::default()
        };
        let (scheduler, handle) = Scheduler::new(cfg);
        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
        assert_eq!(handle.status().phase, SessionPhase::Closed);
    }
}
