use std::collections::HashSet;
use std::sync::atomic::Ordering;

use tokio::time::{sleep, Duration};

use crate::error::WatchError;
use crate::extract::Extractor;
use crate::metrics::METRICS;
use crate::schema::StandingsRow;

/// StandingsView is the abstraction layer between:
/// - The incremental collection algorithm
/// - The live automated browser session
///
/// The virtualized leaderboard mounts only visible rows and
/// recycles DOM state on scroll, so the algorithm needs exactly
/// two capabilities from the view: read what is mounted right
/// now, and push the viewport forward.
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One view is never driven concurrently; the owning session
///   serializes all calls
///
#[async_trait::async_trait]
pub trait StandingsView: Send + Sync {
    /// Returns the full rendered markup of the page as it stands.
    ///
    /// MUST NOT:
    /// - Scroll or otherwise mutate the view
    async fn mounted_markup(&self) -> Result<String, WatchError>;

    /// Scrolls the last currently mounted leaderboard row into
    /// view so the virtualized list mounts the next window.
    ///
    /// A no-op when nothing is mounted.
    async fn scroll_to_last_row(&self) -> Result<(), WatchError>;
}

/// Incremental collector configuration. Magnitudes come from
/// `PollConfig`; this struct keeps the algorithm independent of
/// the full application config.
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    /// Settle delay after each scroll step, letting freshly
    /// mounted rows render before the next read
    pub settle: Duration,

    /// Safety bound on scroll passes. Exceeding it raises
    /// StabilizationTimeout rather than returning partial data.
    pub max_passes: usize,
}

/// Reconstructs the complete leaderboard from a virtualized view.
///
/// Algorithm:
/// 1. Read the mounted rows and accumulate every row whose team
///    identity has not been seen yet, in first-seen order.
/// 2. If the accumulated size did not grow since the previous
///    pass, the view is exhausted. Done.
/// 3. Otherwise scroll the last mounted row into view, wait the
///    settle delay, repeat.
///
/// The previous-size sentinel starts at -1 so the loop always
/// runs at least one pass and a zero-row first read terminates
/// cleanly with an empty result.
///
/// Rows without a resolvable team identity are not accumulated:
/// without the stable per-row label they cannot be deduplicated
/// across passes. They are counted in `rows_without_identity`.
///
/// TERMINATION:
/// - Naturally bounded by the finite contest size; `max_passes`
///   is the defense against a view that never stops growing.
pub async fn collect_standings(
    view: &dyn StandingsView,
    extractor: &Extractor,
    opts: CollectOptions,
) -> Result<Vec<StandingsRow>, WatchError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected: Vec<StandingsRow> = Vec::new();
    let mut previous_len: isize = -1;

    for pass in 0.. {
        if pass >= opts.max_passes {
            METRICS.stabilization_timeouts.fetch_add(1, Ordering::Relaxed);
            return Err(WatchError::StabilizationTimeout(opts.max_passes));
        }

        METRICS.scroll_passes.fetch_add(1, Ordering::Relaxed);
        let markup = view.mounted_markup().await?;

        for row in extractor.extract_rows(&markup) {
            match &row.team_name {
                Some(name) => {
                    if !seen.contains(name) {
                        seen.insert(name.clone());
                        collected.push(row);
                    }
                }
                None => {
                    METRICS.rows_without_identity.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if collected.len() as isize == previous_len {
            break;
        }
        previous_len = collected.len() as isize;

        view.scroll_to_last_row().await?;
        sleep(opts.settle).await;
    }

    log::debug!("collected {} unique rows", collected.len());
    METRICS.rows_collected.fetch_add(collected.len(), Ordering::Relaxed);
    Ok(collected)
}
