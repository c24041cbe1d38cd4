// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration structs loaded from JSON
// - schema:     Strongly typed standings / projection definitions
// - util:       Shared helper utilities (TimeIndex, filenames)
// - error:      Error kinds and their fatality split
// - extract:    Rendered markup -> candidate standings rows
// - collector:  Scroll-and-stitch reconstruction of the full list
// - session:    The single long-lived automated browser session
// - scheduler:  Poll / backoff state machine owning the session
// - store:      CSV snapshot persistence and series aggregation
// - projection: Monte Carlo final-score projection
//
mod config;
mod schema;
mod util;
mod error;
mod extract;
mod collector;
mod session;
mod scheduler;
mod store;
mod projection;
mod metrics;
// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::sleep;

use config::Config;
use metrics::METRICS;
use scheduler::Scheduler;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the main runtime for the contest standings watcher.
//
// Responsibilities:
// - Initialize logging
// - Load configuration
// - Run the scheduler (one browser session, one poll loop)
// - Translate Ctrl-C into a cooperative stop
// - Project the final persisted snapshot on the way out
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load("config.json")?;

    // --------------------------------------------------------
    // Start metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    tokio::spawn(async {
        loop {
            sleep(Duration::from_secs(60)).await;

            println!(
                "[METRICS] polls={} failed={} reloads={} scrolls={} rows={} anon_rows={} stab_timeouts={} snapshots={}",
                METRICS.polls_completed.load(Ordering::Relaxed),
                METRICS.polls_failed.load(Ordering::Relaxed),
                METRICS.page_reloads.load(Ordering::Relaxed),
                METRICS.scroll_passes.load(Ordering::Relaxed),
                METRICS.rows_collected.load(Ordering::Relaxed),
                METRICS.rows_without_identity.load(Ordering::Relaxed),
                METRICS.stabilization_timeouts.load(Ordering::Relaxed),
                METRICS.snapshots_written.load(Ordering::Relaxed),
            );
        }
    });

    // --------------------------------------------------------
    // Run the scheduler until Ctrl-C or a fatal error
    //
    // Ctrl-C only raises the stop flag; the loop itself decides
    // when to exit so a poll in flight completes or fails on its
    // own terms and the browser is always released.
    // --------------------------------------------------------
    let (sched, handle) = Scheduler::new(config.clone());
    let runner = tokio::spawn(sched.run());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutdown requested");
            handle.stop();
        }
    });

    let result = runner.await?;
    if let Err(e) = &result {
        log::error!("watcher terminated: {e}");
    }

    // --------------------------------------------------------
    // Exit summary: project the last persisted snapshot
    // --------------------------------------------------------
    let dir = Path::new(&config.output_dir);
    if let Some(p) = projection::project_latest(dir, config.projection, util::now_time_index() as u64)? {
        let mut teams = p.teams.clone();
        teams.sort_by(|a, b| b.win_probability.total_cmp(&a.win_probability));

        println!("Projection for t={} ({} teams{}):",
            p.time_index,
            teams.len(),
            if p.degraded { ", degraded" } else { "" },
        );
        for t in teams.iter().take(10) {
            println!(
                "  {:<24} proj={:>8.2} sd={:>6.2} win={:>6.2}%",
                t.team_name,
                t.projected_final,
                t.std_dev,
                t.win_probability * 100.0,
            );
        }
    }

    result?;
    Ok(())
}
