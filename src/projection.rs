use std::path::Path;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::config::ProjectionConfig;
use crate::error::WatchError;
use crate::schema::{Projection, ProjectionResult, StandingsSnapshot};
use crate::store;

/// Monte Carlo projection over one standings snapshot.
///
/// Model, per simulated team i:
///
///     final_i ~ Normal(fpts_i + rate * pmr_i, sigma2 * pmr_i)
///
/// The mean assumes a fixed average future scoring rate per
/// remaining player minute; the variance grows linearly with
/// remaining minutes. Both magnitudes are uncalibrated heuristics
/// and live in `ProjectionConfig` rather than as constants.
///
/// CONTRACT:
/// - Stateless. Safe to invoke concurrently for different
///   snapshots.
/// - Deterministic: identical snapshot + seed + sims reproduce
///   identical output.
/// - Entries missing fpts or pmr are excluded from simulation.
/// - Never panics on malformed numeric input; the degraded
///   neutral projection is returned instead (projected = fpts,
///   win probability 0, `degraded` set).
pub fn project(snapshot: &StandingsSnapshot, cfg: ProjectionConfig, seed: u64) -> Projection {
    match simulate(snapshot, cfg, seed) {
        Ok(teams) => Projection { time_index: snapshot.time_index, teams, degraded: false },
        Err(e) => {
            log::warn!("projection degraded for t={}: {e}", snapshot.time_index);
            Projection {
                time_index: snapshot.time_index,
                teams: neutral(snapshot),
                degraded: true,
            }
        }
    }
}

/// The pull-based presentation read: project the most recent
/// persisted snapshot. `None` before the first poll completes.
///
/// Reads the snapshot directory rather than the live session, so
/// it is safe to call at any time, from any task.
pub fn project_latest(
    dir: &Path,
    cfg: ProjectionConfig,
    seed: u64,
) -> Result<Option<Projection>, WatchError> {
    Ok(store::latest_snapshot(dir)?.map(|snap| project(&snap, cfg, seed)))
}

/// One simulated team: inputs plus its final-score distribution.
struct SimTeam {
    name: String,
    mean: f64,
    std_dev: f64,
    dist: Normal<f64>,
}

fn simulate(
    snapshot: &StandingsSnapshot,
    cfg: ProjectionConfig,
    seed: u64,
) -> Result<Vec<ProjectionResult>, WatchError> {
    if cfg.sims == 0 {
        return Err(WatchError::Projection("sims must be positive".into()));
    }
    if !cfg.sigma2.is_finite() || cfg.sigma2 < 0.0 || !cfg.rate_per_minute.is_finite() {
        return Err(WatchError::Projection("non-finite model parameters".into()));
    }

    let mut teams: Vec<SimTeam> = Vec::new();
    for row in &snapshot.entries {
        let (Some(name), Some(fpts), Some(pmr)) = (&row.team_name, row.fpts, row.pmr) else {
            continue;
        };
        if !fpts.is_finite() {
            return Err(WatchError::Projection(format!("non-finite fpts for {name}")));
        }

        let pmr = pmr as f64;
        let mean = fpts + cfg.rate_per_minute * pmr;
        let std_dev = (cfg.sigma2 * pmr).sqrt();
        let dist = Normal::new(mean, std_dev)
            .map_err(|e| WatchError::Projection(format!("{name}: {e}")))?;

        teams.push(SimTeam { name: name.clone(), mean, std_dev, dist });
    }

    if teams.is_empty() {
        return Ok(Vec::new());
    }

    // One seeded stream, teams sampled in entry order within each
    // trial, so a fixed seed fixes the whole sample matrix.
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut wins = vec![0u64; teams.len()];

    for _ in 0..cfg.sims {
        let mut best_idx = 0usize;
        let mut best = f64::NEG_INFINITY;
        for (idx, team) in teams.iter().enumerate() {
            let draw = team.dist.sample(&mut rng);
            // Strict comparison: on a simulated tie the lower team
            // index keeps the trial. Comparison-order convention,
            // not a domain rule.
            if draw > best {
                best = draw;
                best_idx = idx;
            }
        }
        wins[best_idx] += 1;
    }

    Ok(teams
        .into_iter()
        .zip(wins)
        .map(|(team, w)| ProjectionResult {
            team_name: team.name,
            projected_final: team.mean,
            std_dev: team.std_dev,
            win_probability: w as f64 / cfg.sims as f64,
        })
        .collect())
}

/// Neutral fallback: current points carried forward, no spread,
/// no winner. Tagged degraded by the caller so it can never be
/// mistaken for a simulation result.
fn neutral(snapshot: &StandingsSnapshot) -> Vec<ProjectionResult> {
    snapshot
        .entries
        .iter()
        .filter_map(|row| {
            let name = row.team_name.clone()?;
            Some(ProjectionResult {
                team_name: name,
                projected_final: row.fpts.unwrap_or(0.0),
                std_dev: 0.0,
                win_probability: 0.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StandingsRow;
    use approx::assert_relative_eq;

    fn entry(name: &str, fpts: f64, pmr: u32) -> StandingsRow {
        StandingsRow {
            rank: None,
            team_name: Some(name.to_string()),
            pmr: Some(pmr),
            fpts: Some(fpts),
        }
    }

    fn snapshot(entries: Vec<StandingsRow>) -> StandingsSnapshot {
        StandingsSnapshot::new(1, entries)
    }

    fn cfg(sims: u32) -> ProjectionConfig {
        ProjectionConfig { rate_per_minute: 0.25, sigma2: 0.5, sims }
    }

    #[test]
    fn reference_example_matches_closed_form() {
        // (team, fpts, pmr) = A(80,60) B(75,90) C(36,360), sigma2 0.5:
        // means 95 / 97.5 / 126, stds ~5.48 / 6.71 / 13.42.
        let snap = snapshot(vec![entry("A", 80.0, 60), entry("B", 75.0, 90), entry("C", 36.0, 360)]);
        let p = project(&snap, cfg(50_000), 42);
        assert!(!p.degraded);

        assert_relative_eq!(p.teams[0].projected_final, 95.0, epsilon = 1e-9);
        assert_relative_eq!(p.teams[1].projected_final, 97.5, epsilon = 1e-9);
        assert_relative_eq!(p.teams[2].projected_final, 126.0, epsilon = 1e-9);

        assert_relative_eq!(p.teams[0].std_dev, 30f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(p.teams[1].std_dev, 45f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(p.teams[2].std_dev, 180f64.sqrt(), epsilon = 1e-9);

        // Analytic: C beats B w.p. ~0.971 and A w.p. ~0.984; the
        // union bound puts C's win probability in (0.94, 0.99).
        let c = &p.teams[2];
        assert!(c.win_probability > 0.93 && c.win_probability < 0.99, "{}", c.win_probability);
        assert!(p.teams[1].win_probability > p.teams[0].win_probability);
    }

    #[test]
    fn win_probabilities_sum_to_one() {
        let snap = snapshot(vec![entry("A", 80.0, 60), entry("B", 75.0, 90), entry("C", 36.0, 360)]);
        let p = project(&snap, cfg(20_000), 7);
        let sum: f64 = p.teams.iter().map(|t| t.win_probability).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn identical_seed_reproduces_identical_output() {
        let snap = snapshot(vec![entry("A", 80.0, 60), entry("B", 75.0, 90)]);
        let p1 = project(&snap, cfg(5_000), 1234);
        let p2 = project(&snap, cfg(5_000), 1234);
        assert_eq!(p1, p2);
    }

    #[test]
    fn different_seed_moves_the_estimate() {
        let snap =
            snapshot(vec![entry("A", 50.0, 100), entry("B", 50.0, 100), entry("C", 50.0, 100)]);
        let p1 = project(&snap, cfg(5_000), 1);
        let p2 = project(&snap, cfg(5_000), 2);
        let tallies = |p: &Projection| -> Vec<f64> {
            p.teams.iter().map(|t| t.win_probability).collect()
        };
        assert_ne!(tallies(&p1), tallies(&p2));
    }

    #[test]
    fn more_pmr_raises_spread_and_projection() {
        let lo = project(&snapshot(vec![entry("A", 50.0, 30), entry("B", 60.0, 30)]), cfg(100), 0);
        let hi = project(&snapshot(vec![entry("A", 50.0, 120), entry("B", 60.0, 30)]), cfg(100), 0);
        assert!(hi.teams[0].std_dev > lo.teams[0].std_dev);
        assert!(hi.teams[0].projected_final > lo.teams[0].projected_final);
    }

    #[test]
    fn zero_pmr_is_exact() {
        let snap = snapshot(vec![entry("A", 50.0, 0), entry("B", 60.0, 0), entry("C", 55.0, 0)]);
        let p = project(&snap, cfg(1_000), 9);
        for t in &p.teams {
            assert_eq!(t.std_dev, 0.0);
            assert!(t.win_probability == 0.0 || t.win_probability == 1.0);
        }
        // Strictly greatest fpts wins every trial.
        assert_eq!(p.teams[1].win_probability, 1.0);
    }

    #[test]
    fn single_team_always_wins() {
        let p = project(&snapshot(vec![entry("solo", 12.0, 200)]), cfg(500), 3);
        assert_eq!(p.teams.len(), 1);
        assert_eq!(p.teams[0].win_probability, 1.0);
    }

    #[test]
    fn rows_missing_inputs_are_excluded() {
        let partial = StandingsRow {
            rank: None,
            team_name: Some("nofpts".into()),
            pmr: Some(10),
            fpts: None,
        };
        let snap = snapshot(vec![entry("A", 10.0, 10), partial]);
        let p = project(&snap, cfg(100), 0);
        assert_eq!(p.teams.len(), 1);
        assert!(!p.degraded);
    }

    #[test]
    fn malformed_input_degrades_instead_of_crashing() {
        let snap = snapshot(vec![entry("A", f64::NAN, 10), entry("B", 20.0, 10)]);
        let p = project(&snap, cfg(100), 0);
        assert!(p.degraded);
        assert_eq!(p.teams.len(), 2);
        assert!(p.teams.iter().all(|t| t.win_probability == 0.0));
        assert_relative_eq!(p.teams[1].projected_final, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_snapshot_projects_to_nothing() {
        let p = project(&snapshot(vec![]), cfg(100), 0);
        assert!(!p.degraded);
        assert!(p.teams.is_empty());
    }

    #[test]
    fn latest_projection_follows_the_newest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(project_latest(dir.path(), cfg(100), 0).unwrap().is_none());

        for t in [10, 30, 20] {
            let snap = StandingsSnapshot::new(t, vec![entry("A", 50.0, 60)]);
            crate::store::write_snapshot(dir.path(), &snap).unwrap();
        }

        let p = project_latest(dir.path(), cfg(100), 0).unwrap().unwrap();
        assert_eq!(p.time_index, 30);
        assert_eq!(p.teams[0].win_probability, 1.0);
    }
}
