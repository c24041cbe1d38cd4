use serde::{Serialize, Deserialize};

// ------------------------------------------------------------
// Standings row
// ------------------------------------------------------------
//
// One leaderboard entry as recovered from the rendered page.
//
// Every field is optional: the extractor keeps a row as long as
// at least one field resolved. Consumers must tolerate gaps.
//
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StandingsRow {
    /// Leaderboard rank, 1-based
    pub rank: Option<u32>,

    /// Team / entry name.
    ///
    /// IMPORTANT:
    /// - This is the row identity used for deduplication across
    ///   scroll passes. It comes from the stable per-row label,
    ///   never from DOM position.
    pub team_name: Option<String>,

    /// Player minutes remaining for the lineup
    pub pmr: Option<u32>,

    /// Current accumulated fantasy points
    pub fpts: Option<f64>,
}

impl StandingsRow {
    /// True when no field resolved. Such rows carry no information
    /// and are dropped at the extraction boundary.
    pub fn is_empty(&self) -> bool {
        self.rank.is_none()
            && self.team_name.is_none()
            && self.pmr.is_none()
            && self.fpts.is_none()
    }
}

// ------------------------------------------------------------
// Standings snapshot
// ------------------------------------------------------------

/// A complete, deduplicated leaderboard state captured at one
/// TimeIndex.
///
/// INVARIANTS (enforced by `new`):
/// - No two entries share a team name
/// - Entries are sorted by rank ascending when every entry has a
///   rank, otherwise first-seen order is preserved (stable)
///
/// A snapshot is produced only after the collector reports
/// stabilization and is immutable afterwards. Mid-scroll state is
/// never wrapped into one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StandingsSnapshot {
    /// Minutes since the Unix epoch, strictly monotonic across
    /// successive polls of one scheduler.
    pub time_index: i64,

    /// Ordered leaderboard entries
    pub entries: Vec<StandingsRow>,
}

impl StandingsSnapshot {
    /// Wraps collected rows into a snapshot, enforcing the
    /// uniqueness and ordering invariants.
    ///
    /// Duplicate team names keep the first-seen row. Rows without
    /// a team name are kept as-is (they cannot collide).
    pub fn new(time_index: i64, rows: Vec<StandingsRow>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut entries: Vec<StandingsRow> = Vec::with_capacity(rows.len());

        for row in rows {
            match &row.team_name {
                Some(name) => {
                    if seen.insert(name.clone()) {
                        entries.push(row);
                    }
                }
                None => entries.push(row),
            }
        }

        if !entries.is_empty() && entries.iter().all(|r| r.rank.is_some()) {
            entries.sort_by_key(|r| r.rank);
        }

        Self { time_index, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ------------------------------------------------------------
// Projection output
// ------------------------------------------------------------

/// Per-team result of one Monte Carlo projection run.
///
/// Derived and transient: recomputed on demand from a snapshot,
/// never persisted.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProjectionResult {
    pub team_name: String,

    /// Expected final score (distribution mean)
    pub projected_final: f64,

    /// Standard deviation of the final score, >= 0
    pub std_dev: f64,

    /// Probability of finishing first, in [0, 1].
    /// Sums to ~1 across one snapshot's simulated entries.
    pub win_probability: f64,
}

/// One projection run over one snapshot.
///
/// `degraded` marks the neutral fallback emitted when the input
/// was numerically malformed. Degraded output is intentionally
/// distinguishable from a real simulation result.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Projection {
    pub time_index: i64,
    pub teams: Vec<ProjectionResult>,
    pub degraded: bool,
}

// ------------------------------------------------------------
// Scheduler state
// ------------------------------------------------------------

/// Lifecycle phase of the one owned browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Authenticating,
    Ready,
    Polling,
    Refreshing,
    RetryBackoff,
    Error,
    Closed,
}

/// Scheduler-owned status, published through a watch channel so
/// external readers never touch the live session. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: SessionPhase,

    /// TimeIndex of the last successfully persisted snapshot
    pub last_success: Option<i64>,

    /// Consecutive failed polls since the last success
    pub consecutive_failures: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            last_success: None,
            consecutive_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rank: Option<u32>, name: &str) -> StandingsRow {
        StandingsRow {
            rank,
            team_name: Some(name.to_string()),
            pmr: Some(0),
            fpts: Some(0.0),
        }
    }

    #[test]
    fn snapshot_dedups_on_team_name_first_seen_wins() {
        let a1 = StandingsRow { fpts: Some(10.0), ..row(None, "alpha") };
        let a2 = StandingsRow { fpts: Some(99.0), ..row(None, "alpha") };
        let snap = StandingsSnapshot::new(1, vec![a1.clone(), a2, row(None, "beta")]);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.entries[0], a1);
    }

    #[test]
    fn snapshot_sorts_by_rank_when_all_ranked() {
        let snap =
            StandingsSnapshot::new(1, vec![row(Some(3), "c"), row(Some(1), "a"), row(Some(2), "b")]);
        let ranks: Vec<_> = snap.entries.iter().map(|r| r.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn snapshot_keeps_insertion_order_when_any_rank_missing() {
        let snap =
            StandingsSnapshot::new(1, vec![row(Some(3), "c"), row(None, "a"), row(Some(2), "b")]);
        let names: Vec<_> =
            snap.entries.iter().map(|r| r.team_name.clone().unwrap()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn rows_without_identity_never_collide() {
        let anon = StandingsRow { rank: Some(5), team_name: None, pmr: None, fpts: None };
        let snap = StandingsSnapshot::new(1, vec![anon.clone(), anon]);
        assert_eq!(snap.len(), 2);
    }
}
