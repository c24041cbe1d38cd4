/// Shared helpers for the watcher pipeline.
///
/// This module contains:
/// - TimeIndex helpers (epoch-minute ordinals)
/// - Snapshot filename formatting and parsing
///
/// IMPORTANT:
/// - No browser or extraction logic lives here.
/// - Everything in this module must stay deterministic.

/// Prefix + extension of one persisted snapshot file. The number
/// between them is the snapshot's TimeIndex.
const SNAPSHOT_PREFIX: &str = "standings_";
const SNAPSHOT_EXT: &str = ".csv";

/// Returns the current TimeIndex: whole minutes since the Unix
/// epoch.
pub fn now_time_index() -> i64 {
    chrono::Utc::now().timestamp() / 60
}

/// Builds the snapshot filename for one TimeIndex.
///
/// Example:
/// - 29_000_000 -> "standings_29000000.csv"
pub fn snapshot_filename(time_index: i64) -> String {
    format!("{SNAPSHOT_PREFIX}{time_index}{SNAPSHOT_EXT}")
}

/// Recovers the TimeIndex from a snapshot filename.
///
/// Returns `None` for files that do not follow the snapshot
/// naming scheme, so directory scans can skip foreign files
/// silently.
pub fn parse_snapshot_filename(name: &str) -> Option<i64> {
    name.strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_EXT)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_round_trip() {
        assert_eq!(snapshot_filename(29_123_456), "standings_29123456.csv");
        assert_eq!(parse_snapshot_filename("standings_29123456.csv"), Some(29_123_456));
    }

    #[test]
    fn foreign_files_are_rejected() {
        assert_eq!(parse_snapshot_filename("standings_.csv"), None);
        assert_eq!(parse_snapshot_filename("standings_12.txt"), None);
        assert_eq!(parse_snapshot_filename("notes.csv"), None);
        assert_eq!(parse_snapshot_filename("standings_ab.csv"), None);
    }

    #[test]
    fn time_index_is_minutes() {
        let idx = now_time_index();
        let secs = chrono::Utc::now().timestamp();
        assert!((secs / 60 - idx).abs() <= 1);
    }
}
