use serde::Deserialize;

use crate::error::WatchError;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level configuration structure loaded from `config.json`.
//
// Every field has a default, so a missing config file is not an
// error. The only fatal configuration input is the contest file
// (see `read_contest_url`): without a target URL no poll loop
// may start.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Path of the text file whose first non-empty line is the
    /// contest URL to watch
    pub contest_file: String,

    /// Path of the persisted cookie blob. Loaded when present
    /// (skips interactive login), written once after a
    /// successful interactive login.
    pub auth_state_file: String,

    /// URL opened for the one-time interactive login
    pub login_url: String,

    /// Directory receiving one snapshot CSV per poll cycle
    pub output_dir: String,

    /// Run the browser without a visible window.
    ///
    /// IMPORTANT:
    /// - Interactive login requires a visible window. When no
    ///   cookie blob exists the session launches headed
    ///   regardless of this flag.
    pub headless: bool,

    /// Poll loop timing
    pub poll: PollConfig,

    /// Monte Carlo projection parameters
    pub projection: ProjectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contest_file: "example_contests.txt".to_string(),
            auth_state_file: "auth_state.json".to_string(),
            login_url: "https://www.draftkings.com".to_string(),
            output_dir: "data_downloads".to_string(),
            headless: false,
            poll: PollConfig::default(),
            projection: ProjectionConfig::default(),
        }
    }
}

// ------------------------------------------------------------
// Poll timing
// ------------------------------------------------------------
//
// All sleep magnitudes of the scheduler state machine live here
// rather than as hardcoded constants. Each sleep is checked for
// cancellation once per second regardless of its length.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between a persisted snapshot and the page reload
    pub interval_secs: u64,

    /// Settle sleep after a full page reload
    pub reload_settle_secs: u64,

    /// Backoff sleep after a failed poll before retrying
    pub backoff_secs: u64,

    /// Fixed wait after initial navigation, before the first
    /// extraction pass (lets the client-side app render)
    pub page_load_wait_secs: u64,

    /// Deadline for the standings table container to mount after
    /// a navigation or reload
    pub table_wait_secs: u64,

    /// Settle delay between scroll steps, letting freshly
    /// mounted rows appear
    pub scroll_settle_ms: u64,

    /// Safety bound on scroll passes per collection.
    ///
    /// The loop terminates naturally once the row set stops
    /// growing; exceeding this bound is a StabilizationTimeout,
    /// never a silent partial snapshot.
    pub max_scroll_passes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 45,
            reload_settle_secs: 15,
            backoff_secs: 60,
            page_load_wait_secs: 10,
            table_wait_secs: 30,
            scroll_settle_ms: 500,
            max_scroll_passes: 500,
        }
    }
}

// ------------------------------------------------------------
// Projection parameters
// ------------------------------------------------------------
//
// Named model parameters. The scoring-rate and variance values
// are uncalibrated heuristics and deliberately overridable.
//
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Assumed average future scoring rate, points per minute
    /// of PMR. Drives the projected mean.
    pub rate_per_minute: f64,

    /// Variance added per minute of PMR. Drives the spread.
    pub sigma2: f64,

    /// Number of Monte Carlo trials per projection
    pub sims: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            rate_per_minute: 0.25,
            sigma2: 0.5,
            sims: 20_000,
        }
    }
}

// ------------------------------------------------------------
// Loading
// ------------------------------------------------------------

impl Config {
    /// Loads `config.json` from `path`, falling back to defaults
    /// when the file does not exist. A present but malformed file
    /// is a configuration error.
    pub fn load(path: &str) -> Result<Self, WatchError> {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| WatchError::Config(format!("{path}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(WatchError::Config(format!("{path}: {e}"))),
        }
    }

    /// Reads the contest URL: the first non-empty line of the
    /// contest file.
    ///
    /// CONTRACT:
    /// - Missing file or no non-empty line is fatal. The poll
    ///   loop must not start without a target.
    pub fn read_contest_url(&self) -> Result<String, WatchError> {
        let data = std::fs::read_to_string(&self.contest_file).map_err(|e| {
            WatchError::Config(format!("contest file {}: {e}", self.contest_file))
        })?;

        data.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                WatchError::Config(format!(
                    "contest file {} has no non-empty line",
                    self.contest_file
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_magnitudes() {
        let cfg = Config::default();
        assert_eq!(cfg.poll.interval_secs, 45);
        assert_eq!(cfg.poll.reload_settle_secs, 15);
        assert_eq!(cfg.poll.backoff_secs, 60);
        assert_eq!(cfg.projection.sims, 20_000);
        assert_eq!(cfg.projection.rate_per_minute, 0.25);
        assert_eq!(cfg.projection.sigma2, 0.5);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load("definitely-not-here.json").unwrap();
        assert_eq!(cfg.poll.interval_secs, 45);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"poll": {"interval_secs": 5}}"#).unwrap();
        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.poll.interval_secs, 5);
        assert_eq!(cfg.poll.backoff_secs, 60);
    }

    #[test]
    fn contest_url_is_first_non_empty_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contests.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "\n  \nhttps://example.com/contest/1\nhttps://example.com/contest/2").unwrap();

        let cfg = Config {
            contest_file: path.to_str().unwrap().to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.read_contest_url().unwrap(), "https://example.com/contest/1");
    }

    #[test]
    fn blank_contest_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contests.txt");
        std::fs::write(&path, "\n\n").unwrap();

        let cfg = Config {
            contest_file: path.to_str().unwrap().to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.read_contest_url(), Err(WatchError::Config(_))));
    }

    #[test]
    fn missing_contest_file_is_fatal() {
        let cfg = Config {
            contest_file: "no-such-file.txt".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.read_contest_url(), Err(WatchError::Config(_))));
    }
}
