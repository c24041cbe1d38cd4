use thiserror::Error;

/// Error kinds of the watcher pipeline.
///
/// Disposition per kind:
/// - `Config`: fatal, initialization aborts before the loop starts
/// - `StabilizationTimeout`: the poll is marked failed and retried
///   after backoff, the session is preserved
/// - `Session`: fatal, the loop terminates, resource release is
///   still attempted
/// - `Browser`: transient unless the subsequent liveness probe
///   also fails
/// - `Projection`: never crashes the pipeline, the consumer falls
///   back to a neutral degraded projection
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("standings view did not stabilize within {0} scroll passes")]
    StabilizationTimeout(usize),

    #[error("browser session failure: {0}")]
    Session(String),

    #[error("browser protocol error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("page not ready: {0}")]
    PageNotReady(String),

    #[error("projection input invalid: {0}")]
    Projection(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Fatal errors terminate the scheduling loop. Everything else
    /// is answered with a bounded backoff and retried in place.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::Config(_) | WatchError::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(WatchError::Config("x".into()).is_fatal());
        assert!(WatchError::Session("x".into()).is_fatal());
        assert!(!WatchError::StabilizationTimeout(500).is_fatal());
        assert!(!WatchError::Projection("x".into()).is_fatal());
    }
}
