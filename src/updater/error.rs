use serde::Serialize;

/// Why an update flow stopped without finishing.
///
/// Declines are not failures: a "no" at either prompt ends the flow with a
/// normal [`FlowResult`](super::FlowResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureKind {
    /// The update check did not settle within the bound (milliseconds).
    #[error("update check timed out after {0} ms")]
    Timeout(u64),
    /// Transport or manifest-fetch failure while checking.
    #[error("update check failed: {0}")]
    Network(String),
    /// Download or install step failed.
    #[error("update download or install failed: {0}")]
    InstallFailure(String),
    /// The process restart call itself failed.
    #[error("failed to relaunch after update: {0}")]
    RelaunchFailed(String),
    /// A fault nobody handled, e.g. a panicking platform service.
    #[error("unexpected updater fault: {0}")]
    Unexpected(String),
    /// The flow's cancellation token fired at a suspension point.
    #[error("update flow cancelled")]
    Cancelled,
}

impl FailureKind {
    /// Stable snake_case tag for logs and front-end payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::InstallFailure(_) => "install_failure",
            Self::RelaunchFailed(_) => "relaunch_failed",
            Self::Unexpected(_) => "unexpected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Failures produced by the check phase, before any update was reported available.
    pub fn is_check_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

/// Error returned by a platform service (updater plugin, window, process).
///
/// Keeps the core free of host error types; the message already includes
/// the source's text so logging `{err}` is enough.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct PlatformError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a host error with context: `"{context}: {err}"`.
    pub fn with_source<E>(context: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: format!("{context}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(FailureKind::Timeout(20_000).kind(), "timeout");
        assert_eq!(FailureKind::Network("dns".into()).kind(), "network");
        assert_eq!(FailureKind::InstallFailure("disk".into()).kind(), "install_failure");
        assert_eq!(FailureKind::RelaunchFailed("x".into()).kind(), "relaunch_failed");
        assert_eq!(FailureKind::Unexpected("boom".into()).kind(), "unexpected");
        assert_eq!(FailureKind::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn only_timeout_and_network_are_check_failures() {
        assert!(FailureKind::Timeout(1).is_check_failure());
        assert!(FailureKind::Network("x".into()).is_check_failure());
        assert!(!FailureKind::InstallFailure("x".into()).is_check_failure());
        assert!(!FailureKind::Cancelled.is_check_failure());
    }

    #[test]
    fn display_includes_detail() {
        let err = FailureKind::Timeout(20_000);
        assert_eq!(err.to_string(), "update check timed out after 20000 ms");
        let err = FailureKind::Network("connection refused".into());
        assert_eq!(err.to_string(), "update check failed: connection refused");
    }

    #[test]
    fn serializes_adjacently_tagged() {
        let json = serde_json::to_value(FailureKind::InstallFailure("disk full".into())).unwrap();
        assert_eq!(json["kind"], "install_failure");
        assert_eq!(json["message"], "disk full");

        let json = serde_json::to_value(FailureKind::Cancelled).unwrap();
        assert_eq!(json["kind"], "cancelled");
    }

    #[test]
    fn platform_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = PlatformError::with_source("Failed to reach update endpoint", io);
        assert_eq!(err.message(), "Failed to reach update endpoint: refused");
        assert!(err.source().is_some());
        assert!(PlatformError::new("plain").source().is_none());
    }
}
