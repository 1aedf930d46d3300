//! Error kinds surfaced by the harness.
//!
//! Every failure the driver reports is one of these variants. Adapters that
//! talk to real processes or D-Bus convert their own errors into the typed
//! kind at the boundary so callers can match on outcome rather than text.

use thiserror::Error;

/// A specialized `Result` type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed scenario: duplicate SSIDs, missing interfaces, empty
    /// credential set, unknown expected SSID.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// Credentials rejected as malformed.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The network manager refused the credentials for a runtime reason.
    #[error("failed to provision credentials: {0}")]
    ProvisionFailed(String),

    /// An access point descriptor cannot be bound to an interface.
    #[error("invalid access point descriptor: {0}")]
    InvalidDescriptor(String),

    /// The authenticator for an access point could not be launched.
    #[error("failed to start access point {ssid}: {reason}")]
    StartFailed { ssid: String, reason: String },

    #[error("access point {0} is already started")]
    AlreadyStarted(String),

    /// The instance has no running authenticator, or its control channel was
    /// already handed out.
    #[error("access point {0} has no control channel available")]
    NotStarted(String),

    /// The expected event did not arrive before the deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The client associated with an access point other than the expected one.
    #[error("{client} associated with {actual} instead of {expected}")]
    WrongAp {
        client: String,
        expected: String,
        actual: String,
    },

    #[error("profile {0} already exists")]
    ProfileExists(String),

    #[error("profile {0} does not exist")]
    ProfileMissing(String),

    /// The transport to the network manager failed.
    #[error("network manager transport error: {0}")]
    Transport(String),
}

impl HarnessError {
    /// Short kind tag, stable across messages. Used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::InvalidScenario(_) => "InvalidScenario",
            HarnessError::InvalidCredentials(_) => "InvalidCredentials",
            HarnessError::ProvisionFailed(_) => "ProvisionFailed",
            HarnessError::InvalidDescriptor(_) => "InvalidDescriptor",
            HarnessError::StartFailed { .. } => "StartFailed",
            HarnessError::AlreadyStarted(_) => "AlreadyStarted",
            HarnessError::NotStarted(_) => "NotStarted",
            HarnessError::Timeout(_) => "Timeout",
            HarnessError::WrongAp { .. } => "WrongAP",
            HarnessError::ProfileExists(_) => "ProfileExists",
            HarnessError::ProfileMissing(_) => "ProfileMissing",
            HarnessError::Transport(_) => "TransportError",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout(_))
    }
}

impl From<zbus::Error> for HarnessError {
    fn from(err: zbus::Error) -> Self {
        HarnessError::Transport(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for HarnessError {
    fn from(err: zbus::zvariant::Error) -> Self {
        HarnessError::Transport(err.to_string())
    }
}
