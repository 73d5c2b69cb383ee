//! Error types.
//!
//! Two families: [`SimError`] is fatal to the run and propagates to the
//! driver, [`EventAbort`] terminates a single event and never leaves the
//! accumulator.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors surfaced to the driver
#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid construction parameters (unknown material, bad numbers)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Output destination could not be opened, written or read back
    #[error("Storage error on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output file read back with a structure no sink would write
    #[error("Malformed output {}: {message}", path.display())]
    MalformedOutput { path: PathBuf, message: String },

    /// Event script could not be loaded
    #[error("Event script error: {0}")]
    Script(String),

    /// Record (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SimError::Configuration(message.into())
    }

    /// Creates a storage error for `path`.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimError::Storage { path: path.into(), source }
    }

    /// Creates a malformed-output error for `path`.
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SimError::MalformedOutput { path: path.into(), message: message.into() }
    }

    /// Whether this error comes from the output destination
    pub fn is_storage(&self) -> bool {
        matches!(self, SimError::Storage { .. } | SimError::MalformedOutput { .. })
    }
}

/// Result alias for fatal errors
pub type Result<T> = std::result::Result<T, SimError>;

/// Distinguished role a track can be bound to within one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Incident,
    Parent,
    MuPlus,
    MuMinus,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Incident => "incident",
            Role::Parent => "parent",
            Role::MuPlus => "mu+",
            Role::MuMinus => "mu-",
        };
        f.write_str(name)
    }
}

/// Reasons a single event is aborted; recovered by moving to the next event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventAbort {
    /// A second, different track tried to take an already bound role
    #[error("ambiguous topology: second {role} (track {track_id}) while track {bound_id} holds the role")]
    AmbiguousTopology { role: Role, track_id: i32, bound_id: i32 },

    /// The verdict at the end of the priority phase was negative
    #[error("early rejection: no muon conversion found or both muons below threshold")]
    EarlyRejection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SimError::config("unknown material 'G4_X'");
        assert_eq!(err.to_string(), "Configuration error: unknown material 'G4_X'");
        assert!(!err.is_storage());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SimError::storage("/nowhere/out.jsonl", io);
        assert!(err.is_storage());
        assert!(err.to_string().contains("/nowhere/out.jsonl"));
    }

    #[test]
    fn test_abort_messages_name_the_role() {
        let abort = EventAbort::AmbiguousTopology { role: Role::MuMinus, track_id: 9, bound_id: 4 };
        let text = abort.to_string();
        assert!(text.contains("mu-"));
        assert!(text.contains("track 9"));
    }
}
