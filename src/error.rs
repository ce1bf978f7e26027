use crate::program::ProgramState;

/// Every way an engine transition can fail.
///
/// Errors are fatal to the attempted transition only. The session is left
/// with no active program and the caller may retry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The audio output subsystem refused to start.
    #[error("Audio output failed to start: {0}")]
    AudioInit(String),

    /// `config.type` names no registered sound program.
    #[error("Unknown profile type '{0}'")]
    UnknownProfileType(String),

    /// The signal chain could not be assembled (reverb tail generation failed).
    #[error("Signal chain build failed: {0}")]
    GraphBuild(String),

    /// Variant parameters failed to deserialize or are out of range.
    #[error("Invalid config for '{kind}': {reason}")]
    InvalidConfig { kind: String, reason: String },

    /// A time value could not be parsed or resolves to a non-positive interval.
    #[error("Invalid time '{0}'")]
    InvalidTime(String),

    /// A program was asked to move to a state its lifecycle does not allow.
    #[error("Cannot {action} a program in state {from:?}")]
    InvalidTransition {
        action: &'static str,
        from: ProgramState,
    },

    /// The profile catalog is not valid JSON of the expected shape.
    #[error("Profile catalog parse error: {0}")]
    Catalog(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid_config(kind: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let e = EngineError::UnknownProfileType("not_a_real_type".into());
        assert_eq!(e.to_string(), "Unknown profile type 'not_a_real_type'");

        let e = EngineError::invalid_config("rain", "dropProbability must be within [0, 1]");
        assert!(e.to_string().contains("rain"));
        assert!(e.to_string().contains("dropProbability"));
    }

    #[test]
    fn transition_error_mentions_state() {
        let e = EngineError::InvalidTransition {
            action: "start",
            from: ProgramState::Stopped,
        };
        assert_eq!(e.to_string(), "Cannot start a program in state Stopped");
    }

    #[test]
    fn catalog_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let e: EngineError = parse.unwrap_err().into();
        assert!(matches!(e, EngineError::Catalog(_)));
    }
}
