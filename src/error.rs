//! Error types for agency orchestration

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AgencyError>;

/// Main error type for agency orchestration
#[derive(Debug, Error)]
pub enum AgencyError {
    /// The agency chart failed structural validation
    #[error("Invalid agency chart: {0}")]
    InvalidChart(String),

    /// Two distinct agents were declared under the same name
    #[error("Duplicate agent name: {0}")]
    DuplicateAgentName(String),

    /// A named agent is not registered
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// A message was addressed to an agent outside the sender's allowed recipients
    #[error("Invalid recipient '{recipient}' for sender '{sender}' (valid recipients: {valid:?})")]
    InvalidRecipient {
        sender: String,
        recipient: String,
        valid: Vec<String>,
    },

    /// Caller-supplied arguments conflict or are out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The external agent backend reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// A structured-output response could not be parsed
    #[error("Failed to parse response: {0}")]
    ParseResponse(String),

    /// The model refused to produce the requested structured output
    #[error("Model refusal: {0}")]
    Refusal(String),

    /// A settings or thread persistence callback failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The final output was requested before the stream was exhausted
    #[error("Final output requested before the completion stream was exhausted")]
    StreamPending,

    /// The stream was dropped before its terminal event was consumed
    #[error("Completion stream abandoned before exhaustion")]
    StreamAbandoned,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgencyError::InvalidChart("chart must not be empty".to_string());
        assert_eq!(err.to_string(), "Invalid agency chart: chart must not be empty");

        let err = AgencyError::DuplicateAgentName("CEO".to_string());
        assert_eq!(err.to_string(), "Duplicate agent name: CEO");

        let err = AgencyError::Refusal("I cannot do that".to_string());
        assert_eq!(err.to_string(), "Model refusal: I cannot do that");
    }

    #[test]
    fn test_invalid_recipient_lists_valid_names() {
        let err = AgencyError::InvalidRecipient {
            sender: "CEO".to_string(),
            recipient: "Stranger".to_string(),
            valid: vec!["Developer".to_string(), "Analyst".to_string()],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("Stranger"));
        assert!(rendered.contains("Developer"));
        assert!(rendered.contains("Analyst"));
    }

    #[test]
    fn test_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: AgencyError = parse_err.into();
        assert!(matches!(err, AgencyError::Serialization(_)));
    }

    #[test]
    fn test_result_type() {
        fn example_function() -> Result<String> {
            Ok("success".to_string())
        }

        let result = example_function();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
    }
}
