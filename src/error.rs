use thiserror::Error;

/// Prefix of the flattened message shown on the terminal surface.
pub const FAILURE_PREFIX: &str = "エラーが発生しました";

#[derive(Error, Debug)]
pub enum AppError {
    /// Startup misconfiguration: missing credential, unknown provider, bad number.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network, authentication or remote-service failure during the completion call.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The completion did not match the declared output schema.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "initialization",
            AppError::Llm(_) => "transport",
            AppError::Parse(_) => "parse",
        }
    }
}

/// Flattens any failure into the single human-readable line printed by the CLI.
pub fn failure_message(err: &AppError) -> String {
    format!("{FAILURE_PREFIX}: {err}")
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let error = AppError::Config("GOOGLE_API_KEY missing".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: GOOGLE_API_KEY missing"
        );
    }

    #[test]
    fn test_llm_error() {
        let error = AppError::Llm("provider timeout".to_string());
        assert_eq!(error.to_string(), "LLM error: provider timeout");
    }

    #[test]
    fn test_parse_error() {
        let error = AppError::Parse("missing field `cost_estimate`".to_string());
        assert_eq!(
            error.to_string(),
            "Parse error: missing field `cost_estimate`"
        );
    }

    #[test]
    fn test_error_kinds() {
        let test_cases = vec![
            (AppError::Config("x".to_string()), "initialization"),
            (AppError::Llm("x".to_string()), "transport"),
            (AppError::Parse("x".to_string()), "parse"),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.kind(), expected);
        }
    }

    #[test]
    fn test_failure_message_embeds_details() {
        let message = failure_message(&AppError::Llm("401 unauthorized".to_string()));
        assert_eq!(message, "エラーが発生しました: LLM error: 401 unauthorized");
        assert!(message.starts_with("エラーが発生しました:"));
    }

    #[test]
    fn test_app_result_err() {
        fn returns_err() -> AppResult<i32> {
            Err(AppError::Parse("test".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
