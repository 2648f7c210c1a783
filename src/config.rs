use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    /// Native Generative Language API.
    Gemini,
    /// Gemini through Google's OpenAI-compatible endpoint.
    Google,
    OpenAI,
    Ollama,
}

impl LlmProviderKind {
    pub fn parse(name: &str) -> AppResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(AppError::Config(format!(
                "unknown LLM_PROVIDER {other:?} (expected gemini, google, openai or ollama)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Google => "google",
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub llm_provider: LlmProviderKind,
    pub llm_model: String,
    pub temperature: f32,
    pub request_timeout: Option<Duration>,
    /// Credential for the selected provider; `None` only for Ollama.
    pub api_key: Option<String>,
    pub gemini_base_url: String,
    pub ollama_base_url: String,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_provider =
            LlmProviderKind::parse(&get("LLM_PROVIDER").unwrap_or_else(|| "gemini".to_string()))?;

        let api_key = match llm_provider {
            LlmProviderKind::Gemini | LlmProviderKind::Google => {
                Some(get("GOOGLE_API_KEY").ok_or_else(|| {
                    AppError::Config(
                        "GOOGLE_API_KEYが設定されていません。.envファイルを確認してください。"
                            .to_string(),
                    )
                })?)
            }
            LlmProviderKind::OpenAI => Some(get("OPENAI_API_KEY").ok_or_else(|| {
                AppError::Config(
                    "OPENAI_API_KEYが設定されていません。.envファイルを確認してください。"
                        .to_string(),
                )
            })?),
            LlmProviderKind::Ollama => None,
        };

        let temperature = match get("LLM_TEMPERATURE") {
            Some(raw) => parse_temperature(&raw)?,
            None => 0.0,
        };

        let request_timeout = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().map_err(
                |_| AppError::Config(format!("LLM_TIMEOUT_SECS must be a number, got {raw:?}")),
            )?)),
            None => None,
        };

        Ok(Self {
            environment: get("CONSULT_ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            llm_provider,
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            request_timeout,
            api_key,
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            ollama_base_url: get("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            otel_service_name: get("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "ai-consultant".to_string()),
            otel_exporter_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Finite and within 0.0..=2.0, the range every supported provider accepts.
fn parse_temperature(raw: &str) -> AppResult<f32> {
    let value = raw
        .trim()
        .parse::<f32>()
        .map_err(|_| AppError::Config(format!("LLM_TEMPERATURE must be a number, got {raw:?}")))?;
    if !value.is_finite() || !(0.0..=2.0).contains(&value) {
        return Err(AppError::Config(format!(
            "LLM_TEMPERATURE must be between 0.0 and 2.0, got {raw:?}"
        )));
    }
    Ok(value)
}
