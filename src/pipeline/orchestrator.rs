use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

use crate::config::{Config, LlmProviderKind};
use crate::error::{AppError, AppResult, failure_message};
use crate::llm::gemini::GeminiProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::{GenerateRequest, LlmClient, Provider};
use crate::telemetry::metrics::{CONSULT_DURATION, CONSULT_FAILURES};

use super::parse::{Solution, parse_solution};
use super::prompt::ConsultPrompt;
use super::schema::{CONSULTING_SCHEMAS, format_instructions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultRequest {
    pub title: String,
    pub detail: String,
}

/// Renders the prompt, calls the model once and parses the reply.
pub struct Consultant {
    llm_client: LlmClient,
    model: String,
    temperature: f32,
    prompt: ConsultPrompt,
}

impl Consultant {
    pub fn new(llm_client: LlmClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            llm_client,
            model: model.into(),
            temperature,
            prompt: ConsultPrompt::new(format_instructions(&CONSULTING_SCHEMAS)),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let llm_client =
            LlmClient::new(build_provider(config)?).with_timeout(config.request_timeout);

        tracing::info!(
            provider = llm_client.provider_name(),
            model = %config.llm_model,
            temperature = config.temperature,
            "LLM client initialized"
        );

        Ok(Self::new(llm_client, config.llm_model.clone(), config.temperature))
    }

    pub fn prompt(&self) -> &ConsultPrompt {
        &self.prompt
    }

    #[tracing::instrument(
        name = "consult",
        skip(self, request),
        fields(
            gen_ai.request.model = %self.model,
            consult.title_chars = request.title.chars().count(),
            consult.stage,
            consult.outcome,
        )
    )]
    pub async fn get_solution(&self, request: &ConsultRequest) -> AppResult<Solution> {
        let start = Instant::now();
        let span = tracing::Span::current();

        let result = self.run(request, &span).await;

        CONSULT_DURATION.record(start.elapsed().as_secs_f64(), &[]);
        match &result {
            Ok(solution) => {
                span.record("consult.outcome", "ok");
                tracing::info!(
                    solution_proposals = solution.solution_proposals.len(),
                    similar_cases = solution.similar_cases.len(),
                    cost_estimate = solution.cost_estimate.len(),
                    "consultation completed"
                );
            }
            Err(err) => {
                span.record("consult.outcome", err.kind());
                CONSULT_FAILURES.add(1, &[KeyValue::new("error.kind", err.kind())]);
                tracing::error!(error.kind = err.kind(), error = %err, "consultation failed");
            }
        }

        result
    }

    async fn run(&self, request: &ConsultRequest, span: &tracing::Span) -> AppResult<Solution> {
        span.record("consult.stage", "render");
        let prompt = self.prompt.render(&request.title, &request.detail);

        span.record("consult.stage", "generate");
        let resp = self
            .llm_client
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt,
                temperature: self.temperature,
            })
            .await?;

        span.record("consult.stage", "parse");
        parse_solution(&resp.content)
    }

    /// Terminal-facing surface: JSON text on success, the flattened error line otherwise.
    pub async fn get_solution_text(&self, title: &str, detail: &str) -> String {
        let request = ConsultRequest {
            title: title.to_string(),
            detail: detail.to_string(),
        };
        match self
            .get_solution(&request)
            .await
            .and_then(|solution| render_solution(&solution))
        {
            Ok(text) => text,
            Err(err) => failure_message(&err),
        }
    }
}

/// Pretty JSON, two-space indentation, non-ASCII left as-is.
pub fn render_solution(solution: &Solution) -> AppResult<String> {
    serde_json::to_string_pretty(solution)
        .map_err(|e| AppError::Parse(format!("failed to serialize solution: {e}")))
}

fn build_provider(config: &Config) -> AppResult<Arc<dyn Provider>> {
    let api_key = || {
        config.api_key.as_deref().ok_or_else(|| {
            AppError::Config(format!(
                "no API key configured for provider {}",
                config.llm_provider.as_str()
            ))
        })
    };

    let provider: Arc<dyn Provider> = match config.llm_provider {
        LlmProviderKind::Gemini => {
            Arc::new(GeminiProvider::new(api_key()?, &config.gemini_base_url))
        }
        LlmProviderKind::Google => Arc::new(OpenAIProvider::new_google(api_key()?)),
        LlmProviderKind::OpenAI => Arc::new(OpenAIProvider::new(api_key()?)),
        LlmProviderKind::Ollama => Arc::new(OpenAIProvider::new_ollama(&config.ollama_base_url)),
    };
    Ok(provider)
}
