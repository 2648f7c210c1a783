use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
};

use super::{GenerateRequest, GenerateResponse, Provider};

pub const GOOGLE_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Chat-completions provider for OpenAI and the OpenAI-compatible endpoints
/// (Google, Ollama).
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    provider_name: &'static str,
    api_base: Option<String>,
}

impl OpenAIProvider {
    fn build(provider_name: &'static str, api_key: &str, api_base: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &api_base {
            config = config.with_api_base(base.clone());
        }
        Self {
            client: Client::with_config(config),
            provider_name,
            api_base,
        }
    }

    pub fn new(api_key: &str) -> Self {
        Self::build("openai", api_key, None)
    }

    pub fn new_google(api_key: &str) -> Self {
        Self::build("google", api_key, Some(GOOGLE_OPENAI_BASE.to_string()))
    }

    /// Ollama ignores the key but the client still sends one.
    pub fn new_ollama(base_url: &str) -> Self {
        let base = format!("{}/v1", base_url.trim_end_matches('/'));
        Self::build("ollama", "ollama", Some(base))
    }

    /// `None` means the client library's default OpenAI base.
    pub fn api_base(&self) -> Option<&str> {
        self.api_base.as_deref()
    }
}

/// One user message carrying the rendered prompt; no system message.
fn build_chat_request(req: &GenerateRequest) -> CreateChatCompletionRequest {
    let messages = vec![ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(req.prompt.clone()),
            name: None,
        },
    )];

    #[allow(deprecated)]
    let request = CreateChatCompletionRequest {
        model: req.model.clone(),
        messages,
        temperature: Some(req.temperature),
        ..Default::default()
    };
    request
}

struct FirstChoice {
    content: Option<String>,
    finish_reason: String,
}

struct ChatOutcome {
    model: String,
    first_choice: Option<FirstChoice>,
    input_tokens: u32,
    output_tokens: u32,
}

fn into_generate_response(
    provider_name: &str,
    outcome: ChatOutcome,
) -> anyhow::Result<GenerateResponse> {
    let choice = outcome
        .first_choice
        .ok_or_else(|| anyhow::anyhow!("{provider_name} API returned no choices"))?;

    let content = choice.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "{provider_name} API returned an empty completion (finish reason: {})",
            choice.finish_reason
        ));
    }

    Ok(GenerateResponse {
        content,
        model: outcome.model,
        input_tokens: outcome.input_tokens,
        output_tokens: outcome.output_tokens,
        finish_reason: choice.finish_reason,
        provider: String::new(),
    })
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let response = self.client.chat().create(build_chat_request(req)).await?;

        let first_choice = response.choices.into_iter().next().map(|c| FirstChoice {
            content: c.message.content,
            finish_reason: c
                .finish_reason
                .map(|r| format!("{r:?}").to_lowercase())
                .unwrap_or_default(),
        });

        let (input_tokens, output_tokens) = match &response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (0, 0),
        };

        into_generate_response(
            self.provider_name,
            ChatOutcome {
                model: response.model,
                first_choice,
                input_tokens,
                output_tokens,
            },
        )
    }

    fn name(&self) -> &str {
        self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-1.5-flash".to_string(),
            prompt: "あなたは優秀なコンサルタントです。".to_string(),
            temperature: 0.0,
        }
    }

    fn outcome(first_choice: Option<FirstChoice>) -> ChatOutcome {
        ChatOutcome {
            model: "gemini-1.5-flash".to_string(),
            first_choice,
            input_tokens: 20,
            output_tokens: 8,
        }
    }

    #[test]
    fn test_chat_request_is_single_user_message() {
        let body = serde_json::to_value(build_chat_request(&request())).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "あなたは優秀なコンサルタントです。");
        assert_eq!(body["model"], "gemini-1.5-flash");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_chat_request_passes_temperature_through() {
        let req = GenerateRequest {
            temperature: 0.5,
            ..request()
        };
        assert_eq!(build_chat_request(&req).temperature, Some(0.5));
    }

    #[test]
    fn test_completion_maps_to_response() {
        let resp = into_generate_response(
            "google",
            outcome(Some(FirstChoice {
                content: Some("{\"a\": 1}".to_string()),
                finish_reason: "stop".to_string(),
            })),
        )
        .unwrap();
        assert_eq!(resp.content, "{\"a\": 1}");
        assert_eq!(resp.model, "gemini-1.5-flash");
        assert_eq!(resp.input_tokens, 20);
        assert_eq!(resp.output_tokens, 8);
        assert_eq!(resp.finish_reason, "stop");
    }

    #[test]
    fn test_no_choices_is_error() {
        let err = into_generate_response("openai", outcome(None)).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_empty_completion_is_error() {
        for content in [None, Some(String::new()), Some("  \n".to_string())] {
            let err = into_generate_response(
                "ollama",
                outcome(Some(FirstChoice {
                    content,
                    finish_reason: "length".to_string(),
                })),
            )
            .unwrap_err();
            assert!(err.to_string().contains("empty completion"));
            assert!(err.to_string().contains("length"));
        }
    }

    #[test]
    fn test_provider_endpoints() {
        let openai = OpenAIProvider::new("k");
        assert_eq!(openai.name(), "openai");
        assert_eq!(openai.api_base(), None);

        let google = OpenAIProvider::new_google("k");
        assert_eq!(google.name(), "google");
        assert_eq!(google.api_base(), Some(GOOGLE_OPENAI_BASE));

        let ollama = OpenAIProvider::new_ollama("http://localhost:11434/");
        assert_eq!(ollama.name(), "ollama");
        assert_eq!(ollama.api_base(), Some("http://localhost:11434/v1"));
    }
}
