use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider};
use crate::error::AppError;
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_TOKEN_USAGE,
};

/// Single-attempt completion client. No retry and no fallback provider.
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    timeout: Option<Duration>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, AppError> {
        let provider_name = self.provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let (server_addr, server_port) = provider_server(&provider_name);

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            server.address = %server_addr,
            server.port = server_port,
            gen_ai.request.temperature = req.temperature,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))],
        );

        let call = self.provider.generate(req).instrument(span.clone());
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::anyhow!(
                    "request timed out after {}s",
                    limit.as_secs_f64()
                )),
            },
            None => call.await,
        };

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(mut resp) => {
                resp.provider = provider_name.clone();

                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
                let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                tracing::debug!(
                    parent: &span,
                    input_tokens = resp.input_tokens,
                    output_tokens = resp.output_tokens,
                    duration_s = duration,
                    "completion received"
                );

                Ok(resp)
            }
            Err(err) => {
                let error_type = classify_error(&err);
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name.clone()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                        KeyValue::new("error.type", error_type),
                    ],
                );

                tracing::warn!(
                    parent: &span,
                    provider = %provider_name,
                    model = %req.model,
                    error.type = error_type,
                    error = %err,
                    "LLM call failed"
                );

                Err(AppError::Llm(err.to_string()))
            }
        }
    }
}

fn provider_server(provider_name: &str) -> (&'static str, i64) {
    match provider_name {
        "openai" => ("api.openai.com", 443),
        "gemini" | "google" => ("generativelanguage.googleapis.com", 443),
        "ollama" => ("localhost", 11434),
        _ => ("unknown", 443),
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") || msg.contains("resource_exhausted") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, c)| i + c.len_utf8() <= max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        reply: Result<&'static str, &'static str>,
        delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl Provider for CountingProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.reply {
                Ok(content) => Ok(GenerateResponse {
                    content: content.to_string(),
                    model: req.model.clone(),
                    input_tokens: 10,
                    output_tokens: 4,
                    finish_reason: "stop".to_string(),
                    provider: String::new(),
                }),
                Err(msg) => Err(anyhow::anyhow!(msg)),
            }
        }

        fn name(&self) -> &str {
            "gemini"
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-1.5-flash-latest".to_string(),
            prompt: "prompt".to_string(),
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_generate_sets_provider_name() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: Ok("text"),
            delay: None,
        });
        let client = LlmClient::new(provider.clone());
        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.content, "text");
        assert_eq!(resp.provider, "gemini");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: Err("503 service unavailable"),
            delay: None,
        });
        let client = LlmClient::new(provider.clone());
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
        assert!(err.to_string().contains("503"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_llm_error() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            reply: Ok("late"),
            delay: Some(Duration::from_millis(500)),
        });
        let client =
            LlmClient::new(provider).with_timeout(Some(Duration::from_millis(20)));
        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_classify_error_categories() {
        let cases = vec![
            ("rate limit exceeded", "rate_limit"),
            ("status 429: too many requests", "rate_limit"),
            ("RESOURCE_EXHAUSTED: quota", "rate_limit"),
            ("context deadline exceeded: timeout", "timeout"),
            ("request timed out", "timeout"),
            ("401 unauthorized", "auth_error"),
            ("403 forbidden", "auth_error"),
            ("authentication failed", "auth_error"),
            ("API key not valid", "auth_error"),
            ("400 bad request", "invalid_request"),
            ("422 unprocessable entity", "invalid_request"),
            ("invalid model name", "invalid_request"),
            ("500 internal server error", "server_error"),
            ("502 bad gateway", "server_error"),
            ("503 service unavailable", "server_error"),
            ("connection refused", "network_error"),
            ("dns resolution failed", "network_error"),
            ("connection reset by peer", "network_error"),
            ("something unexpected", "unknown_error"),
        ];

        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{}", msg);
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({msg:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_provider_server() {
        assert_eq!(
            provider_server("gemini"),
            ("generativelanguage.googleapis.com", 443)
        );
        assert_eq!(provider_server("openai"), ("api.openai.com", 443));
        assert_eq!(provider_server("ollama"), ("localhost", 11434));
        assert_eq!(provider_server("other"), ("unknown", 443));
    }

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let result = truncate("情報共有の課題", 7);
        assert!(result.len() <= 7);
        assert_eq!(result, "情報");
        assert!("情報共有の課題".starts_with(&result));
    }

    #[test]
    fn test_truncate_never_exceeds_limit() {
        let text = "hé世界!情報共有";
        for max in 0..text.len() {
            let result = truncate(text, max);
            assert!(result.len() <= max, "truncate(.., {max}) gave {result:?}");
            assert!(text.starts_with(&result));
        }
    }
}
