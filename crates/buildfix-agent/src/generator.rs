//! Content generator backed by an OpenAI-compatible chat-completions API.

use crate::config::GeneratorEndpoint;
use async_trait::async_trait;
use buildfix::content::{
    ContentGenerator, ContentRequest, FileType, GeneratedContent, GeneratorError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You write small, plausible project files that a container build \
expects but that are missing. Reply with the file content only: no explanation, no markdown fences.";

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct HttpContentGenerator {
    endpoint: GeneratorEndpoint,
    client: reqwest::Client,
    max_tokens: u32,
}

impl HttpContentGenerator {
    pub fn new(endpoint: GeneratorEndpoint) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            max_tokens: 1024,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn endpoint(&self) -> &GeneratorEndpoint {
        &self.endpoint
    }
}

/// User prompt for one missing file.
pub fn build_prompt(request: &ContentRequest) -> String {
    let guidance = match request.file_type {
        FileType::Config => "Use safe, minimal defaults in the format the extension implies.",
        FileType::Docs => "Write a short document consistent with the project.",
        FileType::Rules => "Write a conservative lint/format rule set for the detected stack.",
        FileType::Source => "Write a minimal module that compiles or parses and does nothing harmful.",
        FileType::Other => "Write the smallest reasonable content for this file.",
    };
    format!(
        "The build requires `{}` ({} file) but it is missing.\n{}\n\n## Project\n\n{}",
        request.path, request.file_type, guidance, request.project_context
    )
}

/// Remove a surrounding markdown code fence, if the model added one.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return ensure_trailing_newline(trimmed);
    };
    // Drop the info string (```yaml) along with the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    ensure_trailing_newline(body.trim_end_matches('\n'))
}

fn ensure_trailing_newline(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("{}\n", text)
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    fn name(&self) -> &str {
        &self.endpoint.model
    }

    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent, GeneratorError> {
        let body = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(request),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.2,
        };

        let mut http = self.client.post(self.endpoint.completions_url()).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                GeneratorError::Unavailable(e.to_string())
            } else {
                GeneratorError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Request(format!(
                "generator API error ({}): {}",
                status, text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Request(format!("failed to parse response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| strip_code_fences(&c))
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }

        tracing::info!(
            path = %request.path,
            model = %self.endpoint.model,
            bytes = content.len(),
            "generated file content"
        );
        Ok(GeneratedContent { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_language() {
        assert_eq!(strip_code_fences("```yaml\nkey: value\n```"), "key: value\n");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}\n");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_code_fences("key: value"), "key: value\n");
        assert_eq!(strip_code_fences("  \n"), "");
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}\n");
    }

    #[test]
    fn test_prompt_mentions_path_and_context() {
        let prompt = build_prompt(&ContentRequest {
            path: "app/config.yaml".to_string(),
            file_type: FileType::Config,
            project_context: "Stack: node\n".to_string(),
        });
        assert!(prompt.contains("`app/config.yaml` (config file)"));
        assert!(prompt.ends_with("Stack: node\n"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let generator = HttpContentGenerator::new(GeneratorEndpoint {
            url: "http://127.0.0.1:1/v1".to_string(),
            api_key: None,
            model: "test-model".to_string(),
        })
        .unwrap();
        let err = generator
            .generate(&ContentRequest {
                path: "a.json".to_string(),
                file_type: FileType::Config,
                project_context: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::Unavailable(_) | GeneratorError::Request(_)
        ));
    }
}
