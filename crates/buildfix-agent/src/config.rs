use std::time::Duration;

pub const DEFAULT_GENERATOR_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible endpoint used to write missing files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorEndpoint {
    /// Base URL, e.g. `http://localhost:8080/v1`
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl GeneratorEndpoint {
    /// Read `BUILDFIX_GENERATOR_URL` / `_API_KEY` / `_MODEL`.
    ///
    /// `None` when no URL is configured; the engine then uses placeholders.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("BUILDFIX_GENERATOR_URL").filter(|u| !u.trim().is_empty())?;
        let api_key = lookup("BUILDFIX_GENERATOR_API_KEY").filter(|k| !k.is_empty());
        let model = lookup("BUILDFIX_GENERATOR_MODEL")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_GENERATOR_MODEL.into());
        Some(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    /// Full chat-completions URL; accepts a base URL or the full path.
    pub fn completions_url(&self) -> String {
        if self.url.ends_with("/chat/completions") {
            self.url.clone()
        } else {
            format!("{}/chat/completions", self.url)
        }
    }

    /// Base URL without the `/chat/completions` suffix.
    pub fn base_url(&self) -> &str {
        self.url
            .strip_suffix("/chat/completions")
            .unwrap_or(&self.url)
    }
}

/// Check if a generator endpoint is reachable (GET `<base>/models`).
pub async fn check_endpoint(endpoint: &GeneratorEndpoint) -> bool {
    let models_url = format!("{}/models", endpoint.base_url());
    let mut request = reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5));
    if let Some(key) = &endpoint.api_key {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_url_means_no_endpoint() {
        assert!(GeneratorEndpoint::from_lookup(lookup(&[])).is_none());
        assert!(GeneratorEndpoint::from_lookup(lookup(&[("BUILDFIX_GENERATOR_URL", " ")])).is_none());
    }

    #[test]
    fn test_defaults_and_trimming() {
        let endpoint =
            GeneratorEndpoint::from_lookup(lookup(&[("BUILDFIX_GENERATOR_URL", "http://llm:8080/v1/")]))
                .unwrap();
        assert_eq!(endpoint.url, "http://llm:8080/v1");
        assert_eq!(endpoint.model, DEFAULT_GENERATOR_MODEL);
        assert!(endpoint.api_key.is_none());
        assert_eq!(endpoint.completions_url(), "http://llm:8080/v1/chat/completions");
    }

    #[test]
    fn test_full_completions_url_is_kept() {
        let endpoint = GeneratorEndpoint::from_lookup(lookup(&[
            ("BUILDFIX_GENERATOR_URL", "http://llm:8080/v1/chat/completions"),
            ("BUILDFIX_GENERATOR_API_KEY", "sk-test"),
            ("BUILDFIX_GENERATOR_MODEL", "qwen2.5-coder"),
        ]))
        .unwrap();
        assert_eq!(endpoint.completions_url(), "http://llm:8080/v1/chat/completions");
        assert_eq!(endpoint.base_url(), "http://llm:8080/v1");
        assert_eq!(endpoint.api_key.as_deref(), Some("sk-test"));
        assert_eq!(endpoint.model, "qwen2.5-coder");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let endpoint = GeneratorEndpoint {
            url: "http://127.0.0.1:1/v1".to_string(),
            api_key: None,
            model: "m".to_string(),
        };
        assert!(!check_endpoint(&endpoint).await);
    }
}
