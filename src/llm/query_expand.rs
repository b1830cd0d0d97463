use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::SearchError;
use crate::llm::QueryRewriter;

fn rewrite_prompt(query: &str) -> String {
    format!("Rewrite this query to improve search results. Keep the meaning, add synonyms and context {query}")
}

/// Query rewriting through a single chat completion.
pub struct HttpQueryRewriter {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpQueryRewriter {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl QueryRewriter for HttpQueryRewriter {
    async fn rewrite(&self, query: &str) -> Result<String> {
        let prompt = rewrite_prompt(query);

        let response = match self.config.provider.as_str() {
            "ollama" => call_ollama(&self.client, &self.config, &prompt).await?,
            "openai" => call_openai(&self.client, &self.config, &prompt).await?,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        };

        Ok(response.trim().to_string())
    }
}

/// Engine-facing rewrite step. Not cached: every call reaches the provider.
pub struct QueryExpander {
    rewriter: Arc<dyn QueryRewriter>,
}

impl QueryExpander {
    pub fn new(rewriter: Arc<dyn QueryRewriter>) -> Self {
        Self { rewriter }
    }

    pub async fn expand(&self, query: &str) -> crate::error::Result<String> {
        let rewritten = self
            .rewriter
            .rewrite(query)
            .await
            .map_err(SearchError::provider("query_rewriter"))?;

        Ok(or_original(rewritten, query))
    }
}

fn or_original(rewritten: String, query: &str) -> String {
    if rewritten.trim().is_empty() {
        tracing::warn!("Query rewrite came back blank; keeping original query");
        query.to_string()
    } else {
        rewritten
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

async fn call_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url);

    let req = OllamaChatRequest {
        model: config.chat_model.clone(),
        messages: vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        stream: false,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API for query rewrite")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama chat API returned {status}: {body}");
    }

    let body: OllamaChatResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama chat response")?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn call_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = OpenAiChatRequest {
        model: config.chat_model.clone(),
        messages: vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: 0.3,
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI chat API for query rewrite")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI chat API returned {status}: {body}");
    }

    let body: OpenAiChatResponse = resp
        .json()
        .await
        .context("Failed to parse OpenAI chat response")?;
    Ok(body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl QueryRewriter for Fixed {
        async fn rewrite(&self, _query: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl QueryRewriter for Down {
        async fn rewrite(&self, _query: &str) -> Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_prompt_carries_query() {
        let prompt = rewrite_prompt("capital of France");
        assert!(prompt.starts_with("Rewrite this query to improve search results."));
        assert!(prompt.ends_with("add synonyms and context capital of France"));
    }

    #[tokio::test]
    async fn test_expand_returns_rewrite() {
        let expander = QueryExpander::new(Arc::new(Fixed("Paris France capital city")));
        assert_eq!(
            expander.expand("capital of France").await.unwrap(),
            "Paris France capital city"
        );
    }

    #[tokio::test]
    async fn test_blank_rewrite_keeps_original() {
        let expander = QueryExpander::new(Arc::new(Fixed("  \n")));
        assert_eq!(expander.expand("where is Bob").await.unwrap(), "where is Bob");
    }

    #[tokio::test]
    async fn test_rewriter_failure_is_provider_error() {
        let expander = QueryExpander::new(Arc::new(Down));
        let err = expander.expand("q").await.unwrap_err();
        assert!(err.is_provider());
        assert!(err.to_string().contains("query_rewriter"));
    }

    #[test]
    fn test_openai_null_content_parses() {
        let body: OpenAiChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(body.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let rewriter = HttpQueryRewriter::new(
            reqwest::Client::new(),
            LlmConfig {
                provider: "carrier-pigeon".to_string(),
                ..LlmConfig::default()
            },
        );
        let err = rewriter.rewrite("q").await.unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }
}
