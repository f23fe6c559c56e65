//! Gemini API client backing the search workers and the sub-query
//! generator. Uses a long-lived reqwest::Client for connection pooling.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::OrchestrationError;
use crate::models::Source;

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Answer plus the grounding attributions the model consulted.
#[derive(Debug, Clone)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_URL.to_string(),
        })
    }

    /// Plain text generation, used for sub-query generation.
    pub async fn generate(&self, system: &str, prompt: &str) -> crate::Result<String> {
        let response = self.call(system, prompt, false).await?;
        Ok(response.text)
    }

    /// Search-grounded generation: the model may consult web search, and
    /// the attributions it used come back as sources.
    pub async fn generate_grounded(
        &self,
        system: &str,
        prompt: &str,
    ) -> crate::Result<GroundedAnswer> {
        self.call(system, prompt, true).await
    }

    async fn call(
        &self,
        system: &str,
        prompt: &str,
        grounded: bool,
    ) -> crate::Result<GroundedAnswer> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::SearchError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let tools = if grounded {
            Some(vec![ToolSpec {
                google_search: GoogleSearchSpec {},
            }])
        } else {
            None
        };

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
            tools,
        };

        debug!(grounded, "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::SearchError(format!("Gemini API error: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(OrchestrationError::SearchError(format!(
                "Gemini API error: {error_text}"
            )));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::SearchError(format!("Gemini parse error: {e}"))
        })?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| OrchestrationError::SearchError("No response from Gemini".to_string()))?;

        let text = candidate
            .content
            .parts
            .first()
            .map(|p| p.text.clone())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(OrchestrationError::SearchError(
                "Empty response from Gemini".to_string(),
            ));
        }

        let sources = candidate
            .grounding_metadata
            .map(|m| sources_from_metadata(&m))
            .unwrap_or_default();

        Ok(GroundedAnswer { text, sources })
    }
}

fn sources_from_metadata(metadata: &GroundingMetadata) -> Vec<Source> {
    metadata
        .grounding_chunks
        .iter()
        .filter_map(|chunk| {
            let web = chunk.web.as_ref()?;
            Some(Source {
                title: web.title.clone().unwrap_or_default(),
                url: web.uri.clone()?,
                snippet: String::new(),
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(rename = "systemInstruction")]
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "google_search")]
    google_search: GoogleSearchSpec,
}

#[derive(Debug, Serialize)]
struct GoogleSearchSpec {}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization_includes_search_tool_when_grounded() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "EV battery market outlook".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "You are a research assistant".to_string(),
                }],
            },
            tools: Some(vec![ToolSpec {
                google_search: GoogleSearchSpec {},
            }]),
        };

        let json = serde_json::to_string(&request).expect("serializes");
        assert!(json.contains("google_search"));
        assert!(json.contains("EV battery market outlook"));
    }

    #[test]
    fn grounding_metadata_maps_to_sources() {
        let metadata = GroundingMetadata {
            grounding_chunks: vec![
                GroundingChunk {
                    web: Some(WebSource {
                        uri: Some("https://example.com/a".to_string()),
                        title: Some("Example A".to_string()),
                    }),
                },
                GroundingChunk { web: None },
                GroundingChunk {
                    web: Some(WebSource {
                        uri: None,
                        title: Some("No link".to_string()),
                    }),
                },
            ],
        };

        let sources = sources_from_metadata(&metadata);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "https://example.com/a");
        assert_eq!(sources[0].title, "Example A");
    }
}
