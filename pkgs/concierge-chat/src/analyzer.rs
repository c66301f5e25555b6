//! Message analysis service client
//!
//! Guest messages are sent to an analysis function that translates them and
//! tags sentiment, urgency and topic. The documented response is
//! `{"result": {...}}`. Older deployments answer `{"results": {"answer": ...}}`;
//! that envelope is still accepted and is checked first.

use crate::error::AnalysisError;
use async_trait::async_trait;
use concierge_store::Enrichment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const FULL_PIPELINE_TASK: &str = "full_pipeline";

/// Body of an analysis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub task: String,
    pub text: String,
    pub message_id: String,
    pub original_language: String,
    pub target_language: String,
    pub hotel_id: String,
}

impl AnalysisRequest {
    pub fn full_pipeline(
        text: impl Into<String>,
        message_id: impl Into<String>,
        original_language: impl Into<String>,
        target_language: impl Into<String>,
        hotel_id: impl Into<String>,
    ) -> Self {
        Self {
            task: FULL_PIPELINE_TASK.to_string(),
            text: text.into(),
            message_id: message_id.into(),
            original_language: original_language.into(),
            target_language: target_language.into(),
            hotel_id: hotel_id.into(),
        }
    }
}

/// Analysis result for one message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, alias = "translation")]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub subtopic: Option<String>,
}

impl AnalysisResult {
    /// Extract the result from a response body.
    ///
    /// A result that is not an object (a plain answer string, say) carries
    /// no enrichment and yields an empty result.
    pub fn from_response(body: &Value) -> Result<Self, AnalysisError> {
        let result = body
            .get("results")
            .and_then(|results| results.get("answer"))
            .filter(|answer| !answer.is_null())
            .or_else(|| body.get("result").filter(|result| !result.is_null()))
            .ok_or(AnalysisError::MissingResult)?;

        match result {
            Value::Object(_) => Ok(serde_json::from_value(result.clone())?),
            other => {
                debug!("Analysis result carries no enrichment: {}", other);
                Ok(Self::default())
            }
        }
    }

    pub fn into_enrichment(self) -> Enrichment {
        Enrichment {
            translated_text: self.translated_text,
            sentiment: self.sentiment,
            urgency: self.urgency,
            topic: self.topic,
            subtopic: self.subtopic,
        }
    }
}

/// Message analysis service
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// Analysis over HTTP: POSTs the request as JSON to `endpoint`
#[derive(Clone)]
pub struct HttpAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    bearer: String,
}

impl HttpAnalyzer {
    /// `token` is the guest's session token; without one the anon key is
    /// used as the bearer.
    pub fn new(
        endpoint: impl Into<String>,
        anon_key: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(AnalysisError::NotConfigured("empty endpoint".to_string()));
        }

        let api_key = anon_key.into();
        let bearer = token.unwrap_or_else(|| api_key.clone());
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            bearer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.bearer)
            .header("apikey", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        AnalysisResult::from_response(&body)
    }
}
