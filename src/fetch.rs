//! Dual-channel fetching: streaming first, REST with retry as fallback.
//!
//! The streaming channel is a persistent bidirectional connection that can
//! answer some requests faster than REST. It is used only when it is present and
//! open. If it yields nothing usable (closed, null response, missing response
//! field, undecodable payload or a transport error) the REST fallback runs under
//! the retry engine.

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::error::{Result, SyncError};
use crate::retry::{RetryConfig, RetryEngine};

/// Persistent streaming connection capable of request/response calls.
#[async_trait]
pub trait StreamingChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Send one request and wait for its response envelope.
    async fn send(&self, request: &StreamingRequest) -> Result<Value>;
}

/// Request addressed to a named streaming API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingRequest {
    pub api_name: String,
    pub payload_field: String,
    pub payload: Value,
}

impl StreamingRequest {
    pub fn new(
        api_name: impl Into<String>,
        payload_field: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            api_name: api_name.into(),
            payload_field: payload_field.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Wire envelope: `{"api_name": ..., <payload_field>: <payload>}`.
    pub fn envelope(&self) -> Value {
        let mut envelope = serde_json::Map::new();
        envelope.insert("api_name".to_string(), Value::String(self.api_name.clone()));
        envelope.insert(self.payload_field.clone(), self.payload.clone());
        Value::Object(envelope)
    }
}

/// Result of a single streaming attempt.
#[derive(Debug)]
pub enum StreamingOutcome<T> {
    Streaming(T),
    /// Channel closed or absent, or the response carried no usable data
    Unavailable,
    Failed(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Streaming,
    Rest,
}

/// Fetched value tagged with the channel that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: FetchSource,
}

/// Pull the useful part out of a streaming response. Returns `None` when the
/// response or the named field is null or missing.
pub fn extract_response(response: Value, response_key: Option<&str>) -> Option<Value> {
    let extracted = match response_key {
        Some(key) => match response {
            Value::Object(mut fields) => fields.remove(key)?,
            _ => return None,
        },
        None => response,
    };
    (!extracted.is_null()).then_some(extracted)
}

/// Attempt `request` over `channel` once, without retries.
pub async fn try_streaming<T: DeserializeOwned>(
    channel: Option<&dyn StreamingChannel>,
    request: &StreamingRequest,
    response_key: Option<&str>,
) -> StreamingOutcome<T> {
    let channel = match channel {
        Some(channel) if channel.is_open() => channel,
        _ => return StreamingOutcome::Unavailable,
    };

    let response = match channel.send(request).await {
        Ok(response) => response,
        Err(e) => return StreamingOutcome::Failed(e),
    };

    match extract_response(response, response_key) {
        Some(value) => match serde_json::from_value(value) {
            Ok(decoded) => StreamingOutcome::Streaming(decoded),
            Err(e) => StreamingOutcome::Failed(e.into()),
        },
        None => StreamingOutcome::Unavailable,
    }
}

/// Fetch via the streaming channel, falling back to `rest_fallback` wrapped in
/// the retry engine.
#[instrument(
    name = "fetch.with_fallback",
    skip_all,
    fields(api_name = %request.api_name, source)
)]
pub async fn fetch_data_with_socket_fallback<T, F, Fut>(
    engine: &RetryEngine,
    channel: Option<&dyn StreamingChannel>,
    request: &StreamingRequest,
    response_key: Option<&str>,
    rest_fallback: F,
    retry_config: &RetryConfig,
) -> Result<Fetched<T>>
where
    T: DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match try_streaming(channel, request, response_key).await {
        StreamingOutcome::Streaming(value) => {
            tracing::Span::current().record("source", "streaming");
            return Ok(Fetched {
                value,
                source: FetchSource::Streaming,
            });
        }
        StreamingOutcome::Unavailable => {
            tracing::debug!("Streaming channel unavailable, using REST");
        }
        StreamingOutcome::Failed(e) => {
            tracing::warn!(error = %e, "Streaming request failed, falling back to REST");
        }
    }

    tracing::Span::current().record("source", "rest");
    let value = engine.run(retry_config, rest_fallback).await?;
    Ok(Fetched {
        value,
        source: FetchSource::Rest,
    })
}
