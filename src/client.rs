//! Client side of the service: the message contract the browser extension's
//! background worker speaks, and an HTTP client that fulfils it.

use crate::models::VideoSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:3000";

/// A request from the UI to the background worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientRequest {
    ParseVideo { url: String },
    CheckStatus,
}

/// `{success, data | error}` reply to a [`ClientRequest`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not reach the parsing service at {base_url}, make sure it is running")]
    Unreachable {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with an error envelope.
    #[error("{message}")]
    Service { message: String, details: Option<String> },

    #[error("unexpected response from the parsing service: {0}")]
    Decode(String),
}

/// HTTP client for a running parsing service.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        // Extraction can take as long as the service's own subprocess timeout
        // plus one retry.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| ClientError::Unreachable { base_url: base_url.to_string(), source })?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn unreachable(&self, source: reqwest::Error) -> ClientError {
        ClientError::Unreachable { base_url: self.base_url.clone(), source }
    }

    /// `POST /parse`.
    pub async fn parse_video(&self, url: &str) -> Result<VideoSummary, ClientError> {
        let response = self
            .http
            .post(format!("{}/parse", self.base_url))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let ok = response.status().is_success();
        let body: Value = response.json().await.map_err(|e| ClientError::Decode(e.to_string()))?;

        if ok && body["status"] == "success" {
            return serde_json::from_value(body["data"].clone()).map_err(|e| ClientError::Decode(e.to_string()));
        }

        Err(ClientError::Service {
            message: body["error"].as_str().unwrap_or("parse failed").to_string(),
            details: body["details"].as_str().map(str::to_string),
        })
    }

    /// `GET /status`.
    pub async fn check_status(&self) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            return Err(ClientError::Service {
                message: format!("service responded with {}", response.status()),
                details: None,
            });
        }
        response.json().await.map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Single entry point for UI requests. Never fails: every error becomes
    /// a `success: false` response.
    pub async fn dispatch(&self, request: ClientRequest) -> ClientResponse {
        tracing::debug!("Dispatching client request: {:?}", request);
        let result = match request {
            ClientRequest::ParseVideo { url } => self.parse_video(&url).await.and_then(|summary| {
                serde_json::to_value(summary).map_err(|e| ClientError::Decode(e.to_string()))
            }),
            ClientRequest::CheckStatus => self.check_status().await,
        };

        match result {
            Ok(data) => ClientResponse::ok(data),
            Err(e) => {
                tracing::warn!("Client request failed: {}", e);
                ClientResponse::err(e.to_string())
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch) for an undecoded message. A missing or
    /// unknown `action` gets a `success: false` reply as well.
    pub async fn dispatch_value(&self, message: Value) -> ClientResponse {
        match serde_json::from_value::<ClientRequest>(message) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                tracing::warn!("Unrecognized client request: {}", e);
                ClientResponse::err(format!("Unknown request: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::invoker::testing::*;
    use crate::{app, AppState};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn spawn_service(runner: std::sync::Arc<ScriptedRunner>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(AppState::new(Config::default(), runner));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn request_wire_shape() {
        let parse: ClientRequest =
            serde_json::from_value(json!({"action": "parseVideo", "data": {"url": "https://youtu.be/x"}})).unwrap();
        assert_eq!(parse, ClientRequest::ParseVideo { url: "https://youtu.be/x".into() });

        let status: ClientRequest = serde_json::from_value(json!({"action": "checkStatus"})).unwrap();
        assert_eq!(status, ClientRequest::CheckStatus);

        assert!(serde_json::from_value::<ClientRequest>(json!({"action": "downloadVideo"})).is_err());
    }

    #[test]
    fn response_wire_shape() {
        let ok = serde_json::to_value(ClientResponse::ok(json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"a": 1}}));
        let err = serde_json::to_value(ClientResponse::err("nope")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "nope"}));
    }

    #[tokio::test]
    async fn dispatch_parse_and_status_against_live_service() {
        let video = json!({
            "id": "live",
            "title": "Live",
            "formats": [{
                "format_id": "18", "protocol": "https", "vcodec": "avc1", "acodec": "mp4a",
                "height": 360, "url": "https://rr.example.com/videoplayback"
            }]
        });
        let runner = ScriptedRunner::new(vec![ok(&video.to_string()), fail(1, "ERROR: Video unavailable")]);
        let client = ServiceClient::new(&spawn_service(runner).await).unwrap();

        let parsed = client.dispatch(ClientRequest::ParseVideo { url: "https://youtu.be/live".into() }).await;
        assert!(parsed.success);
        let data = parsed.data.unwrap();
        assert_eq!(data["videoId"], "live");
        assert_eq!(data["formats"][0]["quality"], "360p");

        let failed = client.dispatch(ClientRequest::ParseVideo { url: "https://youtu.be/gone".into() }).await;
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("accessible"));

        let status = client.dispatch(ClientRequest::CheckStatus).await;
        assert!(status.success);
        assert_eq!(status.data.unwrap()["status"], "success");
    }

    #[tokio::test]
    async fn unknown_or_missing_action_gets_error_reply() {
        let client = ServiceClient::new(DEFAULT_SERVICE_URL).unwrap();
        for message in [json!({"action": "downloadVideo"}), json!({}), json!("parseVideo")] {
            let response = client.dispatch_value(message.clone()).await;
            assert!(!response.success, "accepted {message}");
            assert!(response.data.is_none());
            assert!(response.error.unwrap().starts_with("Unknown request"));
        }
    }

    #[tokio::test]
    async fn unreachable_service_reports_start_hint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ServiceClient::new(&format!("http://{}/", addr)).unwrap();
        let response = client.dispatch(ClientRequest::CheckStatus).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("make sure it is running"));
    }
}
