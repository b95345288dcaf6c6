//! Prometheus HTTP API querier (`/api/v1/query`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{reduce, QueryData, QueryError, Querier};
use crate::config::QuerierConfig;

/// Response envelope shared by all Prometheus API endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: ApiStatus,
    data: Option<QueryData>,
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ApiStatus {
    Success,
    Error,
}

/// Querier backed by a Prometheus server
#[derive(Clone)]
pub struct PrometheusQuerier {
    client: reqwest::Client,
    endpoint: String,
}

impl PrometheusQuerier {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, QueryError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "agni-bridge/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/api/v1/query", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &QuerierConfig) -> Result<Self, QueryError> {
        Self::new(&config.url, config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Querier for PrometheusQuerier {
    async fn query(&self, at: DateTime<Utc>, query: &str) -> Result<f64, QueryError> {
        let time = format_time(at);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        let data = decode_response(status.as_u16(), &body)?;
        reduce(&data)
    }
}

/// Unix seconds with millisecond precision, as the API expects
fn format_time(at: DateTime<Utc>) -> String {
    format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis())
}

/// Extract the result of a `/api/v1/query` response.
///
/// Error bodies carry `errorType`/`error` on 4xx/5xx statuses; the bare HTTP
/// status is reported only when the body is not an API envelope.
fn decode_response(status: u16, body: &[u8]) -> Result<QueryData, QueryError> {
    let envelope: ApiResponse = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(QueryError::Decode(e.to_string())),
        Err(_) => return Err(QueryError::Status(status)),
    };

    for warning in &envelope.warnings {
        debug!("Prometheus warning: {}", warning);
    }

    match envelope.status {
        ApiStatus::Success => envelope
            .data
            .ok_or_else(|| QueryError::Decode("missing data".to_string())),
        ApiStatus::Error => Err(QueryError::Api {
            error_type: envelope.error_type.unwrap_or_else(|| "error".to_string()),
            message: envelope.error.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::querier::SamplePair;
    use chrono::TimeZone;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `status` and `body`; the handle yields the request head
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });

        (format!("http://{}/", addr), handle)
    }

    #[test]
    fn test_endpoint() {
        let q = PrometheusQuerier::new("http://localhost:9090/", None).unwrap();
        assert_eq!(q.endpoint(), "http://localhost:9090/api/v1/query");

        let q = PrometheusQuerier::from_config(&QuerierConfig::default()).unwrap();
        assert_eq!(q.endpoint(), "http://localhost:9090/api/v1/query");
    }

    #[test]
    fn test_format_time() {
        let at = Utc.timestamp_millis_opt(1_435_781_451_781).unwrap();
        assert_eq!(format_time(at), "1435781451.781");

        let at = Utc.timestamp_opt(1000, 0).unwrap();
        assert_eq!(format_time(at), "1000.000");
    }

    #[test]
    fn test_decode_vector() {
        let body = br#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"__name__": "up", "job": "a"}, "value": [1435781451.781, "1"]},
                    {"metric": {"__name__": "up", "job": "b"}, "value": [1435781451.781, "0.5"]}
                ]
            }
        }"#;
        let data = decode_response(200, body).unwrap();
        assert_eq!(reduce(&data).unwrap(), 1.5);
    }

    #[test]
    fn test_decode_scalar_with_warnings() {
        let body = br#"{
            "status": "success",
            "data": {"resultType": "scalar", "result": [1435781451.781, "42"]},
            "warnings": ["partial response"]
        }"#;
        let data = decode_response(200, body).unwrap();
        assert_eq!(data, QueryData::Scalar(SamplePair(1435781451.781, "42".into())));
    }

    #[test]
    fn test_decode_api_error() {
        let body = br#"{"status": "error", "errorType": "bad_data", "error": "parse error at char 5"}"#;
        let err = decode_response(400, body).unwrap_err();
        assert_eq!(err.to_string(), "bad_data: parse error at char 5");
    }

    #[test]
    fn test_decode_non_json() {
        assert!(matches!(
            decode_response(502, b"<html>Bad Gateway</html>"),
            Err(QueryError::Status(502))
        ));
        assert!(matches!(
            decode_response(200, b"not json"),
            Err(QueryError::Decode(_))
        ));
        assert!(matches!(
            decode_response(200, br#"{"status": "success"}"#),
            Err(QueryError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"status":"success","data":{"resultType":"vector","result":[
                {"metric":{"job":"a"},"value":[1000.5,"2"]},
                {"metric":{"job":"b"},"value":[1000.5,"0.25"]}
            ]}}"#,
        )
        .await;

        let q = PrometheusQuerier::new(&url, Some(Duration::from_secs(5))).unwrap();
        let at = Utc.timestamp_millis_opt(1_000_500).unwrap();
        assert_eq!(q.query(at, "sum(up)").await.unwrap(), 2.25);

        let head = server.await.unwrap();
        assert!(
            head.starts_with("GET /api/v1/query?query=sum%28up%29&time=1000.500 HTTP/1.1\r\n"),
            "unexpected request: {}",
            head
        );
    }

    #[tokio::test]
    async fn test_query_api_error_status() {
        let (url, server) = serve_once(
            "400 Bad Request",
            r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#,
        )
        .await;

        let q = PrometheusQuerier::new(&url, Some(Duration::from_secs(5))).unwrap();
        let err = q.query(Utc::now(), "sum(").await.unwrap_err();
        assert_eq!(err.to_string(), "bad_data: parse error");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let q = PrometheusQuerier::new("http://127.0.0.1:1", Some(Duration::from_secs(2))).unwrap();
        let err = q.query(Utc::now(), "up").await.unwrap_err();
        assert!(matches!(err, QueryError::Transport(_)));
    }
}
