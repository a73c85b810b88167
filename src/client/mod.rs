//! Client for the metrics server's HTTP query API.
//!
//! Supports instant queries, range queries, and listing series names.

mod format;
mod value;

pub use format::*;
pub use value::*;

use serde::de::DeserializeOwned;
use std::num::ParseFloatError;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Query error types.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid sample value {value:?}: {source}")]
    Parse {
        value: String,
        #[source]
        source: ParseFloatError,
    },
}

/// Parameters of a range query. `end` is a Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeParams {
    pub end: f64,
    pub range_seconds: u64,
    pub step_seconds: u64,
}

impl RangeParams {
    /// Build range parameters. Without an explicit step, one of
    /// `range / 250` is used; the step is never below one second.
    pub fn new(end: f64, range_seconds: u64, step_seconds: Option<u64>) -> Self {
        let step = step_seconds.unwrap_or(range_seconds / 250);
        Self {
            end,
            range_seconds,
            step_seconds: step.max(1),
        }
    }

    pub fn start(&self) -> f64 {
        self.end - self.range_seconds as f64
    }
}

/// Client bound to one server with one timeout for every call.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl Client {
    pub fn new(server: &str, timeout: Duration) -> Result<Self, QueryError> {
        let base = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Evaluate `expr` at the current time.
    pub async fn query(&self, expr: &str) -> Result<QueryOutcome, QueryError> {
        let data: WireData = self.get("/api/v1/query", &[("query", expr.to_string())]).await?;
        Ok(ResultValue::try_from(data)?.into())
    }

    /// Evaluate `expr` over `[end - range, end]`. Always yields a matrix.
    pub async fn query_range(
        &self,
        expr: &str,
        params: RangeParams,
    ) -> Result<QueryOutcome, QueryError> {
        let step = params.step_seconds.max(1);
        let query = [
            ("query", expr.to_string()),
            ("start", params.start().to_string()),
            ("end", params.end.to_string()),
            ("step", step.to_string()),
        ];
        let data: WireData = self.get("/api/v1/query_range", &query).await?;

        if !matches!(data, WireData::Matrix(_)) {
            return Err(QueryError::Protocol(format!(
                "range query returned {} result, expected matrix",
                wire_type_name(&data)
            )));
        }
        Ok(ResultValue::try_from(data)?.into())
    }

    /// List the names of all known series.
    pub async fn metrics(&self) -> Result<Vec<String>, QueryError> {
        self.get("/api/v1/label/__name__/values", &[]).await
    }

    /// Issue a GET and unwrap the response envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        tracing::debug!(
            "GET {} -> {} in {}ms",
            url,
            status,
            start.elapsed().as_millis()
        );

        decode_envelope(status, &body)
    }

    fn transport_error(&self, e: reqwest::Error) -> QueryError {
        if e.is_timeout() {
            QueryError::Timeout(self.timeout)
        } else {
            QueryError::Transport(e.to_string())
        }
    }
}

/// Decode a response body into the envelope's `data` payload.
fn decode_envelope<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<T, QueryError> {
    let envelope: Envelope<serde_json::Value> = match serde_json::from_slice(body) {
        Ok(env) => env,
        Err(e) if status.is_success() => {
            return Err(QueryError::Protocol(format!("malformed response: {}", e)));
        }
        Err(_) => {
            return Err(QueryError::Protocol(format!("unexpected HTTP status {}", status)));
        }
    };

    for warning in &envelope.warnings {
        tracing::warn!("Server warning: {}", warning);
    }

    if envelope.status != "success" || !status.is_success() {
        return Err(QueryError::Protocol(format!(
            "server reported {} with HTTP {} ({}): {}",
            envelope.status,
            status,
            envelope.error_type.as_deref().unwrap_or("unknown"),
            envelope.error.as_deref().unwrap_or("no error message")
        )));
    }

    let data = envelope
        .data
        .ok_or_else(|| QueryError::Protocol("response has no data".to_string()))?;

    serde_json::from_value(data)
        .map_err(|e| QueryError::Protocol(format!("undecodable result: {}", e)))
}

fn wire_type_name(data: &WireData) -> &'static str {
    match data {
        WireData::Scalar(_) => "scalar",
        WireData::Vector(_) => "vector",
        WireData::Matrix(_) => "matrix",
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use axum::http::StatusCode;
    use tokio_test::assert_err;

    async fn client_for(server: &FakeServer) -> Client {
        let addr = server.start().await;
        Client::new(&addr.to_string(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_range_params_step() {
        assert_eq!(RangeParams::new(0.0, 3600, None).step_seconds, 14);
        assert_eq!(RangeParams::new(0.0, 100, None).step_seconds, 1);
        assert_eq!(RangeParams::new(0.0, 100, Some(0)).step_seconds, 1);
        assert_eq!(RangeParams::new(0.0, 100, Some(30)).step_seconds, 30);
        assert_eq!(RangeParams::new(1000.0, 100, None).start(), 900.0);
    }

    #[test]
    fn test_base_url_normalized() {
        let c = Client::new("prom.local:9090/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.base_url(), "http://prom.local:9090");
        let c = Client::new("https://prom.local", Duration::from_secs(1)).unwrap();
        assert_eq!(c.base_url(), "https://prom.local");
    }

    #[tokio::test]
    async fn test_query_scalar() {
        let server = FakeServer::new().respond("up", scalar_body("980"));
        let client = client_for(&server).await;

        let outcome = client.query("up").await.unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Value(ResultValue::Scalar {
                timestamp: 1700000000.0,
                value: 980.0
            })
        );
    }

    #[tokio::test]
    async fn test_query_empty_vector() {
        let server = FakeServer::new();
        let client = client_for(&server).await;

        let outcome = client.query("absent_metric").await.unwrap();
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_query_unknown_result_type() {
        let server = FakeServer::new().respond(
            "up",
            r#"{"status":"success","data":{"resultType":"histogram","result":[]}}"#,
        );
        let client = client_for(&server).await;

        let err = assert_err!(client.query("up").await);
        assert!(matches!(err, QueryError::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_query_server_error_status() {
        let server = FakeServer::new().respond_with(
            "sum(",
            StatusCode::BAD_REQUEST,
            r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#,
        );
        let client = client_for(&server).await;

        let err = client.query("sum(").await.unwrap_err();
        match err {
            QueryError::Protocol(msg) => {
                assert!(msg.contains("bad_data"));
                assert!(msg.contains("parse error"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_error_status_with_success_envelope() {
        let server = FakeServer::new().respond_with(
            "up",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"status":"success","errorType":"internal","error":"storage unavailable","data":{"resultType":"scalar","result":[1,"1"]}}"#,
        );
        let client = client_for(&server).await;

        let err = assert_err!(client.query("up").await);
        match err {
            QueryError::Protocol(msg) => {
                assert!(msg.contains("500"), "got {}", msg);
                assert!(msg.contains("internal"));
                assert!(msg.contains("storage unavailable"));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_non_json_error_page() {
        let server = FakeServer::new().respond_with(
            "up",
            StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>",
        );
        let client = client_for(&server).await;

        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Protocol(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn test_query_garbled_value() {
        let server = FakeServer::new().respond("up", scalar_body("not-a-number"));
        let client = client_for(&server).await;

        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_query_range_sends_clamped_step() {
        let server = FakeServer::new().respond(
            "rate(x[5m])",
            r#"{"status":"success","data":{"resultType":"matrix","result":[
                {"metric":{"job":"a"},"values":[[1000,"1"],[1001,"2"]]}
            ]}}"#,
        );
        let client = client_for(&server).await;

        let params = RangeParams {
            end: 1001.0,
            range_seconds: 1,
            step_seconds: 0,
        };
        let outcome = client.query_range("rate(x[5m])", params).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Value(ResultValue::Matrix(ref s)) if s[0].points.len() == 2));

        let requests = server.requests();
        assert_eq!(requests[0]["step"], "1");
        assert_eq!(requests[0]["start"], "1000");
        assert_eq!(requests[0]["end"], "1001");
    }

    #[tokio::test]
    async fn test_query_range_rejects_non_matrix() {
        let server = FakeServer::new().respond("x", scalar_body("1"));
        let client = client_for(&server).await;

        let err = client
            .query_range("x", RangeParams::new(100.0, 60, None))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_metrics() {
        let server = FakeServer::new().respond(
            "__name__",
            r#"{"status":"success","data":["http_requests_total","up"]}"#,
        );
        let client = client_for(&server).await;

        let names = client.metrics().await.unwrap();
        assert_eq!(names, vec!["http_requests_total", "up"]);
    }

    #[tokio::test]
    async fn test_metrics_error_kinds() {
        let server = FakeServer::new().respond_with(
            "__name__",
            StatusCode::BAD_REQUEST,
            r#"{"status":"error","errorType":"bad_data","error":"invalid parameter"}"#,
        );
        let client = client_for(&server).await;
        let err = assert_err!(client.metrics().await);
        assert!(matches!(err, QueryError::Protocol(ref m) if m.contains("bad_data")), "got {:?}", err);

        let server = FakeServer::new().respond("__name__", r#"{"status":"success","data":{"x":1}}"#);
        let client = client_for(&server).await;
        let err = assert_err!(client.metrics().await);
        assert!(matches!(err, QueryError::Protocol(ref m) if m.contains("undecodable")), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = FakeServer::new().with_delay(Duration::from_millis(500));
        let addr = server.start().await;
        let client = Client::new(&addr.to_string(), Duration::from_millis(50)).unwrap();

        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(&addr.to_string(), Duration::from_secs(1)).unwrap();
        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Transport(_)), "got {:?}", err);
    }
}
