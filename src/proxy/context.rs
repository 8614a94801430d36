use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::net::IpAddr;
use std::time::Instant;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

/// Per-request context that flows through request handling, carrying just
/// enough to label metrics and the access log consistently at every exit
/// point. There's no filter chain or route table here, so unlike the
/// context this is modeled on, nothing accumulates mid-request beyond the
/// FDSN format once the path resolves.
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub format: String,
    pub client_ip: IpAddr,
    pub start: Instant,
}

impl RequestContext {
    pub fn new(method: String, path: String, client_ip: IpAddr) -> Self {
        Self {
            method,
            path,
            format: "unknown".to_string(),
            client_ip,
            start: Instant::now(),
        }
    }

    /// Build a JSON error response and record metrics in one place — the
    /// single exit point for every error path.
    pub fn error_response(&self, status: StatusCode, msg: &str) -> hyper::Response<BoxBody> {
        self.finalize_metrics(status.as_u16(), 0);

        hyper::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(full_body(format!(r#"{{"error":"{}"}}"#, msg)))
            .unwrap()
    }

    /// Record final metrics for a response, successful or not.
    pub fn finalize_metrics(&self, resp_status: u16, response_size: u64) {
        let mut buf = itoa::Buffer::new();
        let status_str = buf.format(resp_status);

        metrics::counter!(
            "gateway_federator_http_requests_total",
            "format" => self.format.clone(),
            "method" => self.method.clone(),
            "status_code" => status_str.to_owned(),
        )
        .increment(1);

        metrics::histogram!(
            "gateway_federator_http_request_duration_seconds",
            "format" => self.format.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());

        if response_size > 0 {
            metrics::histogram!("gateway_federator_response_size_bytes").record(response_size as f64);
        }

        metrics::gauge!(
            "gateway_federator_http_requests_in_flight",
            "format" => self.format.clone(),
        )
        .decrement(1.0);
    }
}
