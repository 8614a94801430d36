use crate::adapter;
use crate::error::GatewayError;
use crate::proxy::context::{full_body, BoxBody, RequestContext};
use crate::server::GatewayState;
use bytes::{Bytes, BytesMut};
use http::header::ACCEPT_ENCODING;
use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::warn;

/// Handle an incoming HTTP request: resolve the FDSN service path, parse
/// the request into a `FederatedRequest`, drive it through the `Processor`,
/// and map the outcome (or error) back onto an HTTP response.
///
/// There's no route table or filter chain here — auth/CORS/host matching
/// live outside this crate's scope; the only "routing" this phase performs
/// is matching the fixed set of FDSN service paths.
pub async fn handle_request(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let client_ip = peer_addr.ip();

    let Some(format) = adapter::format_for_path(&path) else {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("content-type", "application/json")
            .body(full_body(r#"{"error":"unknown service path"}"#))
            .unwrap());
    };

    let mut ctx = RequestContext::new(method.clone(), path, client_ip);
    ctx.format = format.tag().to_string();
    metrics::gauge!("gateway_federator_http_requests_in_flight", "format" => ctx.format.clone()).increment(1.0);

    let query = req.uri().query().unwrap_or("").to_string();
    let accept_encoding = req
        .headers()
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let parsed = match method.as_str() {
        "GET" => adapter::parse_get(format, &query),
        "POST" => match req.into_body().collect().await {
            Ok(collected) => {
                let body = collected.to_bytes();
                adapter::parse_post(format, &query, &String::from_utf8_lossy(&body))
            }
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                Err(GatewayError::BadRequest("failed to read request body".to_string()))
            }
        },
        other => Err(GatewayError::BadRequest(format!("unsupported method {other}"))),
    };

    let request = match parsed {
        Ok(r) => r,
        Err(e) => return Ok(ctx.error_response(status_for(&e, 204), &e.to_string())),
    };
    let nodata = request.nodata;
    let client_accepts_gzip = adapter::client_accepts_gzip(accept_encoding.as_deref());

    // `Processor::process` only returns once every fragment has been handed
    // to `tx` — draining `rx` on a background task lets the pipeline make
    // progress concurrently instead of deadlocking once its buffer fills.
    let (tx, mut rx) = mpsc::channel::<Bytes>(16);
    let reader = tokio::spawn(async move {
        let mut buf = BytesMut::new();
        while let Some(chunk) = rx.recv().await {
            buf.extend_from_slice(&chunk);
        }
        buf.freeze()
    });

    let outcome = state.processor.process(request, client_accepts_gzip, tx).await;
    let body = reader.await.unwrap_or_default();

    let response = match outcome {
        Ok(result) => {
            ctx.finalize_metrics(200, body.len() as u64);
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("content-type", result.content_type);
            if let Some(encoding) = result.content_encoding {
                builder = builder.header("content-encoding", encoding);
            }
            builder.body(full_body(body)).unwrap()
        }
        Err(e) => ctx.error_response(status_for(&e, nodata), &e.to_string()),
    };

    Ok(response)
}

fn status_for(err: &GatewayError, nodata: u16) -> StatusCode {
    StatusCode::from_u16(err.status_code(nodata)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
