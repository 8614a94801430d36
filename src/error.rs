use std::fmt;

/// Error taxonomy surfaced to adapters.
#[derive(Debug)]
pub enum GatewayError {
    /// Parameter validation failure. Mapped to 400 by the adapter.
    BadRequest(String),
    /// Routing returned nothing, or every route was filtered/empty.
    /// Mapped to the request's configured `nodata` status (204 or 404).
    NoData,
    /// Declared duration limits exceeded, a 413 from an endpoint with no
    /// viable split, or a streaming timeout before the first byte. Mapped to 413.
    RequestTooLarge(String),
    /// Routing service 5xx/timeout, or an unexpected decode failure. Mapped to 500.
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self, nodata: u16) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::NoData => nodata,
            GatewayError::RequestTooLarge(_) => 413,
            GatewayError::Internal(_) => 500,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            GatewayError::NoData => write!(f, "no data"),
            GatewayError::RequestTooLarge(msg) => write!(f, "request too large: {msg}"),
            GatewayError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}
