use super::stream_epoch::{StreamEpoch, Timestamp};
use std::collections::BTreeMap;

/// Which FDSN service family this request targets. Determines the
/// `EndpointWorker` capability set (decode/encode/can_split) used by the
/// Processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Dataselect,
    Station,
    Availability,
    WfCatalog,
}

impl Format {
    /// `true` for formats whose endpoint worker handles 413 by recursive
    /// time-window splitting. Station's 413 responses are surfaced as a
    /// generic upstream error rather than split.
    pub fn can_split(&self) -> bool {
        matches!(self, Format::Dataselect | Format::WfCatalog)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Dataselect => "application/vnd.fdsn.mseed",
            Format::Station => "application/xml",
            Format::Availability => "application/xml",
            Format::WfCatalog => "application/json",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Format::Dataselect => "dataselect",
            Format::Station => "station",
            Format::Availability => "availability",
            Format::WfCatalog => "wfcatalog",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A validated, adapter-produced client request — the Processor's sole input.
#[derive(Debug, Clone)]
pub struct FederatedRequest {
    pub format: Format,
    pub stream_epochs: Vec<StreamEpoch>,
    /// Query parameters as received, excluding routing-reserved keys handled
    /// separately by the RouteResolver/adapter (e.g. `nodata`).
    pub query_params: BTreeMap<String, String>,
    pub method: HttpMethod,
    /// Captured once, at adapter entry — substituted for POST routing-table
    /// rows with an absent endtime.
    pub submitted: Timestamp,
    /// 204 or 404, the status returned when routing/federation yields no data.
    pub nodata: u16,
}

impl FederatedRequest {
    pub fn validate_nodata(nodata: u16) -> Result<u16, String> {
        match nodata {
            204 | 404 => Ok(nodata),
            other => Err(format!("nodata must be 204 or 404, got {other}")),
        }
    }
}
