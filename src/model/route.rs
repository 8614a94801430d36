use super::stream_epoch::StreamEpoch;
use std::sync::Arc;

/// A binding of one endpoint URL to exactly one stream-epoch, produced by
/// demultiplexing the routing service's answer.
#[derive(Debug, Clone)]
pub struct Route {
    pub url: Arc<str>,
    pub stream_epoch: StreamEpoch,
}

/// The deterministic dispatch order assigned to a route group so the Drain
/// can reassemble concurrent fragments without ever reordering them.
pub type Priority = u32;
