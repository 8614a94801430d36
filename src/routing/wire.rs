use crate::model::{StreamEpoch, Timestamp};

/// One endpoint URL with the stream-epoch rows parsed underneath it.
#[derive(Debug, Clone)]
pub struct RoutingBlock {
    pub url: String,
    pub stream_epochs: Vec<StreamEpoch>,
}

/// Parse a routing-service response body: alternating blocks of a URL line
/// followed by one or more SNCL rows, each block terminated by a blank line
/// (the last block may omit the trailing blank line).
///
/// `default_endtime` is substituted for rows with no end column; callers
/// pass `Some(submitted)` for POST requests and `None` for GET, where an
/// open end stays open.
pub fn parse_routing_table(
    body: &str,
    default_endtime: Option<Timestamp>,
) -> Result<Vec<RoutingBlock>, String> {
    let mut blocks = Vec::new();
    let mut pending_url: Option<String> = None;
    let mut pending_epochs: Vec<StreamEpoch> = Vec::new();

    let flush = |url: &mut Option<String>, epochs: &mut Vec<StreamEpoch>, out: &mut Vec<RoutingBlock>| {
        if let Some(url) = url.take() {
            out.push(RoutingBlock {
                url,
                stream_epochs: std::mem::take(epochs),
            });
        }
    };

    for line in body.lines().map(str::trim_end) {
        if line.is_empty() {
            flush(&mut pending_url, &mut pending_epochs, &mut blocks);
            continue;
        }
        if pending_url.is_none() || looks_like_url(line) {
            flush(&mut pending_url, &mut pending_epochs, &mut blocks);
            pending_url = Some(line.to_string());
        } else {
            let epoch = StreamEpoch::from_sncl_line(line, default_endtime)?;
            pending_epochs.push(epoch);
        }
    }
    flush(&mut pending_url, &mut pending_epochs, &mut blocks);

    Ok(blocks)
}

fn looks_like_url(line: &str) -> bool {
    line.starts_with("http://") || line.starts_with("https://")
}
