use std::collections::BTreeMap;

use crate::error::GatewayError;
use crate::model::{FederatedRequest, Format, HttpMethod, StreamEpoch, Timestamp};

/// Query/body keys that select a stream-epoch rather than passing through
/// to the routing/endpoint services; stripped out of `query_params` and
/// folded into the request's `stream_epochs` instead.
const STRUCTURAL_KEYS: &[&[&str]] = &[
    &["network", "net"],
    &["station", "sta"],
    &["location", "loc"],
    &["channel", "cha"],
    &["starttime", "start"],
    &["endtime", "end"],
    &["nodata"],
];

fn canonical_key(key: &str) -> Option<&'static str> {
    const CANONICAL: &[&str] = &["network", "station", "location", "channel", "starttime", "endtime", "nodata"];
    for (aliases, canonical) in STRUCTURAL_KEYS.iter().zip(CANONICAL) {
        if aliases.iter().any(|a| a.eq_ignore_ascii_case(key)) {
            return Some(canonical);
        }
    }
    None
}

/// Maps an incoming request path to the FDSN service family it targets.
/// `/fdsnws/availability/1/extent` and `/fdsnws/availability/1/query` both
/// resolve to `Format::Availability`; the distinction between "extent" and
/// "query" semantics is a routing-table/endpoint concern this crate doesn't
/// interpret.
pub fn format_for_path(path: &str) -> Option<Format> {
    match path {
        "/fdsnws/dataselect/1/query" => Some(Format::Dataselect),
        "/fdsnws/station/1/query" => Some(Format::Station),
        "/fdsnws/availability/1/query" | "/fdsnws/availability/1/extent" => Some(Format::Availability),
        "/eidaws/wfcatalog/1/query" => Some(Format::WfCatalog),
        _ => None,
    }
}

/// Parses an FDSN `GET .../query` request: a single start/end time window
/// crossed with comma-separated network/station/location/channel code
/// lists, per the FDSNWS spec's GET semantics. Wildcards (`*`, `?`) are
/// passed through uninterpreted — the routing service resolves them.
pub fn parse_get(format: Format, query: &str) -> Result<FederatedRequest, GatewayError> {
    let submitted = Timestamp::now();
    let mut fields: BTreeMap<&'static str, String> = BTreeMap::new();
    let mut query_params = BTreeMap::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match canonical_key(&key) {
            Some(canonical) => {
                fields.insert(canonical, value.into_owned());
            }
            None => {
                query_params.insert(key.into_owned(), value.into_owned());
            }
        }
    }

    let networks = split_codes(fields.get("network").map(String::as_str));
    let stations = split_codes(fields.get("station").map(String::as_str));
    let locations = split_codes(fields.get("location").map(String::as_str));
    let channels = split_codes(fields.get("channel").map(String::as_str));

    let starttime = fields
        .get("starttime")
        .ok_or_else(|| GatewayError::BadRequest("missing required parameter: starttime".to_string()))?;
    let starttime = Timestamp::parse(starttime).map_err(GatewayError::BadRequest)?;
    let endtime = fields
        .get("endtime")
        .map(|s| Timestamp::parse(s).map_err(GatewayError::BadRequest))
        .transpose()?;

    let mut stream_epochs = Vec::with_capacity(networks.len() * stations.len() * locations.len() * channels.len());
    for network in &networks {
        for station in &stations {
            for location in &locations {
                for channel in &channels {
                    stream_epochs.push(StreamEpoch {
                        network: network.clone(),
                        station: station.clone(),
                        location: location.clone(),
                        channel: channel.clone(),
                        starttime,
                        endtime,
                    });
                }
            }
        }
    }

    let nodata = parse_nodata(fields.get("nodata").map(String::as_str))?;

    Ok(FederatedRequest {
        format,
        stream_epochs,
        query_params,
        method: HttpMethod::Get,
        submitted,
        nodata,
    })
}

/// Parses an FDSN `POST .../query` body: optional leading `key=value`
/// parameter lines followed by bulk `NET STA LOC CHA START [END]` rows, one
/// stream-epoch per row.
pub fn parse_post(format: Format, query: &str, body: &str) -> Result<FederatedRequest, GatewayError> {
    let submitted = Timestamp::now();
    let mut query_params = BTreeMap::new();
    let mut nodata_override: Option<String> = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match canonical_key(&key) {
            Some("nodata") => nodata_override = Some(value.into_owned()),
            Some(_) => {}
            None => {
                query_params.insert(key.into_owned(), value.into_owned());
            }
        }
    }

    let mut stream_epochs = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match canonical_key(key.trim()) {
                Some("nodata") => nodata_override = Some(value.trim().to_string()),
                Some(_) => {}
                None => {
                    query_params.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
            continue;
        }
        let stream_epoch = StreamEpoch::from_sncl_line(line, None).map_err(GatewayError::BadRequest)?;
        stream_epochs.push(stream_epoch);
    }

    if stream_epochs.is_empty() {
        return Err(GatewayError::BadRequest("request body carried no stream-epoch rows".to_string()));
    }

    let nodata = parse_nodata(nodata_override.as_deref())?;

    Ok(FederatedRequest {
        format,
        stream_epochs,
        query_params,
        method: HttpMethod::Post,
        submitted,
        nodata,
    })
}

fn split_codes(raw: Option<&str>) -> Vec<String> {
    match raw {
        None => vec!["*".to_string()],
        Some(s) => s.split(',').map(|code| code.trim().to_string()).collect(),
    }
}

fn parse_nodata(raw: Option<&str>) -> Result<u16, GatewayError> {
    match raw {
        None => Ok(204),
        Some(s) => {
            let n: u16 = s.trim().parse().map_err(|_| GatewayError::BadRequest(format!("invalid nodata value: {s:?}")))?;
            FederatedRequest::validate_nodata(n).map_err(GatewayError::BadRequest)
        }
    }
}

/// Parses an `Accept-Encoding` header into "does this client want gzip".
/// A bare `*` (any encoding acceptable) counts as yes; a `gzip;q=0` entry
/// counts as an explicit no, overriding a preceding `*`.
pub fn client_accepts_gzip(accept_encoding: Option<&str>) -> bool {
    let Some(header) = accept_encoding else {
        return false;
    };
    let mut wants_gzip = false;
    for entry in header.split(',') {
        let mut parts = entry.split(';');
        let coding = parts.next().unwrap_or("").trim();
        let rejected = parts.any(|p| {
            let p = p.trim();
            p.eq_ignore_ascii_case("q=0") || p.eq_ignore_ascii_case("q=0.0")
        });
        if coding.eq_ignore_ascii_case("gzip") {
            wants_gzip = !rejected;
        } else if coding == "*" && !rejected {
            wants_gzip = true;
        }
    }
    wants_gzip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_for_path_matches_known_fdsn_routes() {
        assert_eq!(format_for_path("/fdsnws/dataselect/1/query"), Some(Format::Dataselect));
        assert_eq!(format_for_path("/fdsnws/availability/1/extent"), Some(Format::Availability));
        assert_eq!(format_for_path("/eidaws/wfcatalog/1/query"), Some(Format::WfCatalog));
        assert_eq!(format_for_path("/fdsnws/dataselect/1/queryauth"), None);
    }

    #[test]
    fn get_expands_cartesian_product_of_comma_lists() {
        let req = parse_get(
            Format::Dataselect,
            "network=CH,GR&station=HASLI&location=--&channel=LHZ,LHN&starttime=2020-01-01&endtime=2020-01-02",
        )
        .unwrap();
        assert_eq!(req.stream_epochs.len(), 4);
        assert!(req.stream_epochs.iter().any(|se| se.network == "CH" && se.channel == "LHN"));
        assert!(req.stream_epochs.iter().any(|se| se.network == "GR" && se.channel == "LHZ"));
    }

    #[test]
    fn get_defaults_missing_codes_to_wildcard() {
        let req = parse_get(Format::Station, "network=CH&starttime=2020-01-01").unwrap();
        assert_eq!(req.stream_epochs.len(), 1);
        assert_eq!(req.stream_epochs[0].station, "*");
        assert_eq!(req.stream_epochs[0].location, "*");
    }

    #[test]
    fn get_requires_starttime() {
        let err = parse_get(Format::Dataselect, "network=CH&station=HASLI").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn get_keeps_passthrough_params_distinct_from_structural_fields() {
        let req = parse_get(
            Format::Dataselect,
            "net=CH&sta=HASLI&cha=LHZ&start=2020-01-01&quality=M&minimumlength=10",
        )
        .unwrap();
        assert_eq!(req.query_params.get("quality").map(String::as_str), Some("M"));
        assert_eq!(req.query_params.get("minimumlength").map(String::as_str), Some("10"));
        assert!(!req.query_params.contains_key("network"));
    }

    #[test]
    fn post_parses_parameter_lines_and_bulk_rows() {
        let body = "quality=M\nCH HASLI -- LHZ 2020-01-01T00:00:00 2020-01-02T00:00:00\nGR BFO -- BHZ 2020-01-01T00:00:00\n";
        let req = parse_post(Format::Dataselect, "", body).unwrap();
        assert_eq!(req.stream_epochs.len(), 2);
        assert_eq!(req.query_params.get("quality").map(String::as_str), Some("M"));
        assert!(req.stream_epochs[1].endtime.is_none());
    }

    #[test]
    fn post_rejects_empty_bulk_body() {
        let err = parse_post(Format::Dataselect, "", "quality=M\n").unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn post_nodata_override_comes_from_query_not_body() {
        let req = parse_post(Format::Dataselect, "nodata=404", "CH HASLI -- LHZ 2020-01-01T00:00:00\n").unwrap();
        assert_eq!(req.nodata, 404);
    }

    #[test]
    fn accept_encoding_honors_wildcard_and_explicit_rejection() {
        assert!(client_accepts_gzip(Some("gzip")));
        assert!(client_accepts_gzip(Some("deflate, gzip;q=1.0")));
        assert!(!client_accepts_gzip(Some("gzip;q=0")));
        assert!(client_accepts_gzip(Some("*")));
        assert!(!client_accepts_gzip(Some("*;q=0, gzip;q=0")));
        assert!(!client_accepts_gzip(None));
    }
}
