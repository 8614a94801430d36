use bytes::Bytes;

/// Station responses are merged by concatenating the per-stream bodies in
/// stream-identifier order; the payload's own schema (StationXML or the
/// FDSN text variant) is not interpreted here.
pub fn merge_by_nslc(mut bodies: Vec<(String, Bytes)>) -> Bytes {
    bodies.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out = Vec::new();
    for (_, body) in bodies {
        out.extend_from_slice(&body);
    }
    Bytes::from(out)
}

pub fn is_non_empty(payload: &Bytes) -> bool {
    !payload.is_empty()
}
