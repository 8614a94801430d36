use bytes::Bytes;
use serde_json::Value;

/// wfcatalog responses are a JSON array of catalog entries. Merging across
/// sub-responses (from a 413 split or a multi-route group) is a structural
/// list concatenation, not an interpretation of entry contents.
pub fn merge_arrays(bodies: &[Bytes]) -> Result<Bytes, String> {
    let mut merged = Vec::new();
    for body in bodies {
        if body.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_slice(body).map_err(|e| format!("invalid wfcatalog JSON: {e}"))?;
        match value {
            Value::Array(items) => merged.extend(items),
            other => merged.push(other),
        }
    }
    if merged.is_empty() {
        return Ok(Bytes::new());
    }
    serde_json::to_vec(&Value::Array(merged))
        .map(Bytes::from)
        .map_err(|e| format!("failed to re-serialize merged wfcatalog entries: {e}"))
}

pub fn is_non_empty(payload: &Bytes) -> bool {
    !payload.is_empty() && payload.as_ref() != b"[]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_array_entries_across_bodies() {
        let a = Bytes::from_static(br#"[{"id":1}]"#);
        let b = Bytes::from_static(br#"[{"id":2},{"id":3}]"#);
        let merged = merge_arrays(&[a, b]).unwrap();
        let parsed: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
    }

    #[test]
    fn skips_empty_bodies() {
        let merged = merge_arrays(&[Bytes::new(), Bytes::from_static(br#"[{"id":1}]"#)]).unwrap();
        let parsed: Value = serde_json::from_slice(&merged).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn all_empty_yields_empty_bytes() {
        let merged = merge_arrays(&[Bytes::new(), Bytes::new()]).unwrap();
        assert!(merged.is_empty());
    }
}
