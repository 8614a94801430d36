use bytes::{Bytes, BytesMut};
use std::collections::HashSet;

/// Fixed SEED data-record header: 6-byte sequence number, 1-byte quality
/// indicator, 1 reserved byte, 5-byte station, 2-byte location, 3-byte
/// channel, 2-byte network, then a 10-byte BTIME start time. We read only
/// enough of it to build a record identity for dedup; the sample payload is
/// opaque bytes we never decode.
const FIXED_HEADER_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordIdentity {
    nslc: String,
    start_btime: [u8; 10],
}

fn record_identity(record: &[u8]) -> Option<RecordIdentity> {
    if record.len() < FIXED_HEADER_LEN {
        return None;
    }
    let station = std::str::from_utf8(&record[8..13]).ok()?.trim().to_string();
    let location = std::str::from_utf8(&record[13..15]).ok()?.trim().to_string();
    let channel = std::str::from_utf8(&record[15..18]).ok()?.trim().to_string();
    let network = std::str::from_utf8(&record[18..20]).ok()?.trim().to_string();
    let mut start_btime = [0u8; 10];
    start_btime.copy_from_slice(&record[20..30]);
    Some(RecordIdentity {
        nslc: format!("{network}.{station}.{location}.{channel}"),
        start_btime,
    })
}

/// Append `payload`'s fixed-size records to `out`, skipping any record whose
/// identity (network.station.location.channel + record start) has already
/// been seen. Handles the overlap case from recursive 413 splitting, where
/// two adjacent sub-ranges may both return the record spanning their
/// boundary. Records the decoder can't identify are always kept, since
/// dropping unknown data would silently corrupt the response.
pub fn append_deduped(out: &mut BytesMut, seen: &mut HashSet<RecordIdentitySeen>, payload: &[u8], record_size: usize) {
    if record_size == 0 {
        out.extend_from_slice(payload);
        return;
    }
    for chunk in payload.chunks(record_size) {
        match record_identity(chunk) {
            Some(id) => {
                let key = RecordIdentitySeen(id);
                if seen.insert(key) {
                    out.extend_from_slice(chunk);
                }
            }
            None => out.extend_from_slice(chunk),
        }
    }
}

/// Opaque wrapper so callers don't need to know `RecordIdentity`'s shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordIdentitySeen(RecordIdentity);

pub fn is_non_empty(payload: &Bytes) -> bool {
    !payload.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_record(network: &str, station: &str, location: &str, channel: &str, start: u8, size: usize) -> Vec<u8> {
        let mut rec = vec![0u8; size];
        rec[8..8 + station.len()].copy_from_slice(station.as_bytes());
        rec[13..13 + location.len()].copy_from_slice(location.as_bytes());
        rec[15..15 + channel.len()].copy_from_slice(channel.as_bytes());
        rec[18..18 + network.len()].copy_from_slice(network.as_bytes());
        rec[20] = start;
        rec
    }

    #[test]
    fn dedups_identical_boundary_record() {
        let mut out = BytesMut::new();
        let mut seen = HashSet::new();
        let record_size = 512;
        let r1 = fake_record("CH", "HASLI", "", "LHZ", 1, record_size);
        let r2 = fake_record("CH", "HASLI", "", "LHZ", 1, record_size);
        let r3 = fake_record("CH", "HASLI", "", "LHZ", 2, record_size);

        append_deduped(&mut out, &mut seen, &r1, record_size);
        append_deduped(&mut out, &mut seen, &r2, record_size);
        append_deduped(&mut out, &mut seen, &r3, record_size);

        assert_eq!(out.len(), record_size * 2);
    }

    #[test]
    fn keeps_records_too_short_to_identify() {
        let mut out = BytesMut::new();
        let mut seen = HashSet::new();
        append_deduped(&mut out, &mut seen, &[1, 2, 3], 512);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn zero_record_size_is_pure_concatenation() {
        let mut out = BytesMut::new();
        let mut seen = HashSet::new();
        append_deduped(&mut out, &mut seen, b"abc", 0);
        append_deduped(&mut out, &mut seen, b"def", 0);
        assert_eq!(&out[..], b"abcdef");
    }
}
