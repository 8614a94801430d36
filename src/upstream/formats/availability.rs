use bytes::Bytes;

pub use super::station::merge_by_nslc;

pub fn is_non_empty(payload: &Bytes) -> bool {
    !payload.is_empty()
}
