use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use bytes::Bytes;
use tokio::io::AsyncReadExt;

/// Gzip-compress a fully assembled body before it enters the Cache. Unlike
/// the proxy's on-the-fly response compression this runs over bytes already
/// held in memory, so there's no streaming encoder wired into the body path.
pub async fn compress_gzip(body: &Bytes) -> std::io::Result<Bytes> {
    let mut encoder = GzipEncoder::new(body.as_ref());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await?;
    Ok(Bytes::from(out))
}

pub async fn decompress_gzip(body: &Bytes) -> std::io::Result<Bytes> {
    let mut decoder = GzipDecoder::new(body.as_ref());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_gzip() {
        let original = Bytes::from_static(b"the quick brown fox jumps over the lazy dog, repeatedly, for compressibility");
        let compressed = compress_gzip(&original).await.unwrap();
        assert_ne!(compressed, original);
        let restored = decompress_gzip(&compressed).await.unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn empty_body_round_trips() {
        let original = Bytes::new();
        let compressed = compress_gzip(&original).await.unwrap();
        let restored = decompress_gzip(&compressed).await.unwrap();
        assert_eq!(restored, original);
    }
}
