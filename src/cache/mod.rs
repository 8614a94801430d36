pub mod buffer;
pub mod compress;

use crate::model::StreamEpoch;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use buffer::SpoolBuffer;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    /// `Content-Encoding` the body is already stored under, if compressed.
    pub encoding: Option<String>,
    inserted_at: Instant,
}

/// Process-wide key→bytes store. Concurrent readers, at-most-once writers
/// per key: a concurrent miss on the same key may cause duplicate upstream
/// work, and the later `set` simply overwrites, which is fine because the
/// body is a pure function of the key.
pub struct Cache {
    ttl: Duration,
    compress: bool,
    entries: DashMap<String, Arc<CacheEntry>>,
}

impl Cache {
    pub fn new(ttl: Duration, compress: bool) -> Self {
        Self {
            ttl,
            compress,
            entries: DashMap::new(),
        }
    }

    /// Stable key for (processor type tag, query params, stream-epochs).
    /// Query params are hashed in canonical (sorted) order regardless of
    /// the map's own iteration order so semantically identical requests
    /// always collide on the same key.
    pub fn key(tag: &str, query_params: &BTreeMap<String, String>, epochs: &[StreamEpoch]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update([0u8]);
        for (k, v) in query_params {
            hasher.update(k.as_bytes());
            hasher.update([b'=']);
            hasher.update(v.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xff]);
        for se in epochs {
            hasher.update(se.nslc().as_bytes());
            hasher.update([b'|']);
            hasher.update(se.starttime.to_string().as_bytes());
            hasher.update([b'-']);
            if let Some(et) = se.endtime {
                hasher.update(et.to_string().as_bytes());
            }
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        hex_encode(&digest)
    }

    /// Returns `(body, encoding)` on a live hit. Expired entries are treated
    /// as a miss and swept lazily.
    pub fn get(&self, key: &str) -> Option<(Bytes, Option<String>)> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some((entry.body.clone(), entry.encoding.clone()))
    }

    pub fn set(&self, key: String, body: Bytes, encoding: Option<String>) {
        self.entries.insert(
            key,
            Arc::new(CacheEntry {
                body,
                encoding,
                inserted_at: Instant::now(),
            }),
        );
    }

    pub fn compress_on_store(&self) -> bool {
        self.compress
    }

    /// Store a finalized response body, gzip-compressing it first when the
    /// backend is configured to keep compressed entries.
    pub async fn store(&self, key: String, body: Bytes) {
        if self.compress {
            match compress::compress_gzip(&body).await {
                Ok(compressed) => self.set(key, compressed, Some("gzip".to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to gzip cache entry, storing uncompressed");
                    self.set(key, body, None);
                }
            }
        } else {
            self.set(key, body, None);
        }
    }

    /// Read a cache hit for a client, decompressing if the entry is gzipped
    /// but the client didn't send `Accept-Encoding: gzip`. A hit that must be
    /// decompressed still counts as a hit; only the wire representation
    /// changes.
    pub async fn get_for_client(&self, key: &str, client_accepts_gzip: bool) -> Option<(Bytes, Option<String>)> {
        let Some((body, encoding)) = self.get(key) else {
            metrics::counter!("gateway_federator_cache_misses_total").increment(1);
            return None;
        };
        metrics::counter!("gateway_federator_cache_hits_total").increment(1);
        if encoding.as_deref() == Some("gzip") && !client_accepts_gzip {
            match compress::decompress_gzip(&body).await {
                Ok(plain) => Some((plain, None)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decompress cache entry, treating as miss");
                    None
                }
            }
        } else {
            Some((body, encoding))
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn epoch() -> StreamEpoch {
        StreamEpoch {
            network: "CH".into(),
            station: "HASLI".into(),
            location: String::new(),
            channel: "LHZ".into(),
            starttime: Timestamp::from_unix_secs(0),
            endtime: Some(Timestamp::from_unix_secs(1000)),
        }
    }

    #[test]
    fn key_is_stable_across_param_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("format".to_string(), "mseed".to_string());
        a.insert("nodata".to_string(), "204".to_string());

        let mut b = BTreeMap::new();
        b.insert("nodata".to_string(), "204".to_string());
        b.insert("format".to_string(), "mseed".to_string());

        let epochs = vec![epoch()];
        assert_eq!(Cache::key("dataselect", &a, &epochs), Cache::key("dataselect", &b, &epochs));
    }

    #[test]
    fn key_differs_by_tag() {
        let params = BTreeMap::new();
        let epochs = vec![epoch()];
        assert_ne!(
            Cache::key("dataselect", &params, &epochs),
            Cache::key("station", &params, &epochs)
        );
    }

    #[test]
    fn miss_then_hit_after_set() {
        let cache = Cache::new(Duration::from_secs(60), false);
        let key = "k1".to_string();
        assert!(cache.get(&key).is_none());
        cache.set(key.clone(), Bytes::from_static(b"payload"), None);
        let (body, encoding) = cache.get(&key).unwrap();
        assert_eq!(body, Bytes::from_static(b"payload"));
        assert_eq!(encoding, None);
    }

    #[test]
    fn expired_entry_reads_as_miss() {
        let cache = Cache::new(Duration::from_millis(1), false);
        cache.set("k1".to_string(), Bytes::from_static(b"x"), None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
    }

    #[tokio::test]
    async fn store_compresses_when_enabled_and_get_for_client_honors_accept_encoding() {
        let cache = Cache::new(Duration::from_secs(60), true);
        let body = Bytes::from_static(b"repeated repeated repeated repeated payload payload");
        cache.store("k1".to_string(), body.clone()).await;

        let (raw, encoding) = cache.get("k1").unwrap();
        assert_eq!(encoding.as_deref(), Some("gzip"));
        assert_ne!(raw, body);

        let (for_gzip_client, encoding) = cache.get_for_client("k1", true).await.unwrap();
        assert_eq!(encoding.as_deref(), Some("gzip"));
        assert_eq!(for_gzip_client, raw);

        let (for_plain_client, encoding) = cache.get_for_client("k1", false).await.unwrap();
        assert_eq!(encoding, None);
        assert_eq!(for_plain_client, body);
    }

    #[tokio::test]
    async fn store_without_compression_keeps_body_untouched() {
        let cache = Cache::new(Duration::from_secs(60), false);
        let body = Bytes::from_static(b"payload");
        cache.store("k1".to_string(), body.clone()).await;
        let (stored, encoding) = cache.get("k1").unwrap();
        assert_eq!(stored, body);
        assert_eq!(encoding, None);
    }
}
