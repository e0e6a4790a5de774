//! Cache value codec: JSON envelope with a write timestamp, gzipped.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// The persisted envelope. The timestamp travels with the payload so that
/// staleness checks survive a process restart.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
  cached_at: DateTime<Utc>,
  payload: T,
}

/// Serialize and compress a payload, stamping it with the current time.
pub fn encode<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
  encode_at(payload, Utc::now())
}

pub(crate) fn encode_at<T: Serialize>(payload: &T, cached_at: DateTime<Utc>) -> Result<Vec<u8>> {
  let json = serde_json::to_vec(&CacheEntry { cached_at, payload })?;

  let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
  encoder.write_all(&json)?;
  Ok(encoder.finish()?)
}

/// Decompress and parse a cached value.
///
/// Fails soft: malformed bytes, a payload that no longer decodes as `T`,
/// or an entry older than `ttl` all come back as `None`. Every such miss
/// is recovered by fetching fresh from upstream, so nothing here is worth
/// surfacing to the caller.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], ttl: Duration) -> Option<T> {
  let mut json = Vec::new();
  if let Err(e) = GzDecoder::new(bytes).read_to_end(&mut json) {
    tracing::debug!("discarding cache entry with undecodable compression: {e}");
    return None;
  }

  let entry: CacheEntry<T> = match serde_json::from_slice(&json) {
    Ok(entry) => entry,
    Err(e) => {
      tracing::debug!("discarding malformed cache entry: {e}");
      return None;
    }
  };

  let age = Utc::now().signed_duration_since(entry.cached_at);
  let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
  if age > ttl {
    tracing::debug!("discarding stale cache entry (age {age})");
    return None;
  }

  Some(entry.payload)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

  #[test]
  fn round_trips_arbitrary_payloads() {
    let payloads = vec![
      json!(null),
      json!(42),
      json!("a string with unicode: \u{1F31F}"),
      json!({"nested": {"list": [1, 2, 3], "flag": true}}),
      json!((0..500).map(|i| json!({"id": i})).collect::<Vec<_>>()),
    ];

    for payload in payloads {
      let bytes = encode(&payload).unwrap();
      let decoded: serde_json::Value = decode(&bytes, WEEK).unwrap();
      assert_eq!(decoded, payload);
    }
  }

  #[test]
  fn compresses_repetitive_payloads() {
    let payload: Vec<String> = vec!["the same string again".to_string(); 1000];
    let bytes = encode(&payload).unwrap();
    assert!(bytes.len() < serde_json::to_vec(&payload).unwrap().len() / 10);
  }

  #[test]
  fn stale_entries_decode_to_none() {
    let written = Utc::now() - chrono::Duration::days(8);
    let bytes = encode_at(&json!({"old": true}), written).unwrap();
    assert_eq!(decode::<serde_json::Value>(&bytes, WEEK), None);

    // The same entry is still fresh under a longer TTL
    let month = Duration::from_secs(30 * 24 * 3600);
    assert!(decode::<serde_json::Value>(&bytes, month).is_some());
  }

  #[test]
  fn garbage_decodes_to_none() {
    assert_eq!(decode::<serde_json::Value>(b"not gzip at all", WEEK), None);

    // Valid gzip, but not an envelope
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"[1, 2, 3]").unwrap();
    let bytes = encoder.finish().unwrap();
    assert_eq!(decode::<serde_json::Value>(&bytes, WEEK), None);
  }

  #[test]
  fn type_mismatch_decodes_to_none() {
    let bytes = encode(&json!({"not": "a number"})).unwrap();
    assert_eq!(decode::<u64>(&bytes, WEEK), None);
  }
}
