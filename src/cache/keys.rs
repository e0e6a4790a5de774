//! Cache namespaces and key construction.
//!
//! A key uniquely identifies a (resource kind, repository, cursor page)
//! tuple: the repository lives in the store's namespace, the kind in the
//! key prefix, and the page in a hash of its cursor.

use sha2::{Digest, Sha256};

use crate::github::types::{Cursor, ResourceKind};

pub const REPOSITORY_PREFIX: &str = "repository:";

/// Namespace for a repository's store, usable as a file name: case-folded
/// `owner` and `name` joined with `__`, path-hostile characters replaced.
pub fn namespace(owner: &str, name: &str) -> String {
  format!("{}__{}", sanitize(owner), sanitize(name))
}

fn sanitize(part: &str) -> String {
  part
    .to_lowercase()
    .chars()
    .map(|c| match c {
      'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
      _ => '_',
    })
    .collect()
}

/// Key for the repository metadata singleton.
pub fn repository_key(owner: &str, name: &str) -> String {
  format!("{}{}/{}", REPOSITORY_PREFIX, owner.to_lowercase(), name.to_lowercase())
}

/// Whether a key holds repository metadata (which expires on a shorter
/// TTL than paginated collections).
pub fn is_repository_key(key: &str) -> bool {
  key.starts_with(REPOSITORY_PREFIX)
}

/// Key for one page of a paginated collection. Cursors are opaque and can
/// be arbitrarily long, so they are hashed for stable fixed-length keys.
pub fn page_key(kind: ResourceKind, cursor: Option<&Cursor>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(cursor.map(Cursor::as_str).unwrap_or("origin").as_bytes());
  format!("{}:{}", kind.as_str(), hex::encode(hasher.finalize()))
}
