//! GitHub API payload types and the resource-record seam.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A paginated collection kind associated with a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
  Stargazers,
  Releases,
  Watchers,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::Stargazers => "stargazers",
      ResourceKind::Releases => "releases",
      ResourceKind::Watchers => "watchers",
    }
  }
}

impl std::fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Opaque continuation token identifying the next page boundary.
///
/// Only the upstream client interprets its contents; everything else
/// passes it through and persists it alongside cached pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for Cursor {
  fn from(token: String) -> Self {
    Cursor(token)
  }
}

impl From<&str> for Cursor {
  fn from(token: &str) -> Self {
    Cursor(token.to_string())
  }
}

/// GitHub user with the demographic fields the dashboard charts. Listing
/// endpoints return only the basic profile; the optional fields fill in
/// when the full profile is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
  #[serde(rename = "node_id", default)]
  pub id: Option<String>,
  pub login: String,
  #[serde(default)]
  pub avatar_url: Option<String>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub company: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, alias = "followers")]
  pub followers_count: Option<u64>,
  #[serde(default, alias = "following")]
  pub following_count: Option<u64>,
}

/// Repository metadata, including the collection totals used to size the
/// streaming publish threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
  #[serde(rename = "node_id")]
  pub id: String,
  pub name: String,
  #[serde(rename = "full_name")]
  pub name_with_owner: String,
  pub owner: Actor,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub language: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub stargazers_count: u64,
  /// Users watching (subscribed to) the repository.
  #[serde(default)]
  pub subscribers_count: u64,
  #[serde(default)]
  pub forks_count: u64,
  /// Not part of the REST repository payload; populated when known.
  #[serde(default)]
  pub releases_count: Option<u64>,
}

impl Repository {
  pub fn owner_login(&self) -> &str {
    &self.owner.login
  }

  /// Expected size of a collection, when the metadata carries it. Unknown
  /// totals make the streaming consumer publish every page instead of
  /// batching.
  pub fn expected_total(&self, kind: ResourceKind) -> Option<u64> {
    match kind {
      ResourceKind::Stargazers => Some(self.stargazers_count),
      ResourceKind::Watchers => Some(self.subscribers_count),
      ResourceKind::Releases => self.releases_count,
    }
  }
}

/// One stargazer, with the time the star was given (requires the
/// star+json media type upstream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stargazer {
  pub starred_at: DateTime<Utc>,
  pub user: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
  pub id: u64,
  pub tag_name: String,
  #[serde(default)]
  pub name: Option<String>,
  pub draft: bool,
  pub prerelease: bool,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub published_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub author: Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
  pub user: Actor,
}

/// A raw upstream page: undecoded rows plus pagination metadata.
#[derive(Debug, Clone)]
pub struct RawPage {
  pub rows: Vec<Value>,
  pub cursor: Option<Cursor>,
  pub has_more: bool,
}

/// A typed page as yielded by the resource iterator, tagged with whether
/// it was replayed from the local cache.
#[derive(Debug, Clone)]
pub struct ResourcePage<T> {
  pub data: Vec<T>,
  pub cursor: Option<Cursor>,
  pub has_more: bool,
  pub cached: bool,
}

/// The persisted form of a page: same contents, minus the origin tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPage<T> {
  pub data: Vec<T>,
  pub cursor: Option<Cursor>,
  pub has_more: bool,
}

/// A record type belonging to one paginated collection.
///
/// `decode_row` turns one raw upstream row into the typed record; cached
/// pages skip it and go through plain serde instead, so a schema change
/// invalidates old pages as misses rather than failures.
pub trait ResourceRecord:
  Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
  const KIND: ResourceKind;

  fn decode_row(row: Value) -> serde_json::Result<Self> {
    serde_json::from_value(row)
  }
}

impl ResourceRecord for Stargazer {
  const KIND: ResourceKind = ResourceKind::Stargazers;
}

impl ResourceRecord for Release {
  const KIND: ResourceKind = ResourceKind::Releases;
}

impl ResourceRecord for Watcher {
  const KIND: ResourceKind = ResourceKind::Watchers;

  // The subscribers endpoint returns bare user objects
  fn decode_row(row: Value) -> serde_json::Result<Self> {
    Ok(Watcher {
      user: serde_json::from_value(row)?,
    })
  }
}
