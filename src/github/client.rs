//! Upstream API seam and the concrete GitHub REST client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use url::Url;

use super::types::{Actor, Cursor, RawPage, Repository, ResourceKind};
use crate::config::GithubConfig;
use crate::error::{Error, Result};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// What the engine needs from the upstream API. The caching service and
/// the streaming consumer only ever talk to this trait; the reqwest
/// client below is one implementation of it.
#[async_trait]
pub trait GithubApi: Send + Sync + 'static {
  async fn repository(&self, owner: &str, name: &str) -> Result<Repository>;

  /// The authenticated identity behind this client's token.
  async fn viewer(&self) -> Result<Actor>;

  /// Fetch one page of a paginated collection. `cursor = None` means the
  /// start of the collection.
  async fn fetch_page(
    &self,
    kind: ResourceKind,
    repo: &Repository,
    cursor: Option<&Cursor>,
  ) -> Result<RawPage>;
}

/// GitHub REST client.
///
/// Pagination is exposed through opaque cursors: internally they hold the
/// next page number, and `has_more` comes from the `Link: rel="next"`
/// response header.
#[derive(Clone)]
pub struct GithubClient {
  http: reqwest::Client,
  base: Url,
  page_size: u32,
}

impl GithubClient {
  pub fn new(config: &GithubConfig, token: Option<&str>, page_size: u32) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(
      "X-GitHub-Api-Version",
      HeaderValue::from_static(GITHUB_API_VERSION),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static("stargaze"));

    if let Some(token) = token {
      let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Config(format!("invalid API token: {e}")))?;
      auth.set_sensitive(true);
      headers.insert(AUTHORIZATION, auth);
    }

    let http = reqwest::Client::builder().default_headers(headers).build()?;

    let base = Url::parse(&config.api_url)
      .map_err(|e| Error::Config(format!("invalid api_url {}: {e}", config.api_url)))?;

    Ok(Self {
      http,
      base,
      page_size,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
  }

  async fn get_json(&self, url: Url, accept: Option<&'static str>) -> Result<Response> {
    let mut request = self.http.get(url);
    if let Some(accept) = accept {
      request = request.header(ACCEPT, accept);
    }

    check_status(request.send().await?).await
  }
}

/// Map upstream status codes onto the error taxonomy. 401 means missing
/// credentials and short-circuits; 403/429 is the secondary rate limit
/// and qualifies for retry.
async fn check_status(response: Response) -> Result<Response> {
  let status = response.status();
  match status {
    s if s.is_success() => Ok(response),
    StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
    StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited {
      reset_at: header_str(&response, "x-ratelimit-reset"),
    }),
    StatusCode::NOT_FOUND => Err(Error::NotFound(response.url().path().to_string())),
    _ => Err(Error::Api {
      status: status.as_u16(),
      message: response.text().await.unwrap_or_default(),
    }),
  }
}

fn header_str(response: &Response, name: &str) -> Option<String> {
  response
    .headers()
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(String::from)
}

/// Whether a `Link` header advertises a further page.
fn link_has_next(link: Option<&str>) -> bool {
  link
    .map(|l| l.split(',').any(|part| part.contains("rel=\"next\"")))
    .unwrap_or(false)
}

#[async_trait]
impl GithubApi for GithubClient {
  async fn repository(&self, owner: &str, name: &str) -> Result<Repository> {
    let url = self.endpoint(&format!("/repos/{owner}/{name}"))?;
    let value: Value = self.get_json(url, None).await?.json().await?;
    Ok(serde_json::from_value(value)?)
  }

  async fn viewer(&self) -> Result<Actor> {
    let url = self.endpoint("/user")?;
    let value: Value = self.get_json(url, None).await?.json().await?;
    Ok(serde_json::from_value(value)?)
  }

  async fn fetch_page(
    &self,
    kind: ResourceKind,
    repo: &Repository,
    cursor: Option<&Cursor>,
  ) -> Result<RawPage> {
    let page: u32 = match cursor {
      // The cursor is opaque to callers but ours to interpret: a page
      // number minted by a previous call
      Some(c) => serde_json::from_str(c.as_str())?,
      None => 1,
    };

    let (path, accept) = match kind {
      // star+json populates starred_at on each row
      ResourceKind::Stargazers => (
        "stargazers",
        Some("application/vnd.github.star+json"),
      ),
      ResourceKind::Releases => ("releases", None),
      ResourceKind::Watchers => ("subscribers", None),
    };

    let mut url = self.endpoint(&format!(
      "/repos/{}/{}/{}",
      repo.owner_login(),
      repo.name,
      path
    ))?;
    url
      .query_pairs_mut()
      .append_pair("per_page", &self.page_size.to_string())
      .append_pair("page", &page.to_string());

    let response = self.get_json(url, accept).await?;
    let has_more = link_has_next(
      response
        .headers()
        .get("link")
        .and_then(|v| v.to_str().ok()),
    );
    let rows: Vec<Value> = response.json().await?;

    Ok(RawPage {
      rows,
      cursor: has_more.then(|| Cursor::from((page + 1).to_string())),
      has_more,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn link_header_detection() {
    assert!(link_has_next(Some(
      "<https://api.github.com/repos/o/n/stargazers?page=3>; rel=\"next\", \
       <https://api.github.com/repos/o/n/stargazers?page=9>; rel=\"last\""
    )));
    assert!(!link_has_next(Some(
      "<https://api.github.com/repos/o/n/stargazers?page=1>; rel=\"prev\""
    )));
    assert!(!link_has_next(None));
  }

  #[test]
  fn rejects_malformed_cursors() {
    // Page-number cursors parse through serde so a corrupted token
    // surfaces as a decode error, not a panic
    let parsed: std::result::Result<u32, _> = serde_json::from_str("not-a-page");
    assert!(parsed.is_err());
  }

  #[test]
  fn client_builds_without_token() {
    let client = GithubClient::new(&GithubConfig::default(), None, 100).unwrap();
    assert_eq!(client.page_size, 100);
  }
}
