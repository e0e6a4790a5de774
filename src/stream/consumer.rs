//! The driver task behind a subscription: pulls pages, accumulates
//! records and decides when observers get a new snapshot.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::state::{Phase, ResourceState};
use crate::cache::CacheStore;
use crate::github::cached::CachedService;
use crate::github::client::GithubApi;
use crate::github::types::ResourceRecord;

/// Drive one resource stream until it completes, fails, or is cancelled.
///
/// Seeds itself from the current snapshot in `tx`, so a resumed stream
/// continues from the last published cursor instead of the start. The
/// cancellation token is honored before every pull and before every
/// publish: once it fires, no further cache writes or state mutations
/// happen on behalf of this subscription.
pub(crate) async fn drive<T, A, S>(
  service: Arc<CachedService<A, S>>,
  owner: String,
  name: String,
  publish_batches: u32,
  tx: watch::Sender<ResourceState<T>>,
  cancel: CancellationToken,
) where
  T: ResourceRecord,
  A: GithubApi,
  S: CacheStore,
{
  let seed = tx.borrow().clone();
  let mut records = seed.records;
  let cursor = seed.cursor;

  if cancel.is_cancelled() {
    return;
  }
  tx.send_modify(|state| {
    state.loading = true;
    state.error = None;
    state.phase = Phase::Loading;
  });

  let repo = match service.repository(&owner, &name).await {
    Ok(fetched) => fetched.value,
    Err(e) => {
      if !cancel.is_cancelled() {
        publish_failure(&tx, e);
      }
      return;
    }
  };

  // At most `publish_batches` snapshots for a full cached replay; an
  // unknown total degrades to publishing every page
  let expected = repo.expected_total(T::KIND).unwrap_or(0);
  let batch = (expected as usize).div_ceil(publish_batches.max(1) as usize);

  if cancel.is_cancelled() {
    return;
  }
  tx.send_modify(|state| state.phase = Phase::Streaming);

  let mut pages = service.resources::<T>(&repo, cursor);
  let mut iteration: usize = 0;

  loop {
    if cancel.is_cancelled() {
      return;
    }

    let page = match pages.next_page().await {
      None => break,
      Some(Ok(page)) => page,
      Some(Err(e)) => {
        if !cancel.is_cancelled() {
          publish_failure(&tx, e);
        }
        return;
      }
    };

    if cancel.is_cancelled() {
      return;
    }

    records.extend(page.data);

    if should_publish(page.cached, records.len(), batch, iteration, page.has_more) {
      let snapshot = records.clone();
      tx.send_modify(|state| {
        state.records = snapshot;
        state.cursor = page.cursor.clone().or_else(|| state.cursor.take());
        state.has_more = page.has_more;
        state.cached = page.cached;
        state.phase = Phase::Streaming;
      });
      iteration += 1;
    }
  }

  if cancel.is_cancelled() {
    return;
  }
  tx.send_modify(|state| {
    state.loading = false;
    state.phase = Phase::Complete;
  });
}

/// Fresh pages publish immediately for live-data latency; cached replay
/// is throttled to batch-sized increments, except the final page which
/// always lands.
fn should_publish(
  cached: bool,
  buffered: usize,
  batch: usize,
  iteration: usize,
  has_more: bool,
) -> bool {
  !cached || buffered >= batch * iteration || !has_more
}

fn publish_failure<T>(tx: &watch::Sender<ResourceState<T>>, error: crate::error::Error) {
  let suppressed = error.is_unauthorized();
  if suppressed {
    tracing::debug!("stream halted pending authentication");
  } else {
    tracing::warn!(error = %error, "stream halted on upstream failure");
  }

  tx.send_modify(|state| {
    state.loading = false;
    state.phase = Phase::Errored;
    // A 401 blocks progress but is not displayed: it only means the
    // viewer has not signed in yet
    state.error = (!suppressed).then(|| Arc::new(error));
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_page_always_publishes() {
    // iteration 0 makes the threshold zero regardless of batch size
    assert!(should_publish(true, 0, 1000, 0, true));
  }

  #[test]
  fn fresh_pages_always_publish() {
    assert!(should_publish(false, 1, 1000, 3, true));
  }

  #[test]
  fn final_page_always_publishes() {
    assert!(should_publish(true, 1, 1000, 3, false));
  }

  #[test]
  fn cached_replay_is_throttled_to_batch_increments() {
    // 100 expected records in 5 batches: threshold 20 per publish
    let batch = 100usize.div_ceil(5);
    assert!(!should_publish(true, 25, batch, 2, true));
    assert!(should_publish(true, 40, batch, 2, true));
  }
}
