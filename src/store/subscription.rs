use futures_util::Stream;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{CacheKey, StoreInner};
use crate::snapshot::LeagueSnapshot;

/// Live feed of [`LeagueSnapshot`]s for one league.
///
/// Dropping the subscription unsubscribes it. The stream ends when the store
/// clears its caches or is dropped.
pub struct LeagueSubscription {
    id: u64,
    key: CacheKey,
    rx: mpsc::UnboundedReceiver<LeagueSnapshot>,
    store: Weak<StoreInner>,
}

impl LeagueSubscription {
    pub(crate) fn new(
        id: u64,
        key: CacheKey,
        rx: mpsc::UnboundedReceiver<LeagueSnapshot>,
        store: Weak<StoreInner>,
    ) -> Self {
        LeagueSubscription { id, key, rx, store }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the next snapshot; `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<LeagueSnapshot> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<LeagueSnapshot> {
        self.rx.try_recv().ok()
    }
}

impl Stream for LeagueSubscription {
    type Item = LeagueSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for LeagueSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(&self.key, self.id);
        }
    }
}
