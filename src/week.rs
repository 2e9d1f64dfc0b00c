use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// The authority on which NFL week is selected. Interested tasks subscribe
/// and are woken on change instead of polling.
#[derive(Clone)]
pub struct WeekSelector {
    tx: Arc<watch::Sender<u32>>,
}

impl WeekSelector {
    pub fn new(week: u32) -> Self {
        let (tx, _rx) = watch::channel(week);
        WeekSelector { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> u32 {
        *self.tx.borrow()
    }

    /// Select a week. Returns whether it differed from the current one;
    /// subscribers are only woken on an actual change.
    pub fn publish(&self, week: u32) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == week {
                false
            } else {
                *current = week;
                true
            }
        });
        if changed {
            info!("Selected week {}", week);
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_wakes_subscribers() {
        let selector = WeekSelector::new(4);
        let mut rx = selector.subscribe();
        assert!(selector.publish(5));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 5);
        assert_eq!(selector.current(), 5);
    }

    #[tokio::test]
    async fn test_republishing_same_week_is_silent() {
        let selector = WeekSelector::new(4);
        let rx = selector.subscribe();
        assert!(!selector.publish(4));
        assert!(!rx.has_changed().unwrap());
    }
}
