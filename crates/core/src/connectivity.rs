//! Online/offline signal.
//!
//! The host decides what "online" means; this crate only reads the current
//! value and reacts to transitions.

use tokio::sync::watch;

/// Current connectivity plus a stream of transitions.
///
/// Dropping the receiver returned by [`Connectivity::subscribe`] unsubscribes.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity flag backed by a `watch` channel.
#[derive(Debug)]
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Update the flag. Subscribers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_online() {
        assert!(ConnectivitySignal::default().is_online());
    }

    #[tokio::test]
    async fn test_transition_notifies_subscribers() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();
        assert!(!*rx.borrow_and_update());

        signal.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_repeated_value_is_not_a_transition() {
        let signal = ConnectivitySignal::new(true);
        let mut rx = signal.subscribe();
        rx.borrow_and_update();

        signal.set_online(true);
        assert!(!rx.has_changed().unwrap());

        signal.set_online(false);
        assert!(rx.has_changed().unwrap());
    }
}
