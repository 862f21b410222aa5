//! Connection status notifications for the UI shell.
//!
//! Each controller holds at most one [`StatusObserver`], installed once by
//! whoever owns the controller.  The observer receives `(connected, message)`
//! pairs such as `(true, "Connected to 192.168.1.20")` or
//! `(false, "Connection lost, reconnecting")`.

use std::sync::{Arc, OnceLock};

use tracing::debug;

/// Receives connection status changes.
#[cfg_attr(test, mockall::automock)]
pub trait StatusObserver: Send + Sync {
    fn on_status_change(&self, connected: bool, message: &str);
}

/// Adapts a closure into a [`StatusObserver`].
pub struct FnObserver<F>(pub F);

impl<F> StatusObserver for FnObserver<F>
where
    F: Fn(bool, &str) + Send + Sync,
{
    fn on_status_change(&self, connected: bool, message: &str) {
        (self.0)(connected, message)
    }
}

/// Error returned when a second observer is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a status observer is already installed")]
pub struct ObserverAlreadySet;

/// Holds the single subscriber and forwards notifications to it.
#[derive(Default)]
pub struct StatusNotifier {
    observer: OnceLock<Arc<dyn StatusObserver>>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverAlreadySet`] if an observer was installed before.
    pub fn subscribe(&self, observer: Arc<dyn StatusObserver>) -> Result<(), ObserverAlreadySet> {
        self.observer.set(observer).map_err(|_| ObserverAlreadySet)
    }

    pub fn has_subscriber(&self) -> bool {
        self.observer.get().is_some()
    }

    /// Forwards a status change; a no-op when nobody subscribed.
    pub fn notify(&self, connected: bool, message: &str) {
        debug!(connected, message, "status change");
        if let Some(observer) = self.observer.get() {
            observer.on_status_change(connected, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::Mutex;

    #[test]
    fn test_notify_forwards_to_subscriber() {
        // Arrange
        let mut mock = MockStatusObserver::new();
        mock.expect_on_status_change()
            .with(eq(true), eq("Connected to 10.0.0.5"))
            .times(1)
            .return_const(());
        let notifier = StatusNotifier::new();
        notifier.subscribe(Arc::new(mock)).unwrap();

        // Act
        notifier.notify(true, "Connected to 10.0.0.5");

        // Assert: expectations are verified when the mock drops
    }

    #[test]
    fn test_second_subscribe_is_rejected() {
        let notifier = StatusNotifier::new();
        notifier
            .subscribe(Arc::new(FnObserver(|_: bool, _: &str| {})))
            .unwrap();

        let second = notifier.subscribe(Arc::new(FnObserver(|_: bool, _: &str| {})));

        assert_eq!(second, Err(ObserverAlreadySet));
    }

    #[test]
    fn test_notify_without_subscriber_is_a_no_op() {
        let notifier = StatusNotifier::new();
        assert!(!notifier.has_subscriber());
        notifier.notify(false, "Disconnected");
    }

    #[test]
    fn test_fn_observer_receives_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = StatusNotifier::new();
        notifier
            .subscribe(Arc::new(FnObserver(move |c: bool, m: &str| {
                sink.lock().unwrap().push((c, m.to_string()));
            })))
            .unwrap();

        notifier.notify(false, "Disconnected");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(false, "Disconnected".to_string())]
        );
    }
}
