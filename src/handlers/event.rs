use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use crate::errors::MediatorError;

pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Change notifications published by a [`super::HandlerRegistry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { request_type: String, registration: String },
    Unregistered { request_type: String, registration: String },
}

pub type Subscription = broadcast::Receiver<RegistryEvent>;

/// Listener invoked before a registration is removed.
pub type UnregisterListener = Arc<dyn Fn(&UnregisterEvent) + Send + Sync>;

/// Delivered to unregister listeners before removal.
///
/// A listener may attach cleanup work once with [`UnregisterEvent::wait_until`];
/// the registry awaits it, and a failure aborts the unregistration.
pub struct UnregisterEvent {
    pub request_type: String,
    pub registration: String,
    pending: Mutex<Option<BoxFuture<'static, anyhow::Result<()>>>>,
}

impl UnregisterEvent {
    pub(crate) fn new(request_type: impl Into<String>, registration: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            registration: registration.into(),
            pending: Mutex::new(None),
        }
    }

    pub fn event_type(&self) -> &'static str {
        "unregister"
    }

    pub fn wait_until<F>(&self, work: F) -> Result<(), MediatorError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some() {
            return Err(MediatorError::InvalidState(
                "wait_until may only be called once per unregister event".to_string(),
            ));
        }
        *pending = Some(Box::pin(work));
        Ok(())
    }

    pub(crate) fn take_pending(&self) -> Option<BoxFuture<'static, anyhow::Result<()>>> {
        self.pending.lock().unwrap().take()
    }
}

impl std::fmt::Debug for UnregisterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnregisterEvent")
            .field("request_type", &self.request_type)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

pub(crate) struct RegistryBus {
    tx: broadcast::Sender<RegistryEvent>,
}

impl Default for RegistryBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl RegistryBus {
    pub(crate) fn subscribe(&self) -> Subscription {
        self.tx.subscribe()
    }

    pub(crate) fn publish(&self, ev: RegistryEvent) {
        // send() only fails when nobody is subscribed
        let _ = self.tx.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_until_is_accepted_once() {
        let ev = UnregisterEvent::new("credentialHandler", "https://issuer.example/h");
        assert_eq!(ev.event_type(), "unregister");
        ev.wait_until(async { anyhow::Ok(()) }).unwrap();
        assert!(matches!(ev.wait_until(async { anyhow::Ok(()) }), Err(MediatorError::InvalidState(_))));

        let work = ev.take_pending().unwrap();
        work.await.unwrap();
        assert!(ev.take_pending().is_none());
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = RegistryBus::default();
        // publishing with no subscribers is fine
        bus.publish(RegistryEvent::Registered { request_type: "t".into(), registration: "r".into() });

        let mut rx = bus.subscribe();
        let ev = RegistryEvent::Unregistered { request_type: "t".into(), registration: "r".into() };
        bus.publish(ev.clone());
        assert_eq!(rx.recv().await.unwrap(), ev);
    }
}
