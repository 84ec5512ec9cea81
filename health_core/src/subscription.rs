//! Change subscriptions over the multiplexed bridge event stream.
//!
//! The bridge exposes one event stream shared by every native observer.
//! [`EventHub`] keeps the local listeners keyed by subscription id and fans
//! each event out to the listeners whose identifier matches it. Removing a
//! listener never affects the others.

use crate::bridge::{HealthBridge, RawBridgeEvent};
use crate::identifiers::SampleIdentifier;
use crate::marshal::deserialize_sample;
use crate::types::Sample;
use crate::units::Unit;
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Local handle for one registered listener
pub type SubscriptionId = u64;

/// Callback invoked with each batch of changed samples
pub type ChangeCallback = Arc<dyn Fn(SubscriptionUpdate) + Send + Sync>;

/// Samples delivered to a subscriber
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionUpdate {
    pub identifier: SampleIdentifier,
    pub query_id: String,
    pub samples: Vec<Sample>,
}

struct Listener {
    identifier: SampleIdentifier,
    callback: ChangeCallback,
}

/// Publish/subscribe registry fed by the bridge event stream
#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Arc<RwLock<HashMap<SubscriptionId, Listener>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one identifier
    pub async fn register(
        &self,
        identifier: SampleIdentifier,
        callback: ChangeCallback,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners
            .write()
            .await
            .insert(id, Listener { identifier, callback });
        tracing::debug!("Registered listener {} for {}", id, identifier);
        id
    }

    /// Remove a listener; returns false if it was already gone
    pub async fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.listeners.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!("Removed listener {}", id);
        }
        removed
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn has_listener_for(&self, identifier: SampleIdentifier) -> bool {
        self.listeners
            .read()
            .await
            .values()
            .any(|listener| listener.identifier == identifier)
    }

    /// Deliver one bridge event to every listener of its identifier.
    ///
    /// Returns the number of callbacks invoked. Samples that fail to
    /// deserialize are logged and left out of the update.
    pub async fn dispatch(&self, event: RawBridgeEvent) -> usize {
        let callbacks: Vec<(SampleIdentifier, ChangeCallback)> = {
            let listeners = self.listeners.read().await;
            listeners
                .values()
                .filter(|listener| listener.identifier.as_wire() == event.type_identifier)
                .map(|listener| (listener.identifier, Arc::clone(&listener.callback)))
                .collect()
        };

        if callbacks.is_empty() {
            tracing::trace!("No listeners for {}", event.type_identifier);
            return 0;
        }

        let mut samples = Vec::with_capacity(event.samples.len());
        for raw in event.samples {
            match deserialize_sample(raw) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::warn!(
                        "Dropping undecodable sample for {}: {}",
                        event.type_identifier,
                        e
                    );
                }
            }
        }

        for (identifier, callback) in &callbacks {
            callback(SubscriptionUpdate {
                identifier: *identifier,
                query_id: event.query_id.clone(),
                samples: samples.clone(),
            });
        }
        callbacks.len()
    }

    /// Pump the bridge event stream into this hub until it closes
    pub async fn run(self, mut events: broadcast::Receiver<RawBridgeEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.dispatch(event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event stream closed");
                    break;
                }
            }
        }
    }
}

/// An active change subscription
pub struct Subscription<B: HealthBridge + ?Sized> {
    id: SubscriptionId,
    identifier: SampleIdentifier,
    query_id: String,
    hub: EventHub,
    bridge: Arc<B>,
    stopped: Mutex<Option<bool>>,
}

impl<B: HealthBridge + ?Sized> Subscription<B> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn identifier(&self) -> SampleIdentifier {
        self.identifier
    }

    /// Query id issued by the service for the native observer
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Stop receiving updates.
    ///
    /// The first successful call removes the local listener and stops the
    /// native observer. Later calls make no bridge call and return the
    /// result the service gave the first time.
    pub async fn unsubscribe(&self) -> Result<bool> {
        let mut stopped = self.stopped.lock().await;
        if let Some(result) = *stopped {
            return Ok(result);
        }

        self.hub.remove(self.id).await;
        let result = self.bridge.stop_observing(&self.query_id).await?;
        tracing::info!("Stopped observing {} ({})", self.identifier, self.query_id);
        *stopped = Some(result);
        Ok(result)
    }
}

/// Register a listener and start the matching native observer.
///
/// If the service refuses to start observing, the listener is removed
/// before the error is returned.
pub async fn subscribe<B: HealthBridge + ?Sized>(
    bridge: Arc<B>,
    hub: &EventHub,
    identifier: SampleIdentifier,
    unit: Option<Unit>,
    callback: ChangeCallback,
) -> Result<Subscription<B>> {
    let id = hub.register(identifier, callback).await;

    let query_id = match bridge
        .start_observing(identifier.as_wire(), unit.as_ref().map(Unit::as_str))
        .await
    {
        Ok(query_id) => query_id,
        Err(e) => {
            hub.remove(id).await;
            tracing::warn!("Failed to observe {}: {}", identifier, e);
            return Err(e.into());
        }
    };

    tracing::info!("Observing {} as {}", identifier, query_id);
    Ok(Subscription {
        id,
        identifier,
        query_id,
        hub: hub.clone(),
        bridge,
        stopped: Mutex::new(None),
    })
}
