use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::events::{EventKind, HostEvent};

/// Per-subscriber queue depth.
const SUBSCRIPTION_CAPACITY: usize = 256;

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<HostEvent>,
}

/// Fan-out of host events to the plugins that asked for them.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `kinds`. Dropping the receiver unsubscribes.
    pub async fn subscribe(&self, kinds: &[EventKind]) -> mpsc::Receiver<HostEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscribers.write().await.push(Subscriber {
            kinds: kinds.to_vec(),
            tx,
        });
        rx
    }

    /// Deliver `event` to every matching subscriber. Returns how many received it.
    pub async fn publish(&self, event: &HostEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut closed = false;
        {
            let subs = self.subscribers.read().await;
            for sub in subs.iter().filter(|s| s.kinds.contains(&kind)) {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        error!("Subscriber queue full, {} event DROPPED", kind);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed = true,
                }
            }
        }
        if closed {
            self.subscribers.write().await.retain(|s| !s.tx.is_closed());
        }
        delivered
    }

    /// End every subscription; plugin loops drain and unmount.
    pub async fn close(&self) {
        self.subscribers.write().await.clear();
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

/// A unit of behaviour driven by host events.
#[async_trait]
pub trait Plugin: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Events this plugin wants delivered.
    fn subscriptions(&self) -> &'static [EventKind];

    async fn mount(&mut self) -> Result<()> {
        Ok(())
    }

    async fn unmount(&mut self) -> Result<()> {
        Ok(())
    }

    /// Handle one event. Failures are the plugin's to log; nothing propagates.
    async fn on_event(&mut self, event: HostEvent);
}

/// Subscribe, mount, and drive `plugin` on its own task until the bus closes.
///
/// Events reach a plugin one at a time, so plugin state needs no locking.
pub async fn spawn_plugin(bus: &EventBus, mut plugin: Box<dyn Plugin>) -> JoinHandle<()> {
    let mut rx = bus.subscribe(plugin.subscriptions()).await;

    tokio::spawn(async move {
        let name = plugin.name().to_string();
        if let Err(e) = plugin.mount().await {
            error!("[{}] Failed to mount: {:#}", name, e);
            return;
        }
        info!("[{}] Mounted", name);

        while let Some(event) = rx.recv().await {
            debug!("[{}] Handling {}", name, event.kind());
            plugin.on_event(event).await;
        }

        if let Err(e) = plugin.unmount().await {
            error!("[{}] Failed to unmount: {:#}", name, e);
        }
        info!("[{}] Unmounted", name);
    })
}
