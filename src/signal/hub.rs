//! Signal hub.
//!
//! Emission is synchronous on the emitter's thread and never blocks: each
//! matching subscriber gets a non-blocking `try_send`. Disconnected
//! subscribers are pruned on the next emission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::config::SignalHubConfig;

use super::stream::SignalStream;
use super::{Signal, SignalEnvelope, SignalFilter, SignalSink, SubscriptionId};

#[derive(Debug)]
pub(crate) struct Subscriber {
    filter: SignalFilter,
    tx: Sender<SignalEnvelope>,
}

pub(crate) type SubscriberMap = Mutex<HashMap<SubscriptionId, Subscriber>>;

/// In-process signal fan-out.
#[derive(Debug)]
pub struct SignalHub {
    cfg: SignalHubConfig,
    subscribers: Arc<SubscriberMap>,
    seq: AtomicU64,
    dropped: AtomicU64,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(SignalHubConfig::default())
    }
}

impl SignalHub {
    #[must_use]
    pub fn new(cfg: SignalHubConfig) -> Self {
        Self {
            cfg,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to signals matching `filter`.
    pub fn subscribe(&self, filter: SignalFilter) -> SignalStream {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<SignalEnvelope>(self.cfg.stream_capacity.max(1));
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, Subscriber { filter, tx });
        }
        SignalStream::new(id, rx, Arc::downgrade(&self.subscribers))
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Signals lost because a subscriber's buffer was full.
    #[must_use]
    pub fn dropped_signals(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total signals emitted through this hub.
    #[must_use]
    pub fn emitted_signals(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

impl SignalSink for SignalHub {
    fn emit(&self, path: &str, signal: Signal) {
        let envelope = SignalEnvelope {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            path: path.to_string(),
            signal,
            emitted_at: Utc::now(),
        };

        let Ok(mut subs) = self.subscribers.lock() else {
            tracing::warn!(path, "signal hub lock poisoned; signal discarded");
            return;
        };

        subs.retain(|id, sub| {
            if !sub.filter.matches(&envelope) {
                return true;
            }
            match sub.tx.try_send(envelope.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription = ?id,
                        path = %envelope.path,
                        member = envelope.signal.member(),
                        "subscriber buffer full; signal dropped"
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}
