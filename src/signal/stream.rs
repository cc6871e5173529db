use std::sync::Weak;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{MapperError, MapperResult};

use super::hub::SubscriberMap;
use super::{SignalEnvelope, SubscriptionId};

/// A subscription stream for signals.
///
/// Dropping this stream removes the subscription from its hub.
#[derive(Debug)]
pub struct SignalStream {
    subscription_id: SubscriptionId,
    rx: Receiver<SignalEnvelope>,
    hub: Weak<SubscriberMap>,
}

impl SignalStream {
    pub(crate) fn new(subscription_id: SubscriptionId, rx: Receiver<SignalEnvelope>, hub: Weak<SubscriberMap>) -> Self {
        Self {
            subscription_id,
            rx,
            hub,
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Receive the next signal (blocking).
    pub fn recv(&self) -> MapperResult<SignalEnvelope> {
        self.rx.recv().map_err(|_| MapperError::Disconnected {
            worker: "signal_stream".to_string(),
        })
    }

    /// Receive the next signal with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> MapperResult<SignalEnvelope> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MapperError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => MapperError::Disconnected {
                worker: "signal_stream".to_string(),
            },
        })
    }

    /// Everything currently buffered, without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<SignalEnvelope> {
        self.rx.try_iter().collect()
    }
}

impl Drop for SignalStream {
    fn drop(&mut self) {
        if let Some(subs) = self.hub.upgrade() {
            if let Ok(mut guard) = subs.lock() {
                guard.remove(&self.subscription_id);
            }
        }
    }
}
