use netsift_common::{DnsResolvedEvent, TlsHandshakeEvent};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    TlsHandshake(TlsHandshakeEvent),
    DnsResolved(DnsResolvedEvent),
}

impl FlowEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FlowEvent::TlsHandshake(_) => "tls_handshake",
            FlowEvent::DnsResolved(_) => "dns_resolved",
        }
    }
}

/// Fire-and-forget fan-out of classification events
///
/// Publishing never blocks the data path. With no subscriber the event is
/// discarded; a lagging subscriber loses the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    /// Returns whether any subscriber received the event
    pub fn publish(&self, event: FlowEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
