#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use waticket_api::tickets::{
    AssignmentArbiter, BroadcastNotifier, CorrelationResolver, DeliveryError,
    EventNotifier, InboundMessage, InboundOutcome, LifecycleEngine, MemoryTicketStore,
    OutboundGateway, TicketEvent, TicketStore,
};

/// Test double for the outbound channel: records every send and can be
/// switched into a failing mode to simulate an outage.
#[derive(Default)]
pub struct RecordingGateway {
    fail: AtomicBool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundGateway for RecordingGateway {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected("simulated channel outage".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Core wiring over the in-memory store, one per test.
pub struct Harness {
    pub store: Arc<MemoryTicketStore>,
    pub engine: Arc<LifecycleEngine>,
    pub resolver: Arc<CorrelationResolver>,
    pub arbiter: Arc<AssignmentArbiter>,
    pub notifier: Arc<BroadcastNotifier>,
    pub gateway: Arc<RecordingGateway>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryTicketStore::new());
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let gateway = Arc::new(RecordingGateway::default());

        let store_dyn: Arc<dyn TicketStore> = store.clone();
        let notifier_dyn: Arc<dyn EventNotifier> = notifier.clone();
        let gateway_dyn: Arc<dyn OutboundGateway> = gateway.clone();

        let engine = Arc::new(LifecycleEngine::new(
            store_dyn.clone(),
            notifier_dyn.clone(),
            gateway_dyn,
        ));
        let resolver = Arc::new(CorrelationResolver::new(store_dyn.clone(), engine.clone()));
        let arbiter = Arc::new(AssignmentArbiter::new(store_dyn, notifier_dyn));

        Self { store, engine, resolver, arbiter, notifier, gateway }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.notifier.subscribe()
    }

    /// Shorthand inbound webhook delivery.
    pub async fn inbound(&self, channel: &str, text: &str) -> InboundOutcome {
        self.resolver
            .resolve_inbound(message(channel, text))
            .await
            .expect("inbound resolution")
    }
}

pub fn message(channel: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel_id: channel.to_string(),
        text: text.to_string(),
        sender_name: "Customer".to_string(),
        occurred_at: None,
        external_message_id: None,
    }
}

/// Drain everything currently buffered in an event receiver.
pub fn drain_events(rx: &mut broadcast::Receiver<TicketEvent>) -> Vec<TicketEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
