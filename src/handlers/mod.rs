use std::sync::Arc;

use crate::config;
use crate::tickets::{
    AssignmentArbiter, BroadcastNotifier, CorrelationResolver, EventNotifier,
    LifecycleEngine, OutboundGateway, TicketStore,
};

pub mod tickets;
pub mod webhook;

/// Shared wiring for the HTTP surface: the three core components over one
/// store, one notifier, one outbound gateway.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub resolver: Arc<CorrelationResolver>,
    pub arbiter: Arc<AssignmentArbiter>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>, gateway: Arc<dyn OutboundGateway>) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new(config::config().events.buffer));
        let notifier_dyn: Arc<dyn EventNotifier> = notifier.clone();

        let engine = Arc::new(LifecycleEngine::new(
            store.clone(),
            notifier_dyn.clone(),
            gateway,
        ));
        let resolver = Arc::new(CorrelationResolver::new(store.clone(), engine.clone()));
        let arbiter = Arc::new(AssignmentArbiter::new(store, notifier_dyn));

        Self { engine, resolver, arbiter, notifier }
    }
}
