use std::sync::Arc;

use triage_core::idempotency::IdempotencyGate;
use triage_core::workflow::Services;

/// Shared application state passed to all route handlers. Everything in here
/// is constructed once at startup and handed out by reference — there are no
/// module-level singletons behind the handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub gate: Arc<IdempotencyGate>,
    /// Webhook HMAC secret; `None` disables signature verification.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(services: Arc<Services>, webhook_secret: Option<String>) -> Self {
        Self {
            services,
            gate: Arc::new(IdempotencyGate::new()),
            webhook_secret,
        }
    }
}
