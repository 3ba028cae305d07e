use tracing::info;

use cartkeeper_core::audit::{AuditEvent, AuditSink};

/// Forwards audit events to the `tracing` pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            user_id = %event.user_id,
            cart_id = event.cart_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            category = ?event.category,
            outcome = ?event.outcome,
            actor = %event.actor,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}
