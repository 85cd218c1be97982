//! services/api/src/adapters/notifier.rs
//!
//! The default `AlertNotifier`: alerts become structured warning lines that a
//! log shipper can route onward.

use async_trait::async_trait;
use enclave_core::domain::SecurityEvent;
use enclave_core::ports::{AlertNotifier, PortResult};
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, event: &SecurityEvent) -> PortResult<()> {
        warn!(
            target: "enclave::alerts",
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            user_id = ?event.user_id,
            ip = %event.ip_address,
            metadata = %event.metadata,
            "SECURITY ALERT: {}",
            event.description
        );
        Ok(())
    }
}
