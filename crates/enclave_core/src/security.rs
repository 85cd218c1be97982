//! crates/enclave_core/src/security.rs
//!
//! The append-only security event log. Recording never fails the caller: a
//! store error is logged locally and swallowed.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{ClientInfo, EventFilter, EventType, SecurityEvent, SecurityStats};
use crate::ports::{AlertNotifier, DatabaseService, PortResult};

#[derive(Clone)]
pub struct SecurityLogger {
    db: Arc<dyn DatabaseService>,
    notifier: Arc<dyn AlertNotifier>,
}

impl SecurityLogger {
    pub fn new(db: Arc<dyn DatabaseService>, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self { db, notifier }
    }

    pub async fn record(&self, event: SecurityEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.db.insert_security_event(event).await {
            error!(event_type = event_type.as_str(), "Failed to record security event: {:?}", e);
        }
    }

    pub async fn recent(&self, filter: EventFilter) -> PortResult<Vec<SecurityEvent>> {
        self.db.list_security_events(filter).await
    }

    pub async fn stats(&self) -> PortResult<SecurityStats> {
        let since = Utc::now() - Duration::hours(24);
        let counts = self.db.count_security_events_since(since).await?;
        // Report every event type, including those with no occurrences.
        let events_last_24h = EventType::ALL
            .iter()
            .map(|kind| {
                let count = counts
                    .iter()
                    .find(|(counted, _)| counted == kind)
                    .map(|(_, count)| *count)
                    .unwrap_or(0);
                (*kind, count)
            })
            .collect();

        Ok(SecurityStats {
            events_last_24h,
            active_auth_sessions: self.db.list_active_auth_sessions().await?.len() as i64,
            active_terminal_sessions: self.db.count_active_terminal_sessions().await?,
            total_users: self.db.count_users().await?,
        })
    }

    /// Records a SUSPICIOUS event and forwards it to the alert notifier.
    pub async fn raise_alert(
        &self,
        user_id: Option<Uuid>,
        description: &str,
        client: &ClientInfo,
        metadata: serde_json::Value,
    ) -> SecurityEvent {
        let mut event = SecurityEvent::new(EventType::Suspicious, description)
            .from_client(client)
            .with_metadata(metadata);
        event.user_id = user_id;

        self.record(event.clone()).await;
        if let Err(e) = self.notifier.notify(&event).await {
            warn!("Alert notifier failed: {:?}", e);
        }
        event
    }

    /// Sends a test notification without recording it in the audit log.
    pub async fn test_notifier(&self, user_id: Uuid, client: &ClientInfo) -> PortResult<()> {
        let event = SecurityEvent::new(EventType::Suspicious, "Notifier test")
            .for_user(user_id)
            .from_client(client)
            .with_metadata(json!({ "test": true }));
        self.notifier.notify(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewAuthSession;
    use crate::memory::InMemoryStore;
    use crate::ports::PortError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertNotifier for RecordingNotifier {
        async fn notify(&self, event: &SecurityEvent) -> PortResult<()> {
            self.seen.lock().await.push(event.description.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl AlertNotifier for FailingNotifier {
        async fn notify(&self, _event: &SecurityEvent) -> PortResult<()> {
            Err(PortError::Unexpected("sink offline".to_string()))
        }
    }

    #[tokio::test]
    async fn alert_is_recorded_and_forwarded() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let logger = SecurityLogger::new(store.clone(), notifier.clone());

        logger
            .raise_alert(None, "Perimeter breach", &ClientInfo::new("10.0.0.9", "probe"), json!({}))
            .await;

        let events = logger.recent(EventFilter::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Suspicious);
        assert_eq!(events[0].ip_address, "10.0.0.9");
        assert_eq!(notifier.seen.lock().await.as_slice(), ["Perimeter breach"]);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_lose_the_event() {
        let store = Arc::new(InMemoryStore::new());
        let logger = SecurityLogger::new(store, Arc::new(FailingNotifier));

        logger
            .raise_alert(None, "Perimeter breach", &ClientInfo::default(), json!({}))
            .await;
        assert_eq!(logger.recent(EventFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_report_zero_for_unseen_event_types() {
        let store = Arc::new(InMemoryStore::new());
        let logger = SecurityLogger::new(store, Arc::new(RecordingNotifier::default()));
        logger.record(SecurityEvent::new(EventType::Login, "login")).await;
        logger.record(SecurityEvent::new(EventType::Login, "login")).await;

        let stats = logger.stats().await.unwrap();
        assert_eq!(stats.events_last_24h.len(), EventType::ALL.len());
        assert!(stats.events_last_24h.contains(&(EventType::Login, 2)));
        assert!(stats.events_last_24h.contains(&(EventType::Suspicious, 0)));
    }

    #[tokio::test]
    async fn stats_ignore_expired_auth_sessions() {
        let store = Arc::new(InMemoryStore::new());
        let logger = SecurityLogger::new(store.clone(), Arc::new(RecordingNotifier::default()));
        for (hash, expires_at) in [
            ("live", Utc::now() + Duration::days(7)),
            ("stale", Utc::now() - Duration::minutes(1)),
        ] {
            store
                .create_auth_session(NewAuthSession {
                    user_id: Uuid::new_v4(),
                    access_token_hash: format!("{hash}-access"),
                    refresh_token_hash: format!("{hash}-refresh"),
                    expires_at,
                    client: ClientInfo::default(),
                })
                .await
                .unwrap();
        }

        assert_eq!(logger.stats().await.unwrap().active_auth_sessions, 1);
        let listed = store.list_active_auth_sessions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].access_token_hash, "live-access");
    }

    #[tokio::test]
    async fn test_notification_is_not_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let logger = SecurityLogger::new(store, notifier.clone());

        logger.test_notifier(Uuid::new_v4(), &ClientInfo::default()).await.unwrap();
        assert!(logger.recent(EventFilter::default()).await.unwrap().is_empty());
        assert_eq!(notifier.seen.lock().await.len(), 1);
    }
}
