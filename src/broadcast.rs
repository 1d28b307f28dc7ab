//! Notification publish boundary.
//!
//! The engine hands every decided notification to a `NotificationBroadcaster`
//! and forgets it. `TenantBroadcaster` is the in-process fan-out used by the
//! WebSocket gateway: one `tokio::sync::broadcast` channel per tenant, so a
//! lagging subscriber loses old notifications instead of blocking the engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::RiskChangeNotification;

/// Per-tenant channel capacity before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Notification for tenant {notification_tenant} published on tenant {tenant_id}")]
    TenantMismatch {
        tenant_id: String,
        notification_tenant: String,
    },

    #[error("Broadcaster lock poisoned")]
    LockPoisoned,

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// One capability: publish a notification to a tenant's subscribers.
pub trait NotificationBroadcaster: Send + Sync {
    fn broadcast(
        &self,
        tenant_id: &str,
        notification: &RiskChangeNotification,
    ) -> Result<(), BroadcastError>;
}

pub struct TenantBroadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<Arc<RiskChangeNotification>>>>,
    capacity: usize,
}

impl Default for TenantBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl TenantBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a tenant's notifications, creating its channel on first use.
    pub fn subscribe(
        &self,
        tenant_id: &str,
    ) -> Result<broadcast::Receiver<Arc<RiskChangeNotification>>, BroadcastError> {
        if let Some(tx) = self
            .channels
            .read()
            .map_err(|_| BroadcastError::LockPoisoned)?
            .get(tenant_id)
        {
            return Ok(tx.subscribe());
        }
        let mut channels = self
            .channels
            .write()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        let tx = channels
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(tx.subscribe())
    }

    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|c| c.get(tenant_id).map(|tx| tx.receiver_count()))
            .unwrap_or(0)
    }
}

impl NotificationBroadcaster for TenantBroadcaster {
    fn broadcast(
        &self,
        tenant_id: &str,
        notification: &RiskChangeNotification,
    ) -> Result<(), BroadcastError> {
        if notification.tenant_id != tenant_id {
            return Err(BroadcastError::TenantMismatch {
                tenant_id: tenant_id.to_string(),
                notification_tenant: notification.tenant_id.clone(),
            });
        }
        let channels = self
            .channels
            .read()
            .map_err(|_| BroadcastError::LockPoisoned)?;
        let delivered = channels
            .get(tenant_id)
            .and_then(|tx| tx.send(Arc::new(notification.clone())).ok())
            .unwrap_or(0);
        if delivered == 0 {
            tracing::debug!(tenant_id, "No subscribers for notification");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationPriority, RiskLevel, DISCLAIMER};
    use chrono::Utc;

    fn notification(tenant: &str, patient: &str) -> RiskChangeNotification {
        RiskChangeNotification {
            patient_id: patient.into(),
            tenant_id: tenant.into(),
            timestamp: Utc::now(),
            priority: NotificationPriority::High,
            changes: vec!["Overall risk rose".into()],
            new_score: 65,
            new_level: RiskLevel::High,
            recommendations: vec![],
            disclaimer: DISCLAIMER.into(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_only_their_tenant() {
        let b = TenantBroadcaster::default();
        let mut t1 = b.subscribe("t-1").unwrap();
        let mut t2 = b.subscribe("t-2").unwrap();

        b.broadcast("t-1", &notification("t-1", "p-1")).unwrap();

        let got = t1.recv().await.unwrap();
        assert_eq!(got.patient_id, "p-1");
        assert!(matches!(
            t2.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn no_subscribers_is_not_an_error() {
        let b = TenantBroadcaster::default();
        assert!(b.broadcast("t-1", &notification("t-1", "p-1")).is_ok());
        assert_eq!(b.subscriber_count("t-1"), 0);
    }

    #[test]
    fn tenant_mismatch_rejected() {
        let b = TenantBroadcaster::default();
        let err = b.broadcast("t-2", &notification("t-1", "p-1")).unwrap_err();
        assert!(matches!(err, BroadcastError::TenantMismatch { .. }));
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest() {
        let b = TenantBroadcaster::new(2);
        let mut rx = b.subscribe("t-1").unwrap();
        for i in 0..4 {
            b.broadcast("t-1", &notification("t-1", &format!("p-{i}")))
                .unwrap();
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().patient_id, "p-2");
    }
}
