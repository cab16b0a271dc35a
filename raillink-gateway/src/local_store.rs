use crate::app_config::StorageConfig;
use raillink_core::alerts::{AlertRecord, AlertSubscription, ALERT_HISTORY_LIMIT};
use raillink_core::booking::{BookingStatus, LocalBookingRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StorePayload {
    #[serde(default)]
    subscriptions: Vec<AlertSubscription>,
    #[serde(default)]
    alerts: Vec<AlertRecord>,
    #[serde(default)]
    bookings: Vec<LocalBookingRecord>,
}

/// JSON-file cache for data the passenger expects to survive restarts:
/// alert subscriptions, alert history and booking receipts. The server
/// stays authoritative; this is the offline copy.
pub struct LocalStore {
    path: PathBuf,
    state: Mutex<StorePayload>,
}

impl LocalStore {
    pub fn open(config: &StorageConfig) -> Self {
        let path = PathBuf::from(&config.path);
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!("Discarding unreadable local store {:?}: {}", path, error);
                    StorePayload::default()
                }
            },
            Err(_) => StorePayload::default(),
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn persist(&self, state: &StorePayload) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Alert subscriptions
    // ------------------------------------------------------------------

    pub async fn subscriptions(&self) -> Vec<AlertSubscription> {
        self.state.lock().await.subscriptions.clone()
    }

    /// Insert or update a subscription keyed by its server id.
    pub async fn put_subscription(
        &self,
        subscription: AlertSubscription,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state
            .subscriptions
            .iter_mut()
            .find(|existing| existing.id == subscription.id)
        {
            Some(existing) => *existing = subscription,
            None => state.subscriptions.push(subscription),
        }
        self.persist(&state)
    }

    pub async fn remove_subscription(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.subscriptions.retain(|existing| existing.id != id);
        self.persist(&state)
    }

    /// Replace the cached set with the server's copy after a refresh.
    pub async fn replace_subscriptions(
        &self,
        subscriptions: Vec<AlertSubscription>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.subscriptions = subscriptions;
        self.persist(&state)
    }

    // ------------------------------------------------------------------
    // Alert history
    // ------------------------------------------------------------------

    /// Append an alert, evicting the oldest entries beyond the history cap.
    pub async fn push_alert(&self, alert: AlertRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.alerts.push(alert);
        while state.alerts.len() > ALERT_HISTORY_LIMIT {
            state.alerts.remove(0);
        }
        self.persist(&state)
    }

    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.state.lock().await.alerts.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.state
            .lock()
            .await
            .alerts
            .iter()
            .filter(|alert| !alert.read)
            .count()
    }

    pub async fn mark_all_read(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for alert in &mut state.alerts {
            alert.read = true;
        }
        self.persist(&state)
    }

    // ------------------------------------------------------------------
    // Booking receipts
    // ------------------------------------------------------------------

    pub async fn push_booking(&self, record: LocalBookingRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.bookings.push(record);
        self.persist(&state)
    }

    pub async fn set_booking_status(
        &self,
        booking_id: i64,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for record in &mut state.bookings {
            if record.booking_id == booking_id {
                record.status = status;
            }
        }
        self.persist(&state)
    }

    /// Look up a receipt by PNR, falling back to the numeric booking id.
    pub async fn find_booking_by_pnr(&self, query: &str) -> Option<LocalBookingRecord> {
        self.state
            .lock()
            .await
            .bookings
            .iter()
            .find(|record| record.pnr == query || record.booking_id.to_string() == query)
            .cloned()
    }

    pub async fn bookings(&self) -> Vec<LocalBookingRecord> {
        self.state.lock().await.bookings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use raillink_core::alerts::AlertKind;
    use std::collections::BTreeSet;

    fn store_in(dir: &tempfile::TempDir) -> LocalStore {
        let path = dir.path().join("store.json");
        LocalStore::open(&StorageConfig {
            path: path.to_string_lossy().to_string(),
        })
    }

    fn subscription(id: &str, pnr: &str) -> AlertSubscription {
        AlertSubscription {
            id: id.to_string(),
            pnr: pnr.to_string(),
            phone: Some("+919876543210".to_string()),
            email: None,
            alert_types: AlertKind::default_set(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = store_in(&dir);
            store
                .put_subscription(subscription("sub-1", "9001"))
                .await
                .expect("put");
            store
                .push_booking(LocalBookingRecord {
                    booking_id: 9001,
                    pnr: "9001".to_string(),
                    train_id: 12301,
                    train_name: "Rajdhani Express".to_string(),
                    date: NaiveDate::from_ymd_opt(2026, 9, 4).expect("date"),
                    status: BookingStatus::Confirmed,
                })
                .await
                .expect("push");
        }

        let reopened = store_in(&dir);
        assert_eq!(reopened.subscriptions().await.len(), 1);
        let found = reopened.find_booking_by_pnr("9001").await.expect("booking");
        assert_eq!(found.train_name, "Rajdhani Express");
    }

    #[tokio::test]
    async fn test_alert_history_caps_at_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        for i in 0..(ALERT_HISTORY_LIMIT + 1) {
            store
                .push_alert(AlertRecord::new(
                    AlertKind::Delay,
                    "9001",
                    &format!("Delay update {}", i),
                ))
                .await
                .expect("push");
        }

        let alerts = store.alerts().await;
        assert_eq!(alerts.len(), ALERT_HISTORY_LIMIT);
        // Oldest entry is gone, newest is present
        assert_eq!(alerts[0].message, "Delay update 1");
        assert_eq!(
            alerts[ALERT_HISTORY_LIMIT - 1].message,
            format!("Delay update {}", ALERT_HISTORY_LIMIT)
        );
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_all_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .push_alert(AlertRecord::new(AlertKind::Delay, "9001", "Running late"))
            .await
            .expect("push");
        store
            .push_alert(AlertRecord::new(
                AlertKind::PlatformChange,
                "9001",
                "Platform 4",
            ))
            .await
            .expect("push");

        assert_eq!(store.unread_count().await, 2);
        store.mark_all_read().await.expect("mark");
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").expect("write");

        let store = LocalStore::open(&StorageConfig {
            path: path.to_string_lossy().to_string(),
        });
        assert!(store.subscriptions().await.is_empty());
        assert!(store.bookings().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_subscription_upserts_by_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .put_subscription(subscription("sub-1", "9001"))
            .await
            .expect("put");
        let mut updated = subscription("sub-1", "9001");
        updated.alert_types = BTreeSet::from([AlertKind::RouteDeviation]);
        store.put_subscription(updated).await.expect("put");

        let subscriptions = store.subscriptions().await;
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(
            subscriptions[0].alert_types,
            BTreeSet::from([AlertKind::RouteDeviation])
        );
    }
}
