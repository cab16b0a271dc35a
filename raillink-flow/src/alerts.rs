use crate::notify::{NoticeLevel, Notifier};
use raillink_core::alerts::{AlertKind, AlertRecord, AlertSubscription, SubscriptionRequest};
use raillink_core::api::{ApiError, ReservationApi};
use raillink_core::{validate, CoreError};
use raillink_gateway::local_store::{LocalStore, StoreError};
use raillink_shared::LiveEvent;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Alert subscriptions and the local alert history.
///
/// Subscriptions live server-side; the store only caches them so the list
/// renders offline. Push events are matched against the cache and appended
/// to the capped history.
pub struct AlertCenter {
    api: Arc<dyn ReservationApi>,
    store: Arc<LocalStore>,
    notifier: Arc<dyn Notifier>,
}

impl AlertCenter {
    pub fn new(
        api: Arc<dyn ReservationApi>,
        store: Arc<LocalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
        }
    }

    /// Create a subscription for a PNR. Empty kinds default to the three
    /// basic notification types.
    pub async fn subscribe(
        &self,
        pnr: &str,
        phone: Option<&str>,
        email: Option<&str>,
        kinds: BTreeSet<AlertKind>,
    ) -> Result<AlertSubscription, AlertError> {
        let pnr = pnr.trim();
        if pnr.is_empty() {
            return Err(invalid("Please enter your PNR number"));
        }
        if phone.is_none() && email.is_none() {
            return Err(invalid("Please provide a phone number or email"));
        }
        let phone = match phone {
            Some(raw) => {
                let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("Please enter a valid 10-digit phone number"));
                }
                Some(digits)
            }
            None => None,
        };
        if let Some(email) = email {
            validate::email(email)?;
        }
        let alert_types = if kinds.is_empty() {
            AlertKind::default_set()
        } else {
            kinds
        };

        let request = SubscriptionRequest {
            pnr: pnr.to_string(),
            phone,
            email: email.map(|email| email.trim().to_string()),
            alert_types,
        };
        let subscription = self.api.create_alert_subscription(&request).await?;
        self.store.put_subscription(subscription.clone()).await?;
        self.notifier
            .notify(NoticeLevel::Success, "Alert subscription created");
        Ok(subscription)
    }

    /// Delete a subscription. A 404 means it is already gone server-side;
    /// the cache entry is evicted either way.
    pub async fn unsubscribe(&self, id: &str) -> Result<(), AlertError> {
        match self.api.delete_alert_subscription(id).await {
            Ok(()) => {}
            Err(error) if error.is_status(404) => {}
            Err(error) => {
                self.notifier.notify(
                    NoticeLevel::Error,
                    &error.user_message("Could not remove the subscription"),
                );
                return Err(AlertError::Api(error));
            }
        }
        self.store.remove_subscription(id).await?;
        self.notifier
            .notify(NoticeLevel::Info, "Alert subscription removed");
        Ok(())
    }

    /// Re-list from the server and replace the cache.
    pub async fn refresh(&self) -> Result<Vec<AlertSubscription>, AlertError> {
        let subscriptions = self.api.list_alert_subscriptions().await?;
        self.store
            .replace_subscriptions(subscriptions.clone())
            .await?;
        Ok(subscriptions)
    }

    pub async fn subscriptions(&self) -> Vec<AlertSubscription> {
        self.store.subscriptions().await
    }

    /// Match a push event against the cached subscriptions and append one
    /// alert per interested subscription.
    pub async fn handle_event(&self, event: &LiveEvent) -> Result<Vec<AlertRecord>, AlertError> {
        let train_id = event.train_id();
        let mut produced = Vec::new();
        for subscription in self.store.subscriptions().await {
            let Some(record) = self.store.find_booking_by_pnr(&subscription.pnr).await else {
                continue;
            };
            if record.train_id != train_id {
                continue;
            }
            let Some((kind, message)) = classify(event, &record.train_name) else {
                continue;
            };
            if !subscription.alert_types.contains(&kind) {
                continue;
            }

            let alert = AlertRecord::new(kind, subscription.pnr.clone(), message.clone());
            self.store.push_alert(alert.clone()).await?;
            self.notifier.notify(NoticeLevel::Info, &message);
            produced.push(alert);
        }
        Ok(produced)
    }

    pub async fn history(&self) -> Vec<AlertRecord> {
        self.store.alerts().await
    }

    pub async fn unread_count(&self) -> usize {
        self.store.unread_count().await
    }

    pub async fn mark_all_read(&self) -> Result<(), AlertError> {
        self.store.mark_all_read().await?;
        Ok(())
    }
}

fn invalid(message: &str) -> AlertError {
    AlertError::Validation(CoreError::ValidationError(message.to_string()))
}

/// Which alert, if any, an event produces.
fn classify(event: &LiveEvent, train_name: &str) -> Option<(AlertKind, String)> {
    match event {
        LiveEvent::RouteDeviation(ev) => Some((AlertKind::RouteDeviation, ev.message.clone())),
        LiveEvent::TrainPosition(ev) => {
            if ev.progress >= 100.0 {
                Some((
                    AlertKind::Arrival,
                    format!("{} has arrived at its destination", train_name),
                ))
            } else {
                match ev.delay_minutes {
                    Some(delay) if delay > 0 => Some((
                        AlertKind::Delay,
                        format!("{} is delayed by {} minutes", train_name, delay),
                    )),
                    _ => None,
                }
            }
        }
        LiveEvent::CoachPosition(ev) => {
            let mut message = match ev.platform_number {
                Some(platform) => format!(
                    "Coach {} will arrive at platform {}",
                    ev.coach_number, platform
                ),
                None => format!("Coach {} position updated", ev.coach_number),
            };
            if let Some(station) = &ev.station {
                message.push_str(&format!(" at {}", station));
            }
            Some((AlertKind::PlatformChange, message))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AlertError {
    pub fn user_message(&self) -> String {
        match self {
            AlertError::Validation(error) => error.detail().to_string(),
            AlertError::Api(error) => {
                error.user_message("Could not update alert subscriptions")
            }
            AlertError::Store(error) => error.to_string(),
        }
    }
}
