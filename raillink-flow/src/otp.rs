use crate::session::SessionHandle;
use chrono::{DateTime, Duration, Utc};
use raillink_core::api::{ApiError, ReservationApi};
use raillink_core::session::Identity;
use raillink_core::{validate, CoreError};
use raillink_gateway::app_config::FlowRules;
use raillink_shared::Masked;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where phone verification currently stands. Expiry is derived from the
/// deadline rather than stored, so the state can never disagree with the
/// clock.
#[derive(Debug, Clone)]
pub enum OtpPhase {
    Idle,
    AwaitingVerification {
        phone: String,
        requested_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Verified,
}

/// OTP login: request a code, verify it within the countdown window.
///
/// One verification is active at a time. A new request supersedes the
/// previous countdown, and sends to the same number are capped.
pub struct PhoneVerification {
    api: Arc<dyn ReservationApi>,
    session: SessionHandle,
    countdown_seconds: i64,
    resend_limit: u32,
    phase: OtpPhase,
    sends: Option<(String, u32)>,
    ticker: Option<JoinHandle<()>>,
}

impl PhoneVerification {
    pub fn new(api: Arc<dyn ReservationApi>, session: SessionHandle, rules: &FlowRules) -> Self {
        Self {
            api,
            session,
            countdown_seconds: rules.otp_countdown_seconds,
            resend_limit: rules.otp_resend_limit,
            phase: OtpPhase::Idle,
            sends: None,
            ticker: None,
        }
    }

    pub fn phase(&self) -> &OtpPhase {
        &self.phase
    }

    /// Request a code for `raw_phone`, superseding any active countdown.
    pub async fn request_otp(&mut self, raw_phone: &str) -> Result<(), OtpError> {
        let phone = validate::phone(raw_phone)?;

        if let Some((sent_to, count)) = &self.sends {
            if sent_to == &phone && *count >= self.resend_limit {
                return Err(OtpError::ResendLimitReached);
            }
        }

        self.api.send_otp(&phone).await?;

        self.sends = match self.sends.take() {
            Some((sent_to, count)) if sent_to == phone => Some((sent_to, count + 1)),
            _ => Some((phone.clone(), 1)),
        };

        self.stop_ticker();
        let now = Utc::now();
        self.phase = OtpPhase::AwaitingVerification {
            phone,
            requested_at: now,
            expires_at: now + Duration::seconds(self.countdown_seconds),
        };
        Ok(())
    }

    /// Verify the entered code and complete the session login.
    pub async fn verify(&mut self, code: &str) -> Result<Identity, OtpError> {
        let phone = match &self.phase {
            OtpPhase::AwaitingVerification {
                phone, expires_at, ..
            } => {
                if Utc::now() >= *expires_at {
                    return Err(OtpError::CodeExpired);
                }
                phone.clone()
            }
            _ => return Err(OtpError::NotRequested),
        };
        validate::otp_code(code)?;

        let verified = self.api.verify_otp(&phone, code).await?;
        let identity = Identity {
            phone: Masked::new(phone),
            user_id: verified.user_id,
            role: verified.role,
        };
        self.session.complete_login(identity.clone()).await;

        self.stop_ticker();
        self.phase = OtpPhase::Verified;
        self.sends = None;
        Ok(identity)
    }

    pub fn remaining_seconds(&self) -> i64 {
        match &self.phase {
            OtpPhase::AwaitingVerification { expires_at, .. } => {
                (*expires_at - Utc::now()).num_seconds().max(0)
            }
            _ => 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(
            &self.phase,
            OtpPhase::AwaitingVerification { expires_at, .. } if Utc::now() >= *expires_at
        )
    }

    /// The verify button: only while a countdown is running.
    pub fn verify_available(&self) -> bool {
        matches!(
            &self.phase,
            OtpPhase::AwaitingVerification { expires_at, .. } if Utc::now() < *expires_at
        )
    }

    /// The resend button: after expiry, while under the send cap.
    pub fn resend_available(&self) -> bool {
        let under_cap = self
            .sends
            .as_ref()
            .map(|(_, count)| *count < self.resend_limit)
            .unwrap_or(true);
        self.is_expired() && under_cap
    }

    /// Spawn the display countdown, publishing the remaining seconds once a
    /// second until zero. Any previous ticker is aborted first.
    pub fn start_countdown_ticker(&mut self) -> watch::Receiver<i64> {
        self.stop_ticker();
        let (tx, rx) = watch::channel(self.remaining_seconds());
        let expires_at = match &self.phase {
            OtpPhase::AwaitingVerification { expires_at, .. } => *expires_at,
            _ => return rx,
        };
        self.ticker = Some(tokio::spawn(async move {
            loop {
                let remaining = (expires_at - Utc::now()).num_seconds().max(0);
                tx.send_replace(remaining);
                if remaining == 0 {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }));
        rx
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for PhoneVerification {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Maximum OTP resends reached, please try again later")]
    ResendLimitReached,

    #[error("OTP has expired, please request a new code")]
    CodeExpired,

    #[error("No OTP request is active")]
    NotRequested,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl OtpError {
    /// Text for the login surface.
    pub fn user_message(&self) -> String {
        match self {
            OtpError::Validation(error) => error.detail().to_string(),
            OtpError::Api(error) => error.user_message("Something went wrong, please try again"),
            other => other.to_string(),
        }
    }
}
