use raillink_core::session::{Identity, SelectedTrain, SessionContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

/// Login gate states broadcast to flows waiting on authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSignal {
    Pending,
    Authenticated,
    Dismissed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthWaitError {
    #[error("Login wait timed out")]
    TimedOut,

    #[error("Login prompt was dismissed")]
    Dismissed,
}

/// Cloneable handle on the passenger's session.
///
/// Wraps the typed context in a single lock and carries the login gate: a
/// watch channel flows can wait on with a deadline instead of polling.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionContext>>,
    login_tx: Arc<watch::Sender<LoginSignal>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        let (login_tx, _) = watch::channel(LoginSignal::Pending);
        Self {
            inner: Arc::new(RwLock::new(SessionContext::new())),
            login_tx: Arc::new(login_tx),
        }
    }

    pub async fn snapshot(&self) -> SessionContext {
        self.inner.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_authenticated()
    }

    /// Store the verified identity, then open the login gate.
    pub async fn complete_login(&self, identity: Identity) {
        {
            let mut session = self.inner.write().await;
            session.identity = Some(identity);
        }
        self.login_tx.send_replace(LoginSignal::Authenticated);
    }

    /// Attach an email-based login (the account surface path).
    pub async fn attach_email(&self, email: &str) {
        {
            let mut session = self.inner.write().await;
            session.email = Some(email.to_string());
        }
        self.login_tx.send_replace(LoginSignal::Authenticated);
    }

    /// The login prompt was closed without authenticating; anyone waiting
    /// on the gate gets a cancellation instead of running out the clock.
    pub fn dismiss_login(&self) {
        self.login_tx.send_replace(LoginSignal::Dismissed);
    }

    pub async fn set_selected_train(&self, train: SelectedTrain) {
        self.inner.write().await.selected_train = Some(train);
    }

    pub async fn selected_train(&self) -> Option<SelectedTrain> {
        self.inner.read().await.selected_train.clone()
    }

    pub async fn set_booking_id(&self, booking_id: i64) {
        self.inner.write().await.booking_id = Some(booking_id);
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Wait until the session authenticates, bounded by `timeout`.
    ///
    /// The gate is reset to `Pending` first so an earlier dismissal does not
    /// leak into this wait. An identity stored just before the reset is
    /// still caught by the re-check after subscribing.
    pub async fn wait_for_login(&self, timeout: Duration) -> Result<(), AuthWaitError> {
        if self.is_authenticated().await {
            return Ok(());
        }
        self.login_tx.send_replace(LoginSignal::Pending);
        let mut gate = self.login_tx.subscribe();
        if self.is_authenticated().await {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            match *gate.borrow_and_update() {
                LoginSignal::Authenticated => return Ok(()),
                LoginSignal::Dismissed => return Err(AuthWaitError::Dismissed),
                LoginSignal::Pending => {}
            }
            match tokio::time::timeout_at(deadline, gate.changed()).await {
                Err(_) => return Err(AuthWaitError::TimedOut),
                Ok(Err(_)) => return Err(AuthWaitError::Dismissed),
                Ok(Ok(())) => {}
            }
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}
