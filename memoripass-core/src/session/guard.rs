//! SessionGuard - gates vault access behind user authentication.
//!
//! The guard is a cheap front for the owner task: state reads go through a
//! `watch` channel, transitions through the owner's command queue. Only one
//! authentication prompt may be open at a time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::auth::{AuthOutcome, Authenticator, Authenticators, PromptInfo};
use super::error::{SessionError, SessionResult};
use super::owner::{Command, Op, SessionEvent, SessionOwner, SessionSnapshot};

/// Default autolock window
pub const DEFAULT_AUTOLOCK_SECS: u64 = 30;

/// Longest autolock window a config may ask for (one day)
pub const MAX_AUTOLOCK_SECS: u64 = 24 * 60 * 60;

const COMMAND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 32;

/// Options for a [`SessionGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub autolock_delay: Duration,
    pub allowed: Authenticators,
    pub prompt: PromptInfo,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autolock_delay: Duration::from_secs(DEFAULT_AUTOLOCK_SECS),
            allowed: Authenticators::STRONG_OR_CREDENTIAL,
            prompt: PromptInfo::default(),
        }
    }
}

#[derive(Default)]
struct PromptSlot {
    next_id: u64,
    /// Id of the request holding the slot, until its prompt future is dropped.
    active: Option<u64>,
    /// Fires the holder's cancellation. Taken by the first cancel.
    cancel: Option<oneshot::Sender<()>>,
}

/// Releases the prompt slot when the request finishes or is dropped.
struct PromptClaim {
    slot: Arc<Mutex<PromptSlot>>,
    id: u64,
}

impl Drop for PromptClaim {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.active == Some(self.id) {
            slot.active = None;
            slot.cancel = None;
        }
    }
}

/// Session state holder for the vault.
///
/// Starts locked. Must be created from within a Tokio runtime. Dropping the
/// guard locks the session and stops its owner task.
pub struct SessionGuard {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    authenticator: Arc<dyn Authenticator>,
    options: SessionOptions,
    prompt: Arc<Mutex<PromptSlot>>,
    owner: JoinHandle<()>,
}

impl SessionGuard {
    pub fn new(authenticator: Arc<dyn Authenticator>, options: SessionOptions) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
        let (published, state) = watch::channel(SessionSnapshot::locked());
        let (events, _) = broadcast::channel(EVENT_QUEUE);

        let owner = SessionOwner::new(options.autolock_delay, published, events.clone());
        let owner = tokio::spawn(owner.run(receiver));

        Self {
            commands,
            state,
            events,
            authenticator,
            options,
            prompt: Arc::new(Mutex::new(PromptSlot::default())),
            owner,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Whether the session is unlocked right now. Never blocks.
    ///
    /// False once the owner task has gone away, whatever it last published.
    pub fn is_authenticated(&self) -> bool {
        self.state.has_changed().is_ok() && self.state.borrow().is_unlocked()
    }

    /// Whether an authentication prompt is currently open.
    pub fn prompt_in_flight(&self) -> bool {
        self.prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .is_some()
    }

    /// Show the platform prompt and unlock on success.
    ///
    /// Fails fast with `AuthenticatorUnavailable` when the device cannot
    /// authenticate, and with `PromptInFlight` while another prompt is open.
    /// All four user-facing outcomes are returned as `Ok`.
    pub async fn request_authentication(&self) -> SessionResult<AuthOutcome> {
        let status = self.authenticator.status(self.options.allowed);
        if !status.is_available() {
            warn!("Authentication unavailable: {}", status);
            return Err(SessionError::AuthenticatorUnavailable(status));
        }

        let (claim, cancelled) = self.claim_prompt()?;
        debug!("Showing authentication prompt");

        let outcome = tokio::select! {
            outcome = self.authenticator.authenticate(&self.options.prompt, self.options.allowed) => outcome,
            _ = cancelled => AuthOutcome::Cancelled,
        };
        drop(claim);

        match &outcome {
            AuthOutcome::Success => {
                info!("Authentication succeeded");
                self.send(Op::Unlock).await?;
            }
            AuthOutcome::Failed => warn!("Authentication failed"),
            AuthOutcome::Cancelled => info!("Authentication cancelled"),
            AuthOutcome::Error(reason) => error!("Authentication error: {}", reason),
        }
        Ok(outcome)
    }

    /// Dismiss the open prompt, if any. The pending request resolves to
    /// `Cancelled` and the session stays as it was.
    ///
    /// The slot stays claimed until the dismissed prompt has actually been
    /// torn down, so a new request made right after this still gets
    /// `PromptInFlight`.
    pub fn cancel_authentication(&self) -> bool {
        let cancel = self
            .prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel
            .take();
        match cancel {
            Some(cancel) => {
                let _ = cancel.send(());
                debug!("Authentication prompt cancelled");
                true
            }
            None => false,
        }
    }

    fn claim_prompt(&self) -> SessionResult<(PromptClaim, oneshot::Receiver<()>)> {
        let mut slot = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.active.is_some() {
            warn!("Authentication already in progress");
            return Err(SessionError::PromptInFlight);
        }
        let (cancel, cancelled) = oneshot::channel();
        let id = slot.next_id;
        slot.next_id = slot.next_id.wrapping_add(1);
        slot.active = Some(id);
        slot.cancel = Some(cancel);
        Ok((
            PromptClaim {
                slot: Arc::clone(&self.prompt),
                id,
            },
            cancelled,
        ))
    }

    /// Lock immediately. Idempotent; also disarms a pending autolock.
    pub async fn lock(&self) -> SessionResult<()> {
        self.send(Op::Lock).await.map(|_| ())
    }

    /// Start (or restart) the autolock window. No-op while locked.
    pub async fn arm_autolock(&self) -> SessionResult<()> {
        self.send(Op::ArmAutolock).await.map(|_| ())
    }

    /// Cancel a pending autolock. No-op when none is armed.
    pub async fn disarm_autolock(&self) -> SessionResult<()> {
        self.send(Op::DisarmAutolock).await.map(|_| ())
    }

    /// Note user activity. Pushes an armed autolock out by a full window.
    pub async fn record_activity(&self) -> SessionResult<()> {
        self.send(Op::RecordActivity).await.map(|_| ())
    }

    /// The app went to the background.
    pub async fn on_background(&self) -> SessionResult<()> {
        if self.is_authenticated() {
            self.arm_autolock().await?;
        }
        Ok(())
    }

    /// The app came back. Returns whether the session is still unlocked;
    /// when it is not, the caller should request authentication.
    pub async fn on_foreground(&self) -> SessionResult<bool> {
        let snapshot = self.send(Op::DisarmAutolock).await?;
        Ok(snapshot.is_unlocked())
    }

    /// Receive transition events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current state, after every queued command has been applied.
    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        self.send(Op::Snapshot).await
    }

    /// Lock, dismiss any open prompt and wait for the owner task to stop.
    pub async fn shutdown(mut self) {
        self.cancel_authentication();
        if self.send(Op::Shutdown).await.is_ok() {
            let _ = (&mut self.owner).await;
        }
        debug!("Session guard shut down");
    }

    /// Kill the owner task without letting it run its shutdown path.
    #[cfg(test)]
    pub(crate) fn abort_owner(&self) {
        self.owner.abort();
    }

    async fn send(&self, op: Op) -> SessionResult<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { op, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("authenticated", &self.is_authenticated())
            .field("prompt_in_flight", &self.prompt_in_flight())
            .field("options", &self.options)
            .finish()
    }
}
