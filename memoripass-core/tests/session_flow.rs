use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memoripass_core::session::{
    AuthOutcome, AuthStatus, Authenticator, Authenticators, LockReason, PromptInfo, SessionError,
    SessionEvent, SessionGuard, SessionOptions,
};
use memoripass_core::{CoreError, MemoryStore, VaultConfig, VaultCore};
use tokio::sync::Notify;
use tokio::time::advance;

/// Replays scripted outcomes, optionally holding each prompt open until released.
struct ScriptedAuthenticator {
    status: Mutex<AuthStatus>,
    outcomes: Mutex<VecDeque<AuthOutcome>>,
    prompts: AtomicUsize,
    gate: Option<Notify>,
}

impl ScriptedAuthenticator {
    fn new(outcomes: impl IntoIterator<Item = AuthOutcome>) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(AuthStatus::Available),
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            prompts: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn gated(outcomes: impl IntoIterator<Item = AuthOutcome>) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(AuthStatus::Available),
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            prompts: AtomicUsize::new(0),
            gate: Some(Notify::new()),
        })
    }

    fn set_status(&self, status: AuthStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    fn status(&self, _allowed: Authenticators) -> AuthStatus {
        *self.status.lock().unwrap()
    }

    async fn authenticate(&self, _prompt: &PromptInfo, _allowed: Authenticators) -> AuthOutcome {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AuthOutcome::Success)
    }
}

async fn wait_for_prompt(guard: &SessionGuard) {
    while !guard.prompt_in_flight() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn retry_after_failed_sample_then_unlock() {
    let authenticator = ScriptedAuthenticator::new([AuthOutcome::Failed, AuthOutcome::Success]);
    let guard = SessionGuard::new(authenticator.clone(), SessionOptions::default());

    let first = guard.request_authentication().await.unwrap();
    assert!(first.is_retryable());
    assert!(!guard.is_authenticated());

    let second = guard.request_authentication().await.unwrap();
    assert_eq!(second, AuthOutcome::Success);
    assert!(guard.is_authenticated());
    assert_eq!(authenticator.prompts(), 2);
}

#[tokio::test]
async fn unavailable_authenticator_never_prompts() {
    for status in [
        AuthStatus::NoHardware,
        AuthStatus::HardwareUnavailable,
        AuthStatus::NoneEnrolled,
        AuthStatus::SecurityUpdateRequired,
        AuthStatus::Unsupported,
        AuthStatus::Unknown,
    ] {
        let authenticator = ScriptedAuthenticator::new([]);
        authenticator.set_status(status);
        let guard = SessionGuard::new(authenticator.clone(), SessionOptions::default());

        assert_eq!(
            guard.request_authentication().await.unwrap_err(),
            SessionError::AuthenticatorUnavailable(status)
        );
        assert_eq!(authenticator.prompts(), 0);
        assert!(!guard.is_authenticated());
    }
}

#[tokio::test]
async fn only_one_prompt_at_a_time() {
    let authenticator = ScriptedAuthenticator::gated([AuthOutcome::Success]);
    let guard = Arc::new(SessionGuard::new(
        authenticator.clone(),
        SessionOptions::default(),
    ));

    let first = {
        let guard = Arc::clone(&guard);
        tokio::spawn(async move { guard.request_authentication().await })
    };
    wait_for_prompt(&guard).await;

    assert_eq!(
        guard.request_authentication().await.unwrap_err(),
        SessionError::PromptInFlight
    );
    assert_eq!(authenticator.prompts(), 1);

    authenticator.release();
    assert_eq!(first.await.unwrap().unwrap(), AuthOutcome::Success);
    assert!(guard.is_authenticated());
    assert!(!guard.prompt_in_flight());
}

#[tokio::test]
async fn cancellation_resolves_cancelled_and_stays_locked() {
    let authenticator = ScriptedAuthenticator::gated([AuthOutcome::Success]);
    let guard = Arc::new(SessionGuard::new(
        authenticator.clone(),
        SessionOptions::default(),
    ));

    let pending = {
        let guard = Arc::clone(&guard);
        tokio::spawn(async move { guard.request_authentication().await })
    };
    wait_for_prompt(&guard).await;

    assert!(guard.cancel_authentication());
    assert_eq!(pending.await.unwrap().unwrap(), AuthOutcome::Cancelled);
    assert!(!guard.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn background_autolock_cycle() {
    let authenticator = ScriptedAuthenticator::new([]);
    let guard = SessionGuard::new(authenticator, SessionOptions::default());
    let mut events = guard.subscribe();

    guard.request_authentication().await.unwrap();
    guard.on_background().await.unwrap();
    advance(Duration::from_secs(29)).await;
    assert!(guard.on_foreground().await.unwrap());

    guard.on_background().await.unwrap();
    advance(Duration::from_secs(30)).await;
    assert!(!guard.on_foreground().await.unwrap());
    assert!(!guard.is_authenticated());

    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Unlocked { .. }));
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Locked {
            reason: LockReason::Inactivity,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn configured_autolock_window() {
    let mut config = VaultConfig::default();
    config.session.autolock_secs = 300;
    let core = VaultCore::new(
        MemoryStore::new(),
        ScriptedAuthenticator::new([]),
        &config,
    )
    .unwrap();

    core.unlock().await.unwrap();
    core.session().arm_autolock().await.unwrap();
    advance(Duration::from_secs(299)).await;
    assert!(core.session().snapshot().await.unwrap().is_unlocked());
    advance(Duration::from_secs(1)).await;
    assert!(!core.session().snapshot().await.unwrap().is_unlocked());
}

#[tokio::test]
async fn vault_entries_follow_session_state() {
    let core = VaultCore::new(
        MemoryStore::new(),
        ScriptedAuthenticator::new([AuthOutcome::Cancelled, AuthOutcome::Success]),
        &VaultConfig::default(),
    )
    .unwrap();

    assert_eq!(core.unlock().await.unwrap(), AuthOutcome::Cancelled);
    assert!(matches!(core.seal_entry("pin"), Err(CoreError::Locked)));

    assert_eq!(core.unlock().await.unwrap(), AuthOutcome::Success);
    let envelope = core.seal_entry("pin").unwrap();
    assert_eq!(core.open_entry(&envelope).unwrap().as_str(), "pin");

    core.shutdown().await;
}
