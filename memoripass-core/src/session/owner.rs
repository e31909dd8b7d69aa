//! The task that owns session state.
//!
//! All transitions and the autolock deadline live here. Commands arrive over
//! one channel and the timer is polled in the same `select!`, so a disarm
//! and an expiry can never race.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::audit::AuditEvent;

/// Lock state of the vault session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocked {
        /// Monotonic time of the last recorded user activity.
        last_activity: Instant,
    },
}

impl SessionState {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, Self::Unlocked { .. })
    }
}

/// State as last published by the owner task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// When the armed autolock fires, if armed.
    pub autolock_deadline: Option<Instant>,
}

impl SessionSnapshot {
    pub(crate) fn locked() -> Self {
        Self {
            state: SessionState::Locked,
            autolock_deadline: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.is_unlocked()
    }

    pub fn autolock_armed(&self) -> bool {
        self.autolock_deadline.is_some()
    }
}

/// Why the session was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    /// User or lifecycle asked for it.
    Explicit,
    /// The autolock window elapsed.
    Inactivity,
    /// The guard was shut down or dropped.
    Teardown,
}

/// Transition notifications for UI and audit collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Unlocked { at: DateTime<Utc> },
    Locked { reason: LockReason, at: DateTime<Utc> },
}

impl SessionEvent {
    pub fn audit_event(&self) -> AuditEvent {
        match self {
            Self::Unlocked { .. } => AuditEvent::AuthSuccess,
            Self::Locked {
                reason: LockReason::Inactivity,
                ..
            } => AuditEvent::SessionAutolocked,
            Self::Locked { .. } => AuditEvent::SessionLocked,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Unlock,
    Lock,
    ArmAutolock,
    DisarmAutolock,
    RecordActivity,
    Snapshot,
    Shutdown,
}

pub(crate) struct Command {
    pub op: Op,
    pub reply: oneshot::Sender<SessionSnapshot>,
}

pub(crate) struct SessionOwner {
    state: SessionState,
    deadline: Option<Instant>,
    autolock_delay: Duration,
    published: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionOwner {
    pub fn new(
        autolock_delay: Duration,
        published: watch::Sender<SessionSnapshot>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: SessionState::Locked,
            deadline: None,
            autolock_delay,
            published,
            events,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                // Expiry first: once the deadline has passed the lock wins
                biased;
                _ = wait_for(deadline) => self.expire(),
                command = commands.recv() => match command {
                    Some(Command { op: Op::Shutdown, reply }) => {
                        self.lock(LockReason::Teardown);
                        let _ = reply.send(self.snapshot());
                        break;
                    }
                    Some(Command { op, reply }) => {
                        self.apply(op);
                        let _ = reply.send(self.snapshot());
                    }
                    None => {
                        self.lock(LockReason::Teardown);
                        break;
                    }
                },
            }
        }
        debug!("Session owner stopped");
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            autolock_deadline: self.deadline,
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Unlock => self.unlock(),
            Op::Lock => self.lock(LockReason::Explicit),
            Op::ArmAutolock => self.arm(),
            Op::DisarmAutolock => self.disarm(),
            Op::RecordActivity => self.record_activity(),
            Op::Snapshot | Op::Shutdown => {}
        }
    }

    fn unlock(&mut self) {
        let was_locked = !self.state.is_unlocked();
        self.state = SessionState::Unlocked {
            last_activity: Instant::now(),
        };
        self.deadline = None;
        self.publish();
        if was_locked {
            info!("Session unlocked");
            self.emit(SessionEvent::Unlocked { at: Utc::now() });
        }
    }

    fn lock(&mut self, reason: LockReason) {
        let was_unlocked = self.state.is_unlocked();
        self.state = SessionState::Locked;
        self.deadline = None;
        self.publish();
        if was_unlocked {
            info!("Session locked ({:?})", reason);
            self.emit(SessionEvent::Locked {
                reason,
                at: Utc::now(),
            });
        }
    }

    fn arm(&mut self) {
        if !self.state.is_unlocked() {
            debug!("Autolock not armed: session is locked");
            return;
        }
        // Re-arming restarts the window rather than stacking timers
        match self.deadline_from(Instant::now()) {
            Some(deadline) => {
                self.deadline = Some(deadline);
                debug!("Autolock armed ({}s)", self.autolock_delay.as_secs());
                self.publish();
            }
            None => self.lock_unrepresentable(),
        }
    }

    fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Autolock disarmed");
            self.publish();
        }
    }

    fn record_activity(&mut self) {
        if let SessionState::Unlocked { last_activity } = &mut self.state {
            let now = Instant::now();
            *last_activity = now;
            if self.deadline.is_some() {
                match self.deadline_from(now) {
                    Some(deadline) => self.deadline = Some(deadline),
                    None => return self.lock_unrepresentable(),
                }
            }
            self.publish();
        }
    }

    fn deadline_from(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.autolock_delay)
    }

    /// The autolock window runs past what the clock can represent. An unlocked
    /// session without a reachable deadline would never lock, so lock now.
    fn lock_unrepresentable(&mut self) {
        warn!(
            "Autolock window of {}s is out of range, locking",
            self.autolock_delay.as_secs()
        );
        self.lock(LockReason::Inactivity);
    }

    fn expire(&mut self) {
        info!("Autolock window elapsed");
        self.lock(LockReason::Inactivity);
    }
}

impl Drop for SessionOwner {
    fn drop(&mut self) {
        // Runs on every exit of the task, panics and aborts included, so
        // readers of the watch never see a stale unlocked state.
        if self.state.is_unlocked() {
            self.state = SessionState::Locked;
            self.emit(SessionEvent::Locked {
                reason: LockReason::Teardown,
                at: Utc::now(),
            });
        }
        self.deadline = None;
        self.published.send_replace(SessionSnapshot::locked());
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
