use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::{
    election::{CoordinatorError, Election},
    protocol::ServerLine,
};

pub type SessionId = u64;

/// Sending half of a session's bounded outbound queue.
pub type Outbox = mpsc::Sender<String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),
}

/// A message produced by the router, addressed to one session or to everyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Unicast { to: SessionId, line: ServerLine },
    Broadcast { line: ServerLine },
}

/// Point-in-time copy of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub username: Option<String>,
    pub is_coordinator: bool,
}

/// Result of a successful coordinator hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub previous: Option<SessionId>,
    pub username: Option<String>,
}

/// Shared table of live sessions plus the coordinator state.
///
/// Every operation takes the same lock, so a coordinator change is observed either fully
/// applied or not at all.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    sessions: BTreeMap<SessionId, SessionEntry>,
    election: Election,
}

struct SessionEntry {
    username: Option<String>,
    is_coordinator: bool,
    outbox: Outbox,
}

impl SessionEntry {
    fn snapshot(&self, id: SessionId) -> SessionSnapshot {
        SessionSnapshot {
            id,
            username: self.username.clone(),
            is_coordinator: self.is_coordinator,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: BTreeMap::new(),
                election: Election::new(),
            }),
        }
    }

    /// Inserts a session. The very first session ever registered is promoted to coordinator
    /// and told so through its outbox.
    pub async fn register(&self, id: SessionId, outbox: Outbox) -> Result<SessionId, RegistryError> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }

        let is_coordinator = inner.election.on_register(id);
        if is_coordinator {
            push(id, &outbox, ServerLine::Promoted.to_string());
        }
        inner.sessions.insert(
            id,
            SessionEntry {
                username: None,
                is_coordinator,
                outbox,
            },
        );
        Ok(id)
    }

    /// Removes a session and drops its outbox. Removing an absent id does nothing.
    pub async fn unregister(&self, id: SessionId) -> Option<SessionSnapshot> {
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.remove(&id)?;
        inner.election.on_unregister(id);
        Some(entry.snapshot(id))
    }

    pub async fn lookup(&self, id: SessionId) -> Option<SessionSnapshot> {
        let inner = self.inner.lock().await;
        inner.sessions.get(&id).map(|entry| entry.snapshot(id))
    }

    /// Snapshot of `(id, username)` for every registered session, ordered by id.
    pub async fn list_members(&self) -> Vec<(SessionId, Option<String>)> {
        let inner = self.inner.lock().await;
        inner
            .sessions
            .iter()
            .map(|(id, entry)| (*id, entry.username.clone()))
            .collect()
    }

    /// Returns `false` when the session is no longer registered.
    pub async fn set_username(&self, id: SessionId, username: String) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get_mut(&id) {
            Some(entry) => {
                entry.username = Some(username);
                true
            }
            None => false,
        }
    }

    pub async fn coordinator(&self) -> Option<SessionId> {
        self.inner.lock().await.election.coordinator()
    }

    /// Demotes the current coordinator (when still registered) and promotes `id` in one step.
    pub async fn set_coordinator(&self, id: SessionId) -> Result<Handoff, CoordinatorError> {
        let mut inner = self.inner.lock().await;
        let RegistryInner { sessions, election } = &mut *inner;

        let previous = election.hand_off(id, sessions.contains_key(&id))?;
        if let Some(previous_entry) = previous.and_then(|prev| sessions.get_mut(&prev)) {
            previous_entry.is_coordinator = false;
        }

        let entry = sessions
            .get_mut(&id)
            .ok_or(CoordinatorError::UnknownSession(id))?;
        entry.is_coordinator = true;
        push(id, &entry.outbox, ServerLine::Promoted.to_string());

        Ok(Handoff {
            previous,
            username: entry.username.clone(),
        })
    }

    /// Delivers a routed message. Recipients are copied out of the table first so delivery
    /// never runs under the lock, and a full or closed queue only skips that recipient.
    pub async fn deliver(&self, outbound: Outbound) {
        match outbound {
            Outbound::Unicast { to, line } => {
                let outbox = {
                    let inner = self.inner.lock().await;
                    inner.sessions.get(&to).map(|entry| entry.outbox.clone())
                };
                match outbox {
                    Some(outbox) => push(to, &outbox, line.to_string()),
                    None => debug!(session = to, "dropping message for departed session"),
                }
            }
            Outbound::Broadcast { line } => {
                let recipients: Vec<(SessionId, Outbox)> = {
                    let inner = self.inner.lock().await;
                    inner
                        .sessions
                        .iter()
                        .map(|(id, entry)| (*id, entry.outbox.clone()))
                        .collect()
                };
                let line = line.to_string();
                for (id, outbox) in &recipients {
                    push(*id, outbox, line.clone());
                }
            }
        }
    }
}

fn push(id: SessionId, outbox: &Outbox, line: String) {
    match outbox.try_send(line) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(session = id, "outbound queue full; skipping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(session = id, "outbound queue closed; skipping message");
        }
    }
}
