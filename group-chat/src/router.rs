use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info};

use crate::{
    command::Command,
    election::CoordinatorError,
    protocol::{ProtocolError, ServerLine},
    registry::{Outbound, Registry, SessionId},
};

/// Display name used for sessions that never sent `JOIN`.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Executes parsed commands against the registry.
///
/// The router keeps no state of its own; every lookup goes through the registry by id, so a
/// session that disconnects mid-command is simply not found.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Routes `command` and delivers whatever it produced.
    pub async fn dispatch(&self, sender: SessionId, command: Command) {
        for outbound in self.route(sender, command).await {
            self.registry.deliver(outbound).await;
        }
    }

    /// Applies `command` to the registry and returns the messages it produces, undelivered.
    pub async fn route(&self, sender: SessionId, command: Command) -> Vec<Outbound> {
        match command {
            Command::Join { username } => self.join(sender, username).await,
            Command::Msg { text } | Command::Broadcast { text } => self.chat(sender, text).await,
            Command::PrivateMsg { raw_args } => self.private_message(sender, &raw_args).await,
            Command::RequestMembers => self.members(sender).await,
            Command::SetCoordinator { raw_id } => self.set_coordinator(sender, &raw_id).await,
            // Leave is handled by the session loop; INFO is accepted and ignored.
            Command::Leave | Command::Info => Vec::new(),
        }
    }

    async fn join(&self, sender: SessionId, username: String) -> Vec<Outbound> {
        if !self.registry.set_username(sender, username.clone()).await {
            return Vec::new();
        }
        info!(session = sender, %username, "session joined");
        vec![Outbound::Unicast {
            to: sender,
            line: ServerLine::Welcome { username },
        }]
    }

    async fn chat(&self, sender: SessionId, text: String) -> Vec<Outbound> {
        let sender = self.display_name(sender).await;
        vec![Outbound::Broadcast {
            line: ServerLine::Chat {
                timestamp: timestamp(),
                sender,
                text,
            },
        }]
    }

    async fn private_message(&self, sender: SessionId, raw_args: &str) -> Vec<Outbound> {
        let Some((target, text)) = raw_args.split_once(char::is_whitespace) else {
            return reply(sender, ProtocolError::InvalidPrivateFormat);
        };
        let Ok(target) = target.parse::<SessionId>() else {
            return reply(sender, ProtocolError::InvalidRecipient);
        };
        if self.registry.lookup(target).await.is_none() {
            return reply(sender, ProtocolError::RecipientNotFound);
        }

        vec![Outbound::Unicast {
            to: target,
            line: ServerLine::Private {
                sender: self.display_name(sender).await,
                text: text.to_string(),
            },
        }]
    }

    async fn members(&self, sender: SessionId) -> Vec<Outbound> {
        let members = self
            .registry
            .list_members()
            .await
            .into_iter()
            .map(|(id, username)| (id, username.unwrap_or_else(|| UNKNOWN_SENDER.to_string())))
            .collect();
        vec![Outbound::Unicast {
            to: sender,
            line: ServerLine::Members(members),
        }]
    }

    async fn set_coordinator(&self, sender: SessionId, raw_id: &str) -> Vec<Outbound> {
        let Ok(target) = raw_id.trim().parse::<SessionId>() else {
            return reply(sender, ProtocolError::InvalidCoordinatorId);
        };

        match self.registry.set_coordinator(target).await {
            Ok(handoff) => {
                info!(
                    requested_by = sender,
                    previous = ?handoff.previous,
                    coordinator = target,
                    "coordinator changed"
                );
                let username = handoff
                    .username
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
                vec![Outbound::Broadcast {
                    line: ServerLine::NewCoordinator { username },
                }]
            }
            Err(CoordinatorError::UnknownSession(_)) => {
                reply(sender, ProtocolError::UnknownCoordinatorTarget)
            }
            Err(CoordinatorError::NoOp(_)) => {
                debug!(session = sender, target, "coordinator unchanged");
                reply(sender, ProtocolError::AlreadyCoordinator)
            }
        }
    }

    async fn display_name(&self, id: SessionId) -> String {
        self.registry
            .lookup(id)
            .await
            .and_then(|session| session.username)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }
}

fn reply(to: SessionId, error: ProtocolError) -> Vec<Outbound> {
    vec![Outbound::Unicast {
        to,
        line: ServerLine::Error(error),
    }]
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
