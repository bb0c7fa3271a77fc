//! Real-time fan-out of authentication outcomes.
//!
//! Every live connection belongs to exactly one session; the registry maps a
//! session id to the senders of its current connections. Joining and leaving
//! follow the connection lifecycle, and a broadcast walks whatever members
//! the session has at send time. Outcomes are computed at delivery time so a
//! swapped allow-list is reflected immediately.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::access::AccessGate;

/// Events pushed to connections over the live channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Identity proven and present on the allow-list.
    Authenticated { email: String },
    /// Identity proven but not permitted to use the service.
    AuthorizationWarning { email: String },
    /// Issuance was rejected by the debounce guard.
    Debounced { remaining_ms: i64 },
}

/// Compute the outcome for a proven address against the current allow-list.
///
/// Always evaluated at delivery time, never cached at issuance: the list can
/// change between proving an identity and telling the connections about it.
#[must_use]
pub fn outcome_for(gate: &AccessGate, email: &str) -> ServerEvent {
    if gate.is_authorized(email) {
        ServerEvent::Authenticated {
            email: email.to_string(),
        }
    } else {
        ServerEvent::AuthorizationWarning {
            email: email.to_string(),
        }
    }
}

/// Broadcast groups keyed by session id.
pub struct SessionChannels {
    channels: DashMap<String, HashMap<Uuid, UnboundedSender<ServerEvent>>>,
}

impl SessionChannels {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Add a connection to a session's broadcast group.
    ///
    /// Returns the membership handle to pass back to [`Self::leave`] and the
    /// receiving end the connection task drains.
    #[must_use]
    pub fn join(&self, session_id: &str) -> (Uuid, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        self.channels
            .entry(session_id.to_string())
            .or_default()
            .insert(connection_id, tx);
        (connection_id, rx)
    }

    /// Remove a connection from its session's broadcast group.
    pub fn leave(&self, session_id: &str, connection_id: Uuid) {
        if let Some(mut members) = self.channels.get_mut(session_id) {
            members.remove(&connection_id);
            let emptied = members.is_empty();
            drop(members);
            if emptied {
                self.channels
                    .remove_if(session_id, |_, members| members.is_empty());
            }
        }
    }

    /// Deliver an event to every connection currently joined to a session.
    ///
    /// Returns how many connections accepted the event; members whose
    /// receiving task is gone are skipped.
    pub fn broadcast(&self, session_id: &str, event: &ServerEvent) -> usize {
        match self.channels.get(session_id) {
            Some(members) => members
                .values()
                .filter(|tx| tx.send(event.clone()).is_ok())
                .count(),
            None => 0,
        }
    }

    /// Number of connections currently joined to a session.
    #[must_use]
    pub fn member_count(&self, session_id: &str) -> usize {
        self.channels
            .get(session_id)
            .map_or(0, |members| members.len())
    }
}

impl Default for SessionChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn outcome_reflects_the_list_at_delivery_time() {
        let gate = AccessGate::new();
        assert_eq!(
            outcome_for(&gate, "User@Example.com"),
            ServerEvent::AuthorizationWarning {
                email: "User@Example.com".to_string()
            }
        );

        gate.replace(["user@example.com"]);
        assert_eq!(
            outcome_for(&gate, "User@Example.com"),
            ServerEvent::Authenticated {
                email: "User@Example.com".to_string()
            }
        );
    }

    #[test]
    fn events_serialize_with_a_type_tag() -> Result<()> {
        let event = ServerEvent::Authenticated {
            email: "a@example.com".to_string(),
        };
        let value = serde_json::to_value(&event)?;
        assert_eq!(
            value.get("type").and_then(serde_json::Value::as_str),
            Some("authenticated")
        );

        let event = ServerEvent::Debounced { remaining_ms: 900 };
        let value = serde_json::to_value(&event)?;
        assert_eq!(
            value.get("type").and_then(serde_json::Value::as_str),
            Some("debounced")
        );
        assert_eq!(
            value.get("remaining_ms").and_then(serde_json::Value::as_i64),
            Some(900)
        );
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member_of_the_session() -> Result<()> {
        let channels = SessionChannels::new();
        let (first_id, mut first_rx) = channels.join("s1");
        let (_second_id, mut second_rx) = channels.join("s1");
        let (_other_id, mut other_rx) = channels.join("s2");

        let event = ServerEvent::Authenticated {
            email: "a@example.com".to_string(),
        };
        let delivered = channels.broadcast("s1", &event);
        assert_eq!(delivered, 2);

        assert_eq!(first_rx.recv().await.context("first member")?, event);
        assert_eq!(second_rx.recv().await.context("second member")?, event);
        assert!(other_rx.try_recv().is_err());

        channels.leave("s1", first_id);
        assert_eq!(channels.member_count("s1"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_to_an_empty_session_delivers_nothing() {
        let channels = SessionChannels::new();
        let delivered = channels.broadcast(
            "nobody",
            &ServerEvent::Debounced { remaining_ms: 1 },
        );
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn leaving_the_last_member_drops_the_group() {
        let channels = SessionChannels::new();
        let (connection_id, _rx) = channels.join("s1");
        channels.leave("s1", connection_id);
        assert_eq!(channels.member_count("s1"), 0);
    }

    #[tokio::test]
    async fn dropped_receivers_are_not_counted_as_delivered() {
        let channels = SessionChannels::new();
        let (_id, rx) = channels.join("s1");
        drop(rx);
        let delivered = channels.broadcast(
            "s1",
            &ServerEvent::AuthorizationWarning {
                email: "a@example.com".to_string(),
            },
        );
        assert_eq!(delivered, 0);
    }
}
