//! Push notifications for connected back-office browsers.
//!
//! The [`Hub`] owns the registry of websocket clients. Events are handed to a
//! single listener task through a one-slot channel; the listener turns them
//! into responses and fans them out, dropping any client whose queue is gone.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

pub const ACTION_DELETE_USER: &str = "deleteUser";
pub const ACTION_LOGOUT: &str = "logout";
pub const ACTION_CONNECTED: &str = "connected";

/// Message received from a client or raised by a handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WsPayload {
    pub action: String,
    pub message: String,
    pub username: String,
    pub message_type: String,
    pub user_id: i64,
}

impl WsPayload {
    #[must_use]
    pub fn delete_user(user_id: i64) -> Self {
        Self {
            action: ACTION_DELETE_USER.to_string(),
            user_id,
            ..Self::default()
        }
    }
}

/// Message pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsResponse {
    pub action: String,
    pub message: String,
    pub user_id: i64,
}

impl WsResponse {
    #[must_use]
    pub fn connected() -> Self {
        Self {
            action: ACTION_CONNECTED.to_string(),
            message: "Connected to server!".to_string(),
            user_id: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification listener has stopped")]
    Closed,
}

type Clients = Arc<RwLock<HashMap<Ulid, mpsc::UnboundedSender<WsResponse>>>>;

#[derive(Debug)]
pub struct Hub {
    clients: Clients,
    events: mpsc::Sender<WsPayload>,
}

impl Hub {
    /// Create the hub and start its listener on the current runtime.
    ///
    /// The listener stops once the hub is dropped.
    #[must_use]
    pub fn spawn() -> Arc<Self> {
        let (events, rx) = mpsc::channel(1);
        let clients = Clients::default();
        tokio::spawn(listen(rx, clients.clone()));
        Arc::new(Self { clients, events })
    }

    /// Add a client; responses for it arrive on the returned receiver.
    pub async fn register(&self) -> (Ulid, mpsc::UnboundedReceiver<WsResponse>) {
        let id = Ulid::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().await.insert(id, tx);
        debug!(client = %id, "websocket client registered");
        (id, rx)
    }

    pub async fn unregister(&self, id: Ulid) {
        if self.clients.write().await.remove(&id).is_some() {
            debug!(client = %id, "websocket client removed");
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Queue `payload` for the listener.
    ///
    /// # Errors
    /// Returns `NotifyError::Closed` if the listener is gone.
    pub async fn publish(&self, payload: WsPayload) -> Result<(), NotifyError> {
        self.events
            .send(payload)
            .await
            .map_err(|_| NotifyError::Closed)
    }
}

async fn listen(mut rx: mpsc::Receiver<WsPayload>, clients: Clients) {
    while let Some(payload) = rx.recv().await {
        match payload.action.as_str() {
            ACTION_DELETE_USER => {
                let response = WsResponse {
                    action: ACTION_LOGOUT.to_string(),
                    message: "Your account has been deleted".to_string(),
                    user_id: payload.user_id,
                };
                broadcast(&clients, &response).await;
            }
            other => debug!(action = other, "ignoring websocket action"),
        }
    }
    debug!("notification listener stopped");
}

async fn broadcast(clients: &Clients, response: &WsResponse) {
    clients.write().await.retain(|id, tx| {
        if tx.send(response.clone()).is_ok() {
            true
        } else {
            info!(client = %id, "dropping websocket client");
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn delete_user_broadcasts_logout() -> anyhow::Result<()> {
        let hub = Hub::spawn();
        let (_, mut first) = hub.register().await;
        let (_, mut second) = hub.register().await;

        hub.publish(WsPayload::delete_user(42)).await?;

        for rx in [&mut first, &mut second] {
            let response = timeout(Duration::from_secs(1), rx.recv())
                .await?
                .ok_or_else(|| anyhow::anyhow!("channel closed"))?;
            assert_eq!(response.action, "logout");
            assert_eq!(response.message, "Your account has been deleted");
            assert_eq!(response.user_id, 42);
        }
        Ok(())
    }

    #[tokio::test]
    async fn gone_clients_are_dropped_on_broadcast() -> anyhow::Result<()> {
        let hub = Hub::spawn();
        let (_, rx) = hub.register().await;
        let (_, mut alive) = hub.register().await;
        drop(rx);
        assert_eq!(hub.client_count().await, 2);

        hub.publish(WsPayload::delete_user(1)).await?;
        timeout(Duration::from_secs(1), alive.recv()).await?;

        assert_eq!(hub.client_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_actions_are_ignored() -> anyhow::Result<()> {
        let hub = Hub::spawn();
        let (_, mut rx) = hub.register().await;
        hub.publish(WsPayload {
            action: "broadcast".into(),
            ..WsPayload::default()
        })
        .await?;
        hub.publish(WsPayload::delete_user(3)).await?;

        let response = timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("channel closed"))?;
        assert_eq!(response.user_id, 3);
        Ok(())
    }

    #[tokio::test]
    async fn unregister_removes_client() {
        let hub = Hub::spawn();
        let (id, _rx) = hub.register().await;
        hub.unregister(id).await;
        assert_eq!(hub.client_count().await, 0);
    }

    #[test]
    fn payload_fields_default() -> serde_json::Result<()> {
        let payload: WsPayload = serde_json::from_str(r#"{"action":"deleteUser","user_id":5}"#)?;
        assert_eq!(payload.action, ACTION_DELETE_USER);
        assert_eq!(payload.user_id, 5);
        assert!(payload.username.is_empty());
        Ok(())
    }
}
