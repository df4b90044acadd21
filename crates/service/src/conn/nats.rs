// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS-backed bus connection.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;

use super::{Conn, ConnError, Msg, Subscription};

/// [`Conn`] implementation over an `async-nats` client.
pub struct NatsConn {
    client: async_nats::Client,
    reconnect_tx: broadcast::Sender<()>,
}

impl NatsConn {
    /// Connect to a NATS server, watching connection events for
    /// reconnects.
    pub async fn connect(url: &str) -> Result<Self, ConnError> {
        let (reconnect_tx, _) = broadcast::channel(8);
        let event_tx = reconnect_tx.clone();
        let client = async_nats::ConnectOptions::new()
            .event_callback(move |event| {
                let event_tx = event_tx.clone();
                async move {
                    if matches!(event, async_nats::Event::Connected) {
                        let _ = event_tx.send(());
                    }
                }
            })
            .connect(url)
            .await
            .map_err(|e| ConnError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            reconnect_tx,
        })
    }

    /// Wrap an already connected client. Reconnect events are not
    /// observable through this constructor.
    pub fn from_client(client: async_nats::Client) -> Self {
        let (reconnect_tx, _) = broadcast::channel(8);
        Self {
            client,
            reconnect_tx,
        }
    }
}

#[async_trait]
impl Conn for NatsConn {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), ConnError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| ConnError::Publish(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, ConnError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| ConnError::Subscribe(e.to_string()))?;
        Ok(Box::new(NatsSubscription { inner: subscriber }))
    }

    fn reconnects(&self) -> broadcast::Receiver<()> {
        self.reconnect_tx.subscribe()
    }
}

struct NatsSubscription {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Option<Msg> {
        self.inner.next().await.map(|msg| Msg {
            subject: msg.subject.to_string(),
            reply: msg.reply.map(|r| r.to_string()),
            payload: msg.payload,
        })
    }

    async fn unsubscribe(&mut self) -> Result<(), ConnError> {
        self.inner
            .unsubscribe()
            .await
            .map_err(|e| ConnError::Subscribe(e.to_string()))
    }
}
