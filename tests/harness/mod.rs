//! Shared helpers for integration tests
//!
//! Provides an in-process signaling hub so two managers can negotiate
//! without a real signaling server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use studyroom_rtc::{Error, PeerSessionManager, Result, SignalingChannel, SignalingMessage};
use tokio::sync::{mpsc, Mutex};

/// Initialize logging for tests
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "studyroom_rtc=debug,webrtc=warn".into()),
            )
            .with_test_writer()
            .init();
    });
}

/// In-process message router between registered participants
///
/// Each participant owns an inbox; `send` from one participant's channel
/// delivers into the addressee's inbox tagged with the sender's id. Delivery
/// preserves per-sender order, like a real relay would.
pub struct SignalingHub {
    inboxes: Mutex<HashMap<String, mpsc::UnboundedSender<(String, SignalingMessage)>>>,
}

impl SignalingHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: Mutex::new(HashMap::new()),
        })
    }

    /// Register a participant; returns their outbound channel and inbox
    pub async fn register(
        self: &Arc<Self>,
        participant_id: &str,
    ) -> (
        Arc<HubChannel>,
        mpsc::UnboundedReceiver<(String, SignalingMessage)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes
            .lock()
            .await
            .insert(participant_id.to_string(), tx);

        let channel = Arc::new(HubChannel {
            hub: Arc::clone(self),
            local_id: participant_id.to_string(),
        });

        (channel, rx)
    }
}

/// One participant's outbound half of the hub
pub struct HubChannel {
    hub: Arc<SignalingHub>,
    local_id: String,
}

#[async_trait]
impl SignalingChannel for HubChannel {
    async fn send(&self, participant_id: &str, message: SignalingMessage) -> Result<()> {
        let inboxes = self.hub.inboxes.lock().await;
        let inbox = inboxes
            .get(participant_id)
            .ok_or_else(|| Error::Signaling(format!("No such participant: {}", participant_id)))?;
        inbox
            .send((self.local_id.clone(), message))
            .map_err(|_| Error::Signaling(format!("Inbox closed: {}", participant_id)))
    }
}

/// Forward a participant's inbox into their manager until the hub drops
pub fn pump_inbox(
    mut inbox: mpsc::UnboundedReceiver<(String, SignalingMessage)>,
    manager: PeerSessionManager,
) {
    tokio::spawn(async move {
        while let Some((from, message)) = inbox.recv().await {
            if let Err(e) = manager.handle_signaling_message(&from, message).await {
                tracing::warn!("Failed to handle message from {}: {}", from, e);
            }
        }
    });
}
