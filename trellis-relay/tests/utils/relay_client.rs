use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use trellis_core::{ParticipantId, SignalEnvelope, SignalKind, SignalPayload};

/// Timeout for a single expected frame (ms).
pub const FRAME_TIMEOUT_MS: u64 = 5000;

/// Short timeout used to assert that no frame arrives (ms).
pub const SILENCE_TIMEOUT_MS: u64 = 300;

/// One WebSocket participant talking to a relay under test.
pub struct RelayClient {
    pub id: ParticipantId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    /// Connects to the relay and registers under `id`.
    pub async fn register(addr: SocketAddr, id: impl Into<ParticipantId>) -> Result<Self> {
        let id = id.into();
        let (stream, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .context("Failed to connect to relay")?;

        let mut client = Self {
            id: id.clone(),
            stream,
        };
        client.send_envelope(&SignalEnvelope::register(id)).await?;

        Ok(client)
    }

    pub async fn send_envelope(&mut self, envelope: &SignalEnvelope) -> Result<()> {
        let json = serde_json::to_string(envelope).context("Failed to serialize envelope")?;
        self.send_text(json).await
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream
            .send(Message::text(text.into()))
            .await
            .context("Failed to send frame")?;
        Ok(())
    }

    /// Next text frame from the relay, or an error after `timeout_ms`.
    pub async fn next_text(&mut self, timeout_ms: u64) -> Result<String> {
        let per_frame = Duration::from_millis(timeout_ms);

        loop {
            let msg = tokio::time::timeout(per_frame, self.stream.next())
                .await
                .context("Timeout waiting for frame")?;

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!("WebSocket error: {e}"),
                None => bail!("Connection closed by relay"),
            }
        }
    }

    pub async fn next_envelope(&mut self, timeout_ms: u64) -> Result<SignalEnvelope> {
        let text = self.next_text(timeout_ms).await?;
        serde_json::from_str(&text).context("Failed to parse envelope")
    }

    /// Reads frames until a participant-list broadcast matches `expected`.
    /// Earlier, smaller rosters are skipped.
    pub async fn wait_for_roster(&mut self, expected: &[&str]) -> Result<()> {
        let expected: Vec<ParticipantId> =
            expected.iter().map(|id| ParticipantId::from(*id)).collect();
        let start = Instant::now();

        loop {
            let envelope = self.next_envelope(FRAME_TIMEOUT_MS).await?;

            if envelope.kind == SignalKind::ParticipantList {
                if let Ok(SignalPayload::ParticipantList(ids)) = envelope.decode_payload() {
                    if ids == expected {
                        return Ok(());
                    }
                    tracing::debug!("[RelayClient] Skipping roster {:?}", ids);
                }
            }

            if start.elapsed() > Duration::from_millis(FRAME_TIMEOUT_MS) {
                bail!("Timeout waiting for roster {:?}", expected);
            }
        }
    }

    /// Asserts that nothing arrives within a short window.
    pub async fn expect_silence(&mut self) -> Result<()> {
        match self.next_text(SILENCE_TIMEOUT_MS).await {
            Ok(frame) => bail!("Expected silence, got frame: {frame}"),
            Err(_) => Ok(()),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .context("Failed to close connection")?;
        Ok(())
    }
}
