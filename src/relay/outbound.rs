use super::Outlet;
use crate::error::{RelayError, TransportError};
use crate::frame::Frame;
use crate::settings::SessionSettings;
use crate::tools::ToolRegistry;
use futures::{Stream, StreamExt};
use realtime_middle_tier_types::ClientEventKind;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Client to upstream direction: forwards everything, rewriting `session.update`.
pub(crate) struct Outbound {
    settings: Arc<SessionSettings>,
    tools: Arc<ToolRegistry>,
}

impl Outbound {
    pub(crate) fn new(settings: Arc<SessionSettings>, tools: Arc<ToolRegistry>) -> Self {
        Self { settings, tools }
    }

    pub(crate) async fn pump<S>(self, mut client: S, upstream: Outlet) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        while let Some(frame) = client.next().await {
            match frame? {
                Frame::Text(text) => {
                    if let Some(text) = self.transform(text) {
                        upstream.send_text(text).await?;
                    }
                }
                Frame::Binary(data) => {
                    tracing::warn!(
                        "protocol violation: binary frame from client ({} bytes), dropped",
                        data.len()
                    );
                }
                Frame::Close => {
                    tracing::info!("client closed the connection");
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => {}
            }
        }
        Ok(())
    }

    /// Returns the text to forward upstream, or `None` if the message is dropped.
    pub(crate) fn transform(&self, text: String) -> Option<String> {
        let mut message: Value = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("dropping malformed client message: {}", e);
                return None;
            }
        };

        match ClientEventKind::of(&message) {
            ClientEventKind::SessionUpdate => {
                self.enforce_session(&mut message);
                Some(message.to_string())
            }
            ClientEventKind::Unknown => Some(text),
        }
    }

    fn enforce_session(&self, message: &mut Value) {
        let Some(object) = message.as_object_mut() else {
            return;
        };
        let session = object
            .entry("session")
            .or_insert_with(|| Value::Object(Map::new()));
        if !session.is_object() {
            tracing::warn!("session.update carried a non-object session, replacing it");
            *session = Value::Object(Map::new());
        }
        let Some(session) = session.as_object_mut() else {
            return;
        };

        self.settings.apply_overrides(session);
        session.insert(
            "tool_choice".to_string(),
            serde_json::to_value(self.tools.tool_choice()).unwrap_or(Value::Null),
        );
        session.insert(
            "tools".to_string(),
            serde_json::to_value(self.tools.schemas()).unwrap_or_else(|_| Value::Array(vec![])),
        );
        tracing::debug!("session.update rewritten with tools {:?}", self.tools.names());
    }
}
