use super::Outlet;
use super::calls::{Completion, PendingCalls};
use super::learning::{self, LearningContext};
use crate::error::{RelayError, TransportError};
use crate::frame::Frame;
use crate::settings::SessionSettings;
use crate::tools::{Destination, ToolRegistry};
use futures::{Stream, StreamExt};
use realtime_middle_tier_types::events::client::{ConversationItemCreateEvent, ResponseCreateEvent};
use realtime_middle_tier_types::events::relay::ToolResponseEvent;
use realtime_middle_tier_types::{
    ClientEvent, FunctionCallItem, FunctionCallOutputItem, Item, RelayEvent, ServerEventKind,
    ToolChoice,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Upstream to client direction, owning the per-connection tool call state.
pub(crate) struct Inbound {
    settings: Arc<SessionSettings>,
    tools: Arc<ToolRegistry>,
    calls: PendingCalls,
    learning: LearningContext,
    client: Outlet,
    upstream: Outlet,
}

impl Inbound {
    pub(crate) fn new(
        settings: Arc<SessionSettings>,
        tools: Arc<ToolRegistry>,
        client: Outlet,
        upstream: Outlet,
    ) -> Self {
        Self {
            settings,
            tools,
            calls: PendingCalls::default(),
            learning: LearningContext::new(),
            client,
            upstream,
        }
    }

    pub(crate) async fn pump<S>(mut self, mut upstream: S) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        while let Some(frame) = upstream.next().await {
            match frame? {
                Frame::Text(text) => {
                    if let Some(text) = self.handle(text).await? {
                        self.client.send_text(text).await?;
                    }
                }
                Frame::Binary(data) => {
                    tracing::warn!(
                        "protocol violation: binary frame from upstream ({} bytes), dropped",
                        data.len()
                    );
                }
                Frame::Close => {
                    tracing::info!("upstream closed the connection");
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => {}
            }
        }
        Ok(())
    }

    /// Processes one upstream message. Returns the text to forward to the client, if any.
    ///
    /// Side effects (tool invocations, injected events) happen before this returns, so
    /// anything sent here reaches its socket ahead of the forwarded message.
    pub(crate) async fn handle(&mut self, text: String) -> Result<Option<String>, RelayError> {
        let mut message: Value = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("dropping malformed upstream message: {}", e);
                return Ok(None);
            }
        };

        let kind = ServerEventKind::of(&message);
        tracing::trace!("upstream message: {:?}", kind);

        match kind {
            ServerEventKind::SessionCreated => {
                self.sanitize_session(&mut message);
                Ok(Some(message.to_string()))
            }
            ServerEventKind::ResponseOutputItemAdded => {
                Ok(Some(self.strip_quiz(message).unwrap_or(text)))
            }
            ServerEventKind::ConversationItemCreated => match item_type(&message) {
                Some("function_call") => {
                    self.announce_call(&message);
                    Ok(None)
                }
                Some("function_call_output") => Ok(None),
                _ => Ok(Some(text)),
            },
            ServerEventKind::ResponseFunctionCallArgumentsDelta
            | ServerEventKind::ResponseFunctionCallArgumentsDone => Ok(None),
            ServerEventKind::ResponseOutputItemDone => match item_type(&message) {
                Some("function_call") => {
                    self.complete_call(&message).await?;
                    Ok(None)
                }
                _ => Ok(Some(text)),
            },
            ServerEventKind::ResponseDone => self.finish_response(message, text).await,
            ServerEventKind::InputAudioBufferTranscript => {
                let transcript = str_field(&message, "transcript").unwrap_or_default();
                self.client
                    .send_json(&RelayEvent::Transcript {
                        transcript: transcript.to_string(),
                    })
                    .await?;
                Ok(None)
            }
            ServerEventKind::ResponseText => {
                self.send_delta(str_field(&message, "text").unwrap_or_default())
                    .await?;
                Ok(None)
            }
            ServerEventKind::ResponseTextDelta => {
                let delta = str_field(&message, "delta")
                    .or_else(|| str_field(&message, "text"))
                    .unwrap_or_default();
                self.send_delta(delta).await?;
                Ok(None)
            }
            ServerEventKind::ResponseTextEnd => {
                self.send_delta("\n").await?;
                Ok(None)
            }
            ServerEventKind::InputAudioBufferSpeechEnded => {
                self.client.send_json(&RelayEvent::SpeechEnded).await?;
                Ok(None)
            }
            ServerEventKind::ResponseAudioTranscriptDelta => {
                let text = str_field(&message, "text").or_else(|| str_field(&message, "delta"));
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    self.send_delta(text).await?;
                }
                Ok(None)
            }
            ServerEventKind::ResponseContentPartAdded => {
                for text in content_texts(&message) {
                    self.send_delta(text).await?;
                }
                Ok(None)
            }
            ServerEventKind::Unknown => Ok(Some(text)),
        }
    }

    #[cfg(test)]
    pub(crate) fn calls(&self) -> &PendingCalls {
        &self.calls
    }

    #[cfg(test)]
    pub(crate) fn learning(&self) -> &LearningContext {
        &self.learning
    }

    fn sanitize_session(&mut self, message: &mut Value) {
        let Some(session) = message.get_mut("session").and_then(Value::as_object_mut) else {
            tracing::warn!("session.created without a session object");
            return;
        };
        if let Some(id) = session.get("id").and_then(Value::as_str) {
            tracing::info!("upstream session {} created", id);
            self.learning.set_session_id(id);
        }
        session.insert("instructions".to_string(), Value::from(""));
        session.insert("tools".to_string(), Value::Array(vec![]));
        session.insert(
            "voice".to_string(),
            self.settings.voice().map_or(Value::Null, Value::from),
        );
        session.insert(
            "tool_choice".to_string(),
            serde_json::to_value(ToolChoice::None).unwrap_or(Value::Null),
        );
        session.insert("max_response_output_tokens".to_string(), Value::Null);
    }

    /// Replaces a tagged quiz block in a text item. Returns `None` when nothing changed.
    fn strip_quiz(&mut self, mut message: Value) -> Option<String> {
        let item = message.get_mut("item")?;
        if item.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }
        let (quiz, visible) = learning::extract_quiz(item.get("text")?.as_str()?)?;
        item["text"] = Value::from(visible);

        let session_id = str_field(&message, "session_id");
        self.learning.record(session_id, quiz);
        Some(message.to_string())
    }

    fn announce_call(&mut self, message: &Value) {
        let Some(call_id) = message
            .get("item")
            .and_then(|item| item.get("call_id"))
            .and_then(Value::as_str)
        else {
            tracing::warn!("protocol violation: function call item without a call id");
            return;
        };
        let previous_item_id = str_field(message, "previous_item_id");
        if self.calls.announce(call_id, previous_item_id) {
            tracing::debug!("tool call {} announced", call_id);
        } else {
            tracing::warn!("protocol violation: tool call {} announced twice", call_id);
        }
    }

    async fn complete_call(&mut self, message: &Value) -> Result<(), RelayError> {
        let item = match message.get("item").map(FunctionCallItem::deserialize) {
            Some(Ok(item)) => item,
            _ => {
                tracing::warn!("protocol violation: completed function call without a call id");
                return Ok(());
            }
        };
        let call_id = item.call_id();

        let previous_item_id = match self.calls.complete(call_id) {
            Completion::Ready { previous_item_id } => previous_item_id,
            Completion::Duplicate => {
                tracing::warn!(
                    "protocol violation: tool call {} completed twice, not invoking again",
                    call_id
                );
                return Ok(());
            }
            Completion::Unknown => {
                tracing::warn!(
                    "protocol violation: completion for unannounced tool call {}",
                    call_id
                );
                None
            }
        };

        let tool = self
            .tools
            .get(item.name())
            .ok_or_else(|| RelayError::UnknownTool(item.name().to_string()))?;
        let args: Value =
            serde_json::from_str(item.arguments()).map_err(|source| RelayError::ToolArguments {
                tool: item.name().to_string(),
                source,
            })?;

        tracing::info!("invoking tool {} for call {}", item.name(), call_id);
        let result = tool.invoke(args).await.map_err(|source| RelayError::Tool {
            tool: item.name().to_string(),
            source,
        })?;
        tracing::debug!(
            "tool {} returned, destination {:?}",
            item.name(),
            result.destination()
        );

        let text = result.to_text();
        let output = match result.destination() {
            Destination::ToServer => text.clone(),
            Destination::ToClient => String::new(),
        };
        let event = ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::FunctionCallOutput(FunctionCallOutputItem::new(call_id, output)),
        ));
        self.upstream.send_json(&event).await?;

        if result.destination() == Destination::ToClient {
            let event = RelayEvent::ToolResponse(ToolResponseEvent::new(
                previous_item_id,
                item.name(),
                text,
            ));
            self.client.send_json(&event).await?;
        }
        Ok(())
    }

    async fn finish_response(
        &mut self,
        mut message: Value,
        text: String,
    ) -> Result<Option<String>, RelayError> {
        if self.calls.finish_turn() {
            tracing::debug!("requesting a response that uses the tool output");
            let event = ClientEvent::ResponseCreate(ResponseCreateEvent::new());
            self.upstream.send_json(&event).await?;
        }

        let Some(response) = message.get_mut("response") else {
            return Ok(Some(text));
        };
        let stripped = strip_function_calls(response);
        self.send_delta("\n\n").await?;

        Ok(Some(if stripped { message.to_string() } else { text }))
    }

    async fn send_delta(&self, delta: &str) -> Result<(), RelayError> {
        self.client.send_json(&RelayEvent::text_delta(delta)).await
    }
}

fn str_field<'a>(message: &'a Value, key: &str) -> Option<&'a str> {
    message.get(key).and_then(Value::as_str)
}

fn item_type(message: &Value) -> Option<&str> {
    message
        .get("item")
        .and_then(|item| item.get("type"))
        .and_then(Value::as_str)
}

fn strip_function_calls(response: &mut Value) -> bool {
    let Some(output) = response.get_mut("output").and_then(Value::as_array_mut) else {
        return false;
    };
    let before = output.len();
    output.retain(|entry| entry.get("type").and_then(Value::as_str) != Some("function_call"));
    output.len() != before
}

/// Text parts of a `response.content_part.added`, from a `content` list or a single `part`.
fn content_texts(message: &Value) -> Vec<&str> {
    let parts: Vec<&Value> = match message.get("content").and_then(Value::as_array) {
        Some(content) => content.iter().collect(),
        None => message.get("part").into_iter().collect(),
    };
    parts
        .into_iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .map(|part| str_field(part, "text").unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{MockToolInvoker, Tool, ToolResult, schema};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        inbound: Inbound,
        client: mpsc::Receiver<Frame>,
        upstream: mpsc::Receiver<Frame>,
    }

    impl Harness {
        fn new(settings: SessionSettings, tools: Vec<Tool>) -> Self {
            let mut registry = ToolRegistry::new();
            for tool in tools {
                registry.register(tool);
            }
            let (client_tx, client) = mpsc::channel(64);
            let (upstream_tx, upstream) = mpsc::channel(64);
            let inbound = Inbound::new(
                Arc::new(settings),
                Arc::new(registry),
                Outlet::new("client", client_tx),
                Outlet::new("upstream", upstream_tx),
            );
            Self {
                inbound,
                client,
                upstream,
            }
        }

        async fn handle(&mut self, message: Value) -> Option<Value> {
            self.inbound
                .handle(message.to_string())
                .await
                .unwrap()
                .map(|text| serde_json::from_str(&text).unwrap())
        }

        fn sent_to_client(&mut self) -> Vec<Value> {
            drain(&mut self.client)
        }

        fn sent_upstream(&mut self) -> Vec<Value> {
            drain(&mut self.upstream)
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            match frame {
                Frame::Text(text) => messages.push(serde_json::from_str(&text).unwrap()),
                other => panic!("unexpected frame {:?}", other),
            }
        }
        messages
    }

    fn tool(name: &str, destination: Destination, output: &'static str) -> Tool {
        let mut invoker = MockToolInvoker::new();
        invoker
            .expect_invoke()
            .times(1)
            .returning(move |_| Ok(ToolResult::text(output.to_string(), destination)));
        Tool::new(schema(name), Arc::new(invoker))
    }

    fn call_created(call_id: &str, previous_item_id: &str) -> Value {
        json!({
            "type": "conversation.item.created",
            "previous_item_id": previous_item_id,
            "item": {"id": "item_fc", "type": "function_call", "call_id": call_id, "name": "search", "arguments": ""}
        })
    }

    fn call_done(call_id: &str, name: &str, arguments: &str) -> Value {
        json!({
            "type": "response.output_item.done",
            "item": {"id": "item_fc", "type": "function_call", "call_id": call_id, "name": name, "arguments": arguments}
        })
    }

    #[tokio::test]
    async fn test_session_created_is_sanitized() {
        let settings = SessionSettings::builder().with_voice("alloy").build();
        let mut harness = Harness::new(settings, vec![]);

        let forwarded = harness
            .handle(json!({
                "type": "session.created",
                "session": {
                    "id": "sess_1",
                    "instructions": "secret system prompt",
                    "tools": [{"type": "function", "name": "search"}],
                    "voice": "echo",
                    "tool_choice": "auto",
                    "max_response_output_tokens": 4096,
                    "modalities": ["text", "audio"]
                }
            }))
            .await
            .unwrap();

        let session = &forwarded["session"];
        assert_eq!(session["instructions"], "");
        assert_eq!(session["tools"], json!([]));
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["tool_choice"], "none");
        assert_eq!(session["max_response_output_tokens"], Value::Null);
        assert_eq!(session["modalities"], json!(["text", "audio"]));
        assert_eq!(harness.inbound.learning().session_id(), Some("sess_1"));
    }

    #[tokio::test]
    async fn test_session_created_without_voice_setting() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);

        let forwarded = harness
            .handle(json!({"type": "session.created", "session": {"voice": "echo"}}))
            .await
            .unwrap();

        assert_eq!(forwarded["session"]["voice"], Value::Null);
    }

    #[tokio::test]
    async fn test_server_bound_tool_call_round_trip() {
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![tool("search", Destination::ToServer, "[doc1]: plants need light\n-----\n")],
        );

        assert!(harness.handle(call_created("c1", "item_0")).await.is_none());
        assert!(
            harness
                .handle(json!({"type": "response.function_call_arguments.delta", "call_id": "c1", "delta": "{\"query\""}))
                .await
                .is_none()
        );
        assert!(
            harness
                .handle(json!({"type": "response.function_call_arguments.done", "call_id": "c1", "arguments": "{\"query\":\"photosynthesis\"}"}))
                .await
                .is_none()
        );
        assert!(
            harness
                .handle(call_done("c1", "search", "{\"query\":\"photosynthesis\"}"))
                .await
                .is_none()
        );

        let upstream = harness.sent_upstream();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0]["type"], "conversation.item.create");
        assert_eq!(upstream[0]["item"]["type"], "function_call_output");
        assert_eq!(upstream[0]["item"]["call_id"], "c1");
        assert_eq!(upstream[0]["item"]["output"], "[doc1]: plants need light\n-----\n");
        assert!(harness.sent_to_client().is_empty());

        // the output item the relay injected is echoed back and hidden
        assert!(
            harness
                .handle(json!({"type": "conversation.item.created", "item": {"type": "function_call_output", "call_id": "c1"}}))
                .await
                .is_none()
        );

        let forwarded = harness
            .handle(json!({
                "type": "response.done",
                "response": {"output": [
                    {"type": "function_call", "call_id": "c1"},
                    {"type": "message", "id": "item_1"}
                ]}
            }))
            .await
            .unwrap();

        assert_eq!(forwarded["response"]["output"], json!([{"type": "message", "id": "item_1"}]));
        let upstream = harness.sent_upstream();
        assert_eq!(upstream, vec![json!({"type": "response.create"})]);
        assert_eq!(
            harness.sent_to_client(),
            vec![json!({"type": "response.text.delta", "delta": "\n\n"})]
        );
        assert_eq!(harness.inbound.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_client_bound_tool_result_uses_side_channel() {
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![tool("report_grounding", Destination::ToClient, "{\"sources\":[]}")],
        );

        harness.handle(call_created("c2", "item_7")).await;
        harness
            .handle(call_done("c2", "report_grounding", "{\"sources\":[]}"))
            .await;

        let upstream = harness.sent_upstream();
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0]["item"]["call_id"], "c2");
        assert_eq!(upstream[0]["item"]["output"], "");
        assert_eq!(
            harness.sent_to_client(),
            vec![json!({
                "type": "extension.middle_tier_tool_response",
                "previous_item_id": "item_7",
                "tool_name": "report_grounding",
                "tool_result": "{\"sources\":[]}"
            })]
        );
    }

    #[tokio::test]
    async fn test_unannounced_completion_still_invokes_tool() {
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![tool("report_grounding", Destination::ToClient, "{\"sources\":[]}")],
        );

        harness
            .handle(call_done("ghost", "report_grounding", "{}"))
            .await;

        assert_eq!(harness.sent_upstream().len(), 1);
        let client = harness.sent_to_client();
        assert_eq!(client[0]["previous_item_id"], Value::Null);
        assert_eq!(harness.inbound.calls().len(), 0);

        harness
            .handle(json!({"type": "response.done", "response": {"output": []}}))
            .await;
        assert_eq!(harness.sent_upstream(), vec![json!({"type": "response.create"})]);
    }

    #[tokio::test]
    async fn test_duplicate_completion_invokes_once() {
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![tool("search", Destination::ToServer, "result")],
        );

        harness.handle(call_created("c1", "item_0")).await;
        harness.handle(call_done("c1", "search", "{}")).await;
        harness.handle(call_done("c1", "search", "{}")).await;

        assert_eq!(harness.sent_upstream().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_call_without_completion_still_continues() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);

        harness.handle(call_created("c1", "item_0")).await;
        harness
            .handle(json!({"type": "response.done", "response": {"output": []}}))
            .await;
        harness
            .handle(json!({"type": "response.done", "response": {"output": []}}))
            .await;

        assert_eq!(harness.sent_upstream(), vec![json!({"type": "response.create"})]);
    }

    #[tokio::test]
    async fn test_response_done_without_tools_is_forwarded_verbatim() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);
        let text = r#"{"type":"response.done","response":{"output":[{"type":"message"}]}}"#;

        let forwarded = harness.inbound.handle(text.to_string()).await.unwrap();

        assert_eq!(forwarded.as_deref(), Some(text));
        assert!(harness.sent_upstream().is_empty());
        assert_eq!(harness.sent_to_client().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_is_fatal() {
        let mut invoker = MockToolInvoker::new();
        invoker
            .expect_invoke()
            .returning(|_| Err(anyhow::anyhow!("search service unavailable")));
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![Tool::new(schema("search"), Arc::new(invoker))],
        );
        harness.handle(call_created("c1", "item_0")).await;

        let result = harness
            .inbound
            .handle(call_done("c1", "search", "{}").to_string())
            .await;

        assert!(matches!(result, Err(RelayError::Tool { .. })));
        assert!(harness.sent_upstream().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments_are_fatal() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);
        let result = harness
            .inbound
            .handle(call_done("c1", "missing", "{}").to_string())
            .await;
        assert!(matches!(result, Err(RelayError::UnknownTool(name)) if name == "missing"));

        let mut invoker = MockToolInvoker::new();
        invoker.expect_invoke().never();
        let mut harness = Harness::new(
            SessionSettings::default(),
            vec![Tool::new(schema("search"), Arc::new(invoker))],
        );
        let result = harness
            .inbound
            .handle(call_done("c2", "search", "{not json").to_string())
            .await;
        assert!(matches!(result, Err(RelayError::ToolArguments { .. })));
    }

    #[tokio::test]
    async fn test_text_events_become_deltas() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);

        for message in [
            json!({"type": "response.text", "text": "Hello"}),
            json!({"type": "response.text.delta", "delta": " there"}),
            json!({"type": "response.text.delta", "text": " friend"}),
            json!({"type": "response.audio_transcript.delta", "delta": "!"}),
            json!({"type": "response.audio_transcript.delta", "delta": ""}),
            json!({"type": "response.content_part.added", "content": [
                {"type": "text", "text": "A"},
                {"type": "audio"},
                {"type": "text", "text": "B"}
            ]}),
            json!({"type": "response.content_part.added", "part": {"type": "text", "text": "C"}}),
            json!({"type": "response.text.end"}),
        ] {
            assert!(harness.handle(message).await.is_none());
        }

        let deltas: Vec<String> = harness
            .sent_to_client()
            .iter()
            .map(|event| {
                assert_eq!(event["type"], "response.text.delta");
                event["delta"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(deltas, vec!["Hello", " there", " friend", "!", "A", "B", "C", "\n"]);
    }

    #[tokio::test]
    async fn test_speech_events_are_normalized() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);

        harness
            .handle(json!({"type": "input_audio_buffer.transcript", "transcript": "what is a leaf"}))
            .await;
        harness
            .handle(json!({"type": "input_audio_buffer.speech_ended", "audio_end_ms": 1200}))
            .await;

        assert_eq!(
            harness.sent_to_client(),
            vec![
                json!({"type": "input_audio_buffer.transcript", "transcript": "what is a leaf"}),
                json!({"type": "input_audio_buffer.speech_ended"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_quiz_block_is_hidden_and_recorded() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);
        harness
            .handle(json!({"type": "session.created", "session": {"id": "sess_9"}}))
            .await;

        let forwarded = harness
            .handle(json!({
                "type": "response.output_item.added",
                "item": {"type": "text", "text": "Nice! QUESTION: What gas do plants absorb? ANSWER: Carbon dioxide DIFFICULTY: Medium"}
            }))
            .await
            .unwrap();

        assert_eq!(forwarded["item"]["text"], "Nice! What gas do plants absorb?");
        let quiz = harness.inbound.learning().question("sess_9").unwrap();
        assert_eq!(quiz.answer, "Carbon dioxide");
        assert_eq!(quiz.difficulty, "medium");
    }

    #[tokio::test]
    async fn test_unrecognized_messages_pass_verbatim() {
        let mut harness = Harness::new(SessionSettings::default(), vec![]);

        for text in [
            r#"{"type":"rate_limits.updated","rate_limits":[]}"#,
            r#"{"type":"response.output_item.added","item":{"type":"message"}}"#,
            r#"{"type":"conversation.item.created","item":{"type":"message"}}"#,
            r#"{"no_type":true}"#,
        ] {
            let forwarded = harness.inbound.handle(text.to_string()).await.unwrap();
            assert_eq!(forwarded.as_deref(), Some(text));
        }
        assert_eq!(harness.inbound.handle("{oops".to_string()).await.unwrap(), None);
        assert!(harness.sent_to_client().is_empty());
    }
}
