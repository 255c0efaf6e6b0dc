pub mod client;
pub mod relay;

use client::*;
use relay::*;
use serde::Deserialize;

/// Events the middle tier sends to the upstream realtime service on its own behalf.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

/// Events the middle tier emits towards the browser client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum RelayEvent {
    #[serde(rename = "extension.middle_tier_tool_response")]
    ToolResponse(ToolResponseEvent),
    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },
    #[serde(rename = "input_audio_buffer.transcript")]
    Transcript { transcript: String },
    #[serde(rename = "input_audio_buffer.speech_ended")]
    SpeechEnded,
}

impl RelayEvent {
    pub fn text_delta(delta: &str) -> Self {
        RelayEvent::TextDelta {
            delta: delta.to_string(),
        }
    }
}

/// The `type` discriminator of messages arriving from the upstream service.
///
/// Only the types the middle tier rewrites are named; everything else is `Unknown`
/// and passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum ServerEventKind {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "response.output_item.added")]
    ResponseOutputItemAdded,
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated,
    #[serde(rename = "response.function_call_arguments.delta")]
    ResponseFunctionCallArgumentsDelta,
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone,
    #[serde(rename = "response.output_item.done")]
    ResponseOutputItemDone,
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "input_audio_buffer.transcript")]
    InputAudioBufferTranscript,
    #[serde(rename = "response.text")]
    ResponseText,
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta,
    #[serde(rename = "response.text.end")]
    ResponseTextEnd,
    #[serde(rename = "input_audio_buffer.speech_ended")]
    InputAudioBufferSpeechEnded,
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta,
    #[serde(rename = "response.content_part.added")]
    ResponseContentPartAdded,
    #[serde(other)]
    Unknown,
}

impl ServerEventKind {
    pub fn of(message: &serde_json::Value) -> Self {
        message
            .get("type")
            .and_then(|kind| Self::deserialize(kind).ok())
            .unwrap_or(Self::Unknown)
    }
}

/// The `type` discriminator of messages arriving from the browser client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum ClientEventKind {
    #[serde(rename = "session.update")]
    SessionUpdate,
    #[serde(other)]
    Unknown,
}

impl ClientEventKind {
    pub fn of(message: &serde_json::Value) -> Self {
        message
            .get("type")
            .and_then(|kind| Self::deserialize(kind).ok())
            .unwrap_or(Self::Unknown)
    }
}
