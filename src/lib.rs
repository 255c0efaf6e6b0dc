mod error;
mod frame;
mod relay;
mod settings;
mod tools;
mod upstream;

pub use realtime_middle_tier_types as types;

pub use error::{RelayError, TransportError};
pub use frame::Frame;
pub use relay::{MiddleTier, MiddleTierBuilder};
pub use settings::{SessionSettings, SessionSettingsBuilder};
pub use tools::{Destination, Tool, ToolInvoker, ToolRegistry, ToolResult};
pub use upstream::{
    CLIENT_REQUEST_ID_HEADER, Credential, DEFAULT_API_VERSION, TokenProvider, UpstreamConfig,
    UpstreamConfigBuilder,
};
