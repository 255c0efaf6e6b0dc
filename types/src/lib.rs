pub mod events;
pub mod items;
pub mod session;
pub mod tools;

pub use events::{ClientEvent, ClientEventKind, RelayEvent, ServerEventKind};
pub use items::{FunctionCallItem, FunctionCallOutputItem, Item};
pub use session::MaxOutputTokens;
pub use tools::{FunctionTool, ToolChoice, ToolSchema};
