use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use realtime_middle_tier_types::{ToolChoice, ToolSchema};
use std::sync::Arc;

/// Where the result of a tool call is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Back into the conversation, for the model to use.
    ToServer,
    /// To the client as an `extension.middle_tier_tool_response`.
    ToClient,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ToolPayload {
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    payload: ToolPayload,
    destination: Destination,
}

impl ToolResult {
    pub fn text(text: String, destination: Destination) -> Self {
        Self {
            payload: ToolPayload::Text(text),
            destination,
        }
    }

    pub fn json(value: serde_json::Value, destination: Destination) -> Self {
        Self {
            payload: ToolPayload::Json(value),
            destination,
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn to_text(&self) -> String {
        match &self.payload {
            ToolPayload::Text(text) => text.clone(),
            ToolPayload::Json(value) => value.to_string(),
        }
    }
}

/// The server-side implementation behind a tool schema.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, args: serde_json::Value) -> Result<ToolResult>;
}

#[derive(Clone)]
pub struct Tool {
    schema: ToolSchema,
    invoker: Arc<dyn ToolInvoker>,
}

impl Tool {
    pub fn new(schema: ToolSchema, invoker: Arc<dyn ToolInvoker>) -> Self {
        Self { schema, invoker }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub async fn invoke(&self, args: serde_json::Value) -> Result<ToolResult> {
        self.invoker.invoke(args).await
    }
}

/// Tools keyed by name, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any earlier tool with the same name.
    pub fn register(&mut self, tool: Tool) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<&ToolSchema> {
        self.tools.iter().map(Tool::schema).collect()
    }

    pub fn tool_choice(&self) -> ToolChoice {
        if self.is_empty() {
            ToolChoice::None
        } else {
            ToolChoice::Auto
        }
    }
}

#[cfg(test)]
pub(crate) fn schema(name: &str) -> ToolSchema {
    ToolSchema::Function(realtime_middle_tier_types::FunctionTool::new(
        name,
        "test tool",
        serde_json::json!({"type": "object", "properties": {}}),
    ))
}
