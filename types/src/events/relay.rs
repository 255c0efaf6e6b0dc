/// `extension.middle_tier_tool_response` event
///
/// Carries the result of a server-side tool whose output is meant for the client,
/// linked to the conversation item that preceded the call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResponseEvent {
    previous_item_id: Option<String>,
    tool_name: String,
    tool_result: String,
}

impl ToolResponseEvent {
    pub fn new(previous_item_id: Option<String>, tool_name: &str, tool_result: String) -> Self {
        Self {
            previous_item_id,
            tool_name: tool_name.to_string(),
            tool_result,
        }
    }

    pub fn previous_item_id(&self) -> Option<&str> {
        self.previous_item_id.as_deref()
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn tool_result(&self) -> &str {
        &self.tool_result
    }
}
