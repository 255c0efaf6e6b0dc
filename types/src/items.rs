#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "function_call")]
    FunctionCall(FunctionCallItem),
    #[serde(rename = "function_call_output")]
    FunctionCallOutput(FunctionCallOutputItem),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallItem {
    /// The ID of the function call
    call_id: String,

    /// The name of the function being called
    #[serde(default)]
    name: String,

    /// The arguments of the function call, as a JSON-encoded string.
    /// Only complete once the item is done.
    #[serde(default)]
    arguments: String,
}

impl FunctionCallItem {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallOutputItem {
    /// The ID of the function call this output answers
    call_id: String,

    /// The output of the function call
    output: String,
}

impl FunctionCallOutputItem {
    pub fn new(call_id: &str, output: String) -> Self {
        Self {
            call_id: call_id.to_string(),
            output,
        }
    }
}
