/// Maximum number of output tokens for a response. Use "inf" for infinity.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MaxOutputTokens {
    Number(i32),
    Infinity(String),
}

impl MaxOutputTokens {
    pub fn infinite() -> Self {
        MaxOutputTokens::Infinity("inf".to_string())
    }
}

impl From<i32> for MaxOutputTokens {
    fn from(value: i32) -> Self {
        MaxOutputTokens::Number(value)
    }
}
