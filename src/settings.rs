use realtime_middle_tier_types::MaxOutputTokens;
use serde_json::{Map, Value};

/// Server-enforced session configuration.
///
/// Any value set here overrides what the client asks for in `session.update`;
/// values left unset leave the client's choice alone.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    model: Option<String>,
    instructions: Option<String>,
    temperature: Option<f64>,
    max_response_output_tokens: Option<MaxOutputTokens>,
    disable_audio: Option<bool>,
    voice: Option<String>,
}

pub struct SessionSettingsBuilder {
    settings: SessionSettings,
}

impl Default for SessionSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: SessionSettings::default(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.settings.model = Some(model.to_string());
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.settings.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.settings.temperature = Some(temperature);
        self
    }

    pub fn with_max_response_output_tokens(mut self, max_tokens: MaxOutputTokens) -> Self {
        self.settings.max_response_output_tokens = Some(max_tokens);
        self
    }

    pub fn with_disable_audio(mut self, disable_audio: bool) -> Self {
        self.settings.disable_audio = Some(disable_audio);
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.settings.voice = Some(voice.to_string());
        self
    }

    pub fn build(self) -> SessionSettings {
        self.settings
    }
}

impl SessionSettings {
    pub fn builder() -> SessionSettingsBuilder {
        SessionSettingsBuilder::new()
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    /// Writes every configured value into a client-supplied session object.
    pub(crate) fn apply_overrides(&self, session: &mut Map<String, Value>) {
        if let Some(model) = &self.model {
            session.insert("model".to_string(), Value::from(model.as_str()));
        }
        if let Some(instructions) = &self.instructions {
            session.insert("instructions".to_string(), Value::from(instructions.as_str()));
        }
        if let Some(temperature) = self.temperature {
            session.insert("temperature".to_string(), Value::from(temperature));
        }
        if let Some(max_tokens) = &self.max_response_output_tokens {
            let value = match max_tokens {
                MaxOutputTokens::Number(n) => Value::from(*n),
                MaxOutputTokens::Infinity(inf) => Value::from(inf.as_str()),
            };
            session.insert("max_response_output_tokens".to_string(), value);
        }
        if let Some(disable_audio) = self.disable_audio {
            session.insert("disable_audio".to_string(), Value::from(disable_audio));
        }
        if let Some(voice) = &self.voice {
            session.insert("voice".to_string(), Value::from(voice.as_str()));
        }
    }
}
