//! Configurable prompt definitions and their resolved values.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Storage keys for the built-in preference prompts.
pub mod keys {
    pub const REWRITE_INSTRUCTIONS: &str = "rewrite_instructions";
    pub const BACKGROUND_PREFERENCES: &str = "background_preferences";
    pub const RESPONSE_PREFERENCES: &str = "response_preferences";
    pub const SCHEDULE_PREFERENCES: &str = "schedule_preferences";
}

/// A registered prompt definition. Immutable after startup registration.
///
/// `instructions` doubles as the default value written on first use within
/// a namespace; `when_to_update` is guidance consumed by the out-of-band
/// learning process that refines stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurablePrompt {
    pub name: String,
    pub key: String,
    pub when_to_update: String,
    pub instructions: String,
}

impl ConfigurablePrompt {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        when_to_update: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            when_to_update: when_to_update.into(),
            instructions: instructions.into(),
        }
    }

    /// Normalize a raw mapping into a definition.
    ///
    /// Accepts the same shape as the typed struct; anything else fails with
    /// a validation error naming the problem.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RegistryError> {
        let prompt: ConfigurablePrompt =
            serde_json::from_value(value).map_err(|e| RegistryError::Validation {
                reason: e.to_string(),
            })?;
        prompt.validate()?;
        Ok(prompt)
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.key.is_empty() {
            return Err(RegistryError::Validation {
                reason: "prompt key must not be empty".into(),
            });
        }
        if self.name.is_empty() {
            return Err(RegistryError::Validation {
                reason: format!("prompt {} has an empty name", self.key),
            });
        }
        Ok(())
    }
}

/// A definition plus its resolved value for one namespace.
///
/// Produced per call and bound into the active scope; only the value is
/// ever persisted, keyed by `definition.key` within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredPrompt {
    pub definition: ConfigurablePrompt,
    pub value: String,
}

impl ConfiguredPrompt {
    pub fn key(&self) -> &str {
        &self.definition.key
    }
}

/// The built-in preference prompts, registered into the global registry at
/// startup.
pub fn default_prompts() -> Vec<ConfigurablePrompt> {
    vec![
        tone_prompt(),
        background_prompt(),
        response_prompt(),
        schedule_prompt(),
    ]
}

/// Style, tone, and format of drafted email responses.
pub fn tone_prompt() -> ConfigurablePrompt {
    ConfigurablePrompt::new(
        "tone",
        keys::REWRITE_INSTRUCTIONS,
        "Only update the prompt to include instructions on the **style and tone and format** \
         of the response. Do NOT update the prompt to include anything about the actual \
         content - only the style and tone and format. The user sometimes responds \
         differently to different types of people - take that into account, but don't be \
         too specific.",
        "Instruction about the tone and style and format of the resulting email. Update this \
         if you learn new information about the tone in which the user likes to respond that \
         may be relevant in future emails.",
    )
}

/// Standing facts about the user that inform responses.
pub fn background_prompt() -> ConfigurablePrompt {
    ConfigurablePrompt::new(
        "background",
        keys::BACKGROUND_PREFERENCES,
        "Only update the prompt to include pieces of information that are relevant to being \
         the user's assistant. Do not update the instructions to include anything about the \
         tone of emails sent, when to send calendar invites. Examples of good things to \
         include are (but are not limited to): people's emails, addresses, etc.",
        "Background information about the user. Update this if you learn new information \
         about the user that may be relevant in future emails.",
    )
}

/// What content belongs in a drafted response.
pub fn response_prompt() -> ConfigurablePrompt {
    ConfigurablePrompt::new(
        "email",
        keys::RESPONSE_PREFERENCES,
        "Only update the prompt to include instructions on the **content** of the response. \
         Do NOT update the prompt to include anything about the tone or style or format of \
         the response.",
        "Instructions about the type of content to be included in email. Update this if you \
         learn new information about how the user likes to respond to emails (not the tone, \
         and not information about the user, but specifically about how or when they like to \
         respond to emails) that may be relevant in the future.",
    )
}

/// How calendar invites should be sent.
pub fn schedule_prompt() -> ConfigurablePrompt {
    ConfigurablePrompt::new(
        "calendar",
        keys::SCHEDULE_PREFERENCES,
        "Only update the prompt to include instructions on how to send calendar invites - \
         eg when to send them, what title should be, length, time of day, etc.",
        "Instructions about how to send calendar invites (including title, length, time, \
         etc). Update this if you learn new information about how the user likes to schedule \
         events that may be relevant in future emails.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_accepts_full_mapping() {
        let value = serde_json::json!({
            "name": "tone",
            "key": "rewrite_instructions",
            "when_to_update": "only style",
            "instructions": "keep it short",
        });
        let prompt = ConfigurablePrompt::from_value(value).unwrap();
        assert_eq!(prompt.name, "tone");
        assert_eq!(prompt.key, "rewrite_instructions");
    }

    #[test]
    fn test_from_value_rejects_missing_fields() {
        let value = serde_json::json!({"name": "tone", "key": "rewrite_instructions"});
        let err = ConfigurablePrompt::from_value(value).unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = ConfigurablePrompt::from_value(serde_json::json!("rewrite_instructions"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[test]
    fn test_empty_key_rejected() {
        let value = serde_json::json!({
            "name": "tone",
            "key": "",
            "when_to_update": "x",
            "instructions": "y",
        });
        assert!(ConfigurablePrompt::from_value(value).is_err());
    }

    #[test]
    fn test_default_prompts_cover_all_keys() {
        let defaults = default_prompts();
        let keys: Vec<&str> = defaults.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                keys::REWRITE_INSTRUCTIONS,
                keys::BACKGROUND_PREFERENCES,
                keys::RESPONSE_PREFERENCES,
                keys::SCHEDULE_PREFERENCES,
            ]
        );
        for prompt in &defaults {
            assert!(prompt.validate().is_ok());
            assert!(!prompt.instructions.is_empty());
        }
    }
}
