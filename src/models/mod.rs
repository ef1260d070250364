use crate::core::error::AssistantError;
use crate::types::{AiConfig, ChatMessage, ProcessedAttachment};

/// Picks the concrete model for a request from the configured slots.
///
/// The policy lives here, not in the orchestrator: image attachments route
/// to the vision slot, recent vision turns keep the conversation on the
/// vision model, everything else takes the text slot. Either slot stands in
/// for a missing counterpart before selection fails.
pub struct ModelSelector;

impl ModelSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(
        &self,
        config: &AiConfig,
        attachments: &[ProcessedAttachment],
        history: &[ChatMessage],
    ) -> Result<String, AssistantError> {
        let slots = &config.models;
        let wants_vision =
            attachments.iter().any(|a| a.is_image()) || self.history_is_visual(config, history);

        if wants_vision {
            if let Some(vision) = non_empty(slots.vision.as_deref()) {
                return Ok(vision.to_string());
            }
        }
        if let Some(text) = non_empty(slots.text.as_deref()) {
            return Ok(text.to_string());
        }
        if let Some(vision) = non_empty(slots.vision.as_deref()) {
            return Ok(vision.to_string());
        }
        Err(AssistantError::Config(
            "No model configured. Please select a model in settings.".to_string(),
        ))
    }

    /// Strips a `provider:` prefix off a model identifier. Only known
    /// provider ids are treated as prefixes, so tagged local model names
    /// like `llama3:8b` pass through untouched.
    pub fn extract_model_id(&self, model: &str, provider_ids: &[String]) -> String {
        if let Some((prefix, rest)) = model.split_once(':') {
            if !rest.is_empty() && provider_ids.iter().any(|id| id == prefix) {
                return rest.to_string();
            }
        }
        model.to_string()
    }

    /// A conversation that recently used the vision model stays on it even
    /// when the newest turn has no image attached.
    fn history_is_visual(&self, config: &AiConfig, history: &[ChatMessage]) -> bool {
        let Some(vision) = non_empty(config.models.vision.as_deref()) else {
            return false;
        };
        history.iter().rev().take(6).any(|message| {
            message.metadata.model.as_deref().is_some_and(|used| {
                used == vision || used.ends_with(&format!(":{vision}"))
            })
        })
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachmentKind;

    fn config(text: Option<&str>, vision: Option<&str>) -> AiConfig {
        let mut config = AiConfig::default();
        config.models.text = text.map(str::to_string);
        config.models.vision = vision.map(str::to_string);
        config
    }

    fn image_attachment() -> ProcessedAttachment {
        ProcessedAttachment {
            name: "photo.png".to_string(),
            kind: AttachmentKind::Image,
            text: None,
            base64: Some("aGk=".to_string()),
            size: 2,
        }
    }

    #[test]
    fn text_slot_wins_without_attachments() {
        let selector = ModelSelector::new();
        let picked = selector
            .select(&config(Some("gpt-4o-mini"), Some("gpt-4o")), &[], &[])
            .unwrap();
        assert_eq!(picked, "gpt-4o-mini");
    }

    #[test]
    fn image_attachments_route_to_the_vision_slot() {
        let selector = ModelSelector::new();
        let picked = selector
            .select(
                &config(Some("gpt-4o-mini"), Some("gpt-4o")),
                &[image_attachment()],
                &[],
            )
            .unwrap();
        assert_eq!(picked, "gpt-4o");
    }

    #[test]
    fn missing_vision_slot_falls_back_to_text() {
        let selector = ModelSelector::new();
        let picked = selector
            .select(&config(Some("gpt-4o-mini"), None), &[image_attachment()], &[])
            .unwrap();
        assert_eq!(picked, "gpt-4o-mini");
    }

    #[test]
    fn no_usable_slot_is_a_configuration_error() {
        let selector = ModelSelector::new();
        let err = selector.select(&config(None, Some("  ")), &[], &[]).unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }

    #[test]
    fn recent_vision_turns_keep_the_vision_model() {
        let selector = ModelSelector::new();
        let mut metadata = crate::types::MessageMetadata::default();
        metadata.model = Some("ollama:llava".to_string());
        let turn = ChatMessage::assistant("a cat on a mat", metadata);

        let picked = selector
            .select(&config(Some("llama3"), Some("llava")), &[], &[turn])
            .unwrap();
        assert_eq!(picked, "llava");
    }

    #[test]
    fn prefix_stripping_only_recognizes_known_providers() {
        let selector = ModelSelector::new();
        let providers = vec!["openai".to_string(), "ollama".to_string()];

        assert_eq!(
            selector.extract_model_id("openai:gpt-4o", &providers),
            "gpt-4o"
        );
        assert_eq!(
            selector.extract_model_id("ollama:llama3:8b", &providers),
            "llama3:8b"
        );
        assert_eq!(selector.extract_model_id("llama3:8b", &providers), "llama3:8b");
        assert_eq!(selector.extract_model_id("gpt-4o", &providers), "gpt-4o");
    }
}
