use crate::core::error::AssistantError;
use crate::types::{AttachmentKind, FileAttachment, ProcessedAttachment};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Normalizes raw attachments into the form the selector and executors
/// consume. Implementations may do IO (the default one does not).
#[async_trait]
pub trait AttachmentProcessor: Send + Sync {
    async fn process(
        &self,
        attachments: &[FileAttachment],
    ) -> Result<Vec<ProcessedAttachment>, AssistantError>;
}

/// Default normalizer: text files are decoded in place, images are base64
/// encoded for vision payloads, anything else is kept as an annotated
/// placeholder so prompts can still mention it.
pub struct DefaultAttachmentProcessor;

impl DefaultAttachmentProcessor {
    pub fn new() -> Self {
        Self
    }

    fn classify(attachment: &FileAttachment) -> AttachmentKind {
        if let Some(mime) = attachment.mime_type.as_deref() {
            let mime = mime.to_lowercase();
            if mime.starts_with("image/") {
                return AttachmentKind::Image;
            }
            if mime.starts_with("text/")
                || matches!(
                    mime.as_str(),
                    "application/json"
                        | "application/xml"
                        | "application/javascript"
                        | "application/x-yaml"
                        | "application/yaml"
                )
            {
                return AttachmentKind::Text;
            }
            return AttachmentKind::Binary;
        }
        Self::classify_by_extension(&attachment.name)
    }

    fn classify_by_extension(name: &str) -> AttachmentKind {
        let ext = name.rsplit('.').next().unwrap_or_default().to_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => AttachmentKind::Image,
            "txt" | "md" | "markdown" | "json" | "yaml" | "yml" | "toml" | "xml" | "csv"
            | "log" | "rs" | "py" | "js" | "ts" | "sh" | "html" | "css" => AttachmentKind::Text,
            _ => AttachmentKind::Binary,
        }
    }
}

impl Default for DefaultAttachmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentProcessor for DefaultAttachmentProcessor {
    async fn process(
        &self,
        attachments: &[FileAttachment],
    ) -> Result<Vec<ProcessedAttachment>, AssistantError> {
        let mut processed = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let size = attachment.bytes.len();
            let kind = Self::classify(attachment);
            let entry = match kind {
                AttachmentKind::Text => ProcessedAttachment {
                    name: attachment.name.clone(),
                    kind,
                    text: Some(String::from_utf8_lossy(&attachment.bytes).into_owned()),
                    base64: None,
                    size,
                },
                AttachmentKind::Image => ProcessedAttachment {
                    name: attachment.name.clone(),
                    kind,
                    text: None,
                    base64: Some(BASE64.encode(&attachment.bytes)),
                    size,
                },
                AttachmentKind::Binary => ProcessedAttachment {
                    name: attachment.name.clone(),
                    kind,
                    text: Some(format!(
                        "[binary attachment: {} ({} bytes)]",
                        attachment.name, size
                    )),
                    base64: None,
                    size,
                },
            };
            processed.push(entry);
        }
        Ok(processed)
    }
}
