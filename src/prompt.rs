//! Chat prompt assembly from ranked retrieval results.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::{MessageRole, Record};
use crate::retrieval::SearchResult;

/// Name used when no model file is configured.
const FALLBACK_MODEL_NAME: &str = "assistant";

/// One message handed to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Builds the system and user messages for one turn.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model_name: String,
}

impl PromptBuilder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }

    /// Names the model after the stem of its weights file,
    /// e.g. `models/qwen2-7b.gguf` becomes `qwen2-7b`.
    pub fn from_model_path(model_path: Option<&Path>) -> Self {
        let name = model_path
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| FALLBACK_MODEL_NAME.to_string());
        Self::new(name)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// `results` is `None` when nothing was searched, which leaves the
    /// session files section empty.
    pub fn build(
        &self,
        user_prompt: &str,
        recent_uploads: &[String],
        results: Option<&[SearchResult]>,
    ) -> Vec<ChatMessage> {
        let priority_section = if recent_uploads.is_empty() {
            String::new()
        } else {
            let listing: Vec<String> = recent_uploads
                .iter()
                .map(|upload| format!("- \"{upload}\""))
                .collect();
            format!("Items recently uploaded by the user:\n{}", listing.join("\n"))
        };

        let files_section = match results {
            Some(results) => {
                let mut section = String::from("Retrieved context:\n");
                for result in results {
                    section.push_str(&format_result(result));
                }
                section
            }
            None => String::new(),
        };

        let system = format!(
            "You are {model}, an assistant that helps users study and work on projects using the material they share.\n\
             \n\
             ## Task\n\
             Answer using the session material below. When it is unclear or missing, rely on your own knowledge and say so.\n\
             \n\
             ## Formatting\n\
             Use markdown: headers for topics, bold for key terms, lists for steps, tables for comparisons, and $...$ for math with every symbol explained.\n\
             \n\
             ## Priority Focus\n\
             {priority_section}\n\
             \n\
             ## Session Files\n\
             {files_section}\n\
             \n\
             Respond directly to the user's question.",
            model = self.model_name,
        );

        vec![ChatMessage::system(system), ChatMessage::user(user_prompt)]
    }
}

/// Renders one hit as labelled lines.
pub fn format_result(result: &SearchResult) -> String {
    let mut out = String::new();
    let kind = result.kind();
    // Writing to a String cannot fail.
    let _ = match &result.record {
        Record::Document(doc) => write!(
            out,
            "Type: {kind}\nTitle: {}\nText: {}\n",
            doc.title, doc.text
        ),
        Record::Image(image) => {
            let objects: Vec<&str> = image.objects.iter().map(String::as_str).collect();
            write!(
                out,
                "Type: {kind}\nObjects Detected: {}\nExtracted Text: {}\n",
                objects.join(", "),
                image.text
            )
        }
        Record::Audio(audio) => write!(
            out,
            "Type: {kind}\nLanguage: {}\nTranscribed Text: {}\n",
            audio.language, audio.transcription
        ),
        Record::History(message) => write!(
            out,
            "Type: {kind}\nRole: {}\nText: {}\n",
            message.role, message.text
        ),
    };
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{AudioRecord, DocumentRecord, ImageRecord};

    #[test]
    fn test_model_name_from_path() {
        let builder = PromptBuilder::from_model_path(Some(Path::new("/models/qwen2-7b.Q4.gguf")));
        assert_eq!(builder.model_name(), "qwen2-7b.Q4");
        assert_eq!(PromptBuilder::from_model_path(None).model_name(), "assistant");
    }

    #[test]
    fn test_format_result_per_kind() {
        let doc = SearchResult::new(
            Record::Document(DocumentRecord {
                external_id: "d".into(),
                path: "/d.txt".into(),
                text: "body".into(),
                title: "Doc".into(),
            }),
            0.1,
        );
        assert_eq!(format_result(&doc), "Type: document\nTitle: Doc\nText: body\n");

        let image = SearchResult::new(
            Record::Image(ImageRecord {
                external_id: "i".into(),
                path: "/i.png".into(),
                text: "STOP".into(),
                objects: ["sign".to_string(), "car".to_string()].into_iter().collect(),
            }),
            0.1,
        );
        assert_eq!(
            format_result(&image),
            "Type: image\nObjects Detected: car, sign\nExtracted Text: STOP\n"
        );

        let audio = SearchResult::new(
            Record::Audio(AudioRecord {
                external_id: "a".into(),
                path: "/a.wav".into(),
                transcription: "hola".into(),
                language: "es".into(),
            }),
            0.1,
        );
        assert!(format_result(&audio).contains("Language: es"));
    }

    #[test]
    fn test_build_sections() {
        let builder = PromptBuilder::new("tiny");
        let uploads = vec!["/up/notes.txt".to_string()];
        let messages = builder.build("what is due?", &uploads, Some(&[][..]));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.starts_with("You are tiny"));
        assert!(messages[0].content.contains("- \"/up/notes.txt\""));
        assert!(messages[0].content.contains("Retrieved context:"));
        assert_eq!(messages[1], ChatMessage::user("what is due?"));

        let bare = builder.build("hi", &[], None);
        assert!(!bare[0].content.contains("Retrieved context:"));
        assert!(!bare[0].content.contains("recently uploaded"));
    }
}
