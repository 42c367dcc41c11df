use serde::{Deserialize, Serialize};

// =============================================================================
// Chat
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
        }
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice, if the model produced any.
    pub fn text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

// =============================================================================
// Images
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerateRequest {
    pub model: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub return_binary: bool,
    pub safe_mode: bool,
    pub hide_watermark: bool,
}

impl ImageGenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            width,
            height,
            return_binary: true,
            safe_mode: true,
            hide_watermark: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_roles_lowercase() {
        let req = ChatRequest::new("llama-3.3-70b")
            .message(ChatMessage::system("You are an expert blog writer."))
            .message(ChatMessage::user("Write."));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "llama-3.3-70b");
    }

    #[test]
    fn image_request_asks_for_binary_output() {
        let req = ImageGenerateRequest::new("flux-dev", "a calm lake", 864, 1280);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["return_binary"], true);
        assert_eq!(json["safe_mode"], true);
        assert_eq!(json["hide_watermark"], true);
        assert_eq!(json["width"], 864);
        assert_eq!(json["height"], 1280);
    }

    #[test]
    fn chat_response_text_takes_first_choice() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "hello"}}, {"message": {"content": "second"}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("hello"));
    }

    #[test]
    fn chat_response_without_choices_has_no_text() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(resp.text().is_none());
    }
}
