use std::fmt;

use crate::errors::{ClientError, RequestError};

/// Opaque chat/session identifier issued by the server (`chatId`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    /// Creates a chat id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the chat id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChatId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One question submitted to the service. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    request_id: uuid::Uuid,
    question: String,
    chat_id: Option<ChatId>,
}

impl StreamRequest {
    /// Builds a request, rejecting questions that are empty after trimming.
    pub fn new(question: impl Into<String>, chat_id: Option<ChatId>) -> Result<Self, ClientError> {
        let question = question.into();
        let question = question.trim();
        if question.is_empty() {
            return Err(ClientError::Validation("question must not be empty".into()));
        }
        Ok(Self {
            request_id: uuid::Uuid::new_v4(),
            question: question.to_string(),
            chat_id: chat_id.filter(|id| !id.as_str().trim().is_empty()),
        })
    }

    /// Client-generated identity used to tag events and log lines.
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    pub(crate) fn body(&self) -> RequestBody<'_> {
        RequestBody {
            question: &self.question,
            chat_id: self.chat_id.as_ref(),
        }
    }
}

/// Wire shape shared by the streaming and single-shot endpoints.
#[derive(Debug, serde::Serialize)]
pub(crate) struct RequestBody<'a> {
    question: &'a str,
    #[serde(rename = "chatId", skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a ChatId>,
}

const MEDICAL_INTENT: &str = "medical";

/// Complete answer for one question.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Full answer text.
    #[serde(rename = "answer")]
    pub text: String,
    /// Chat the server filed the exchange under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// Explicit in-domain flag (`"medical": false` marks an off-topic question).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical: Option<bool>,
    /// Intent detected by the stream endpoint's non-streaming path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Intent reported by the single-shot endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    /// Whether retrieved reference context was used to generate the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used: Option<bool>,
    /// Server timestamp, passed through as sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Answer {
    /// Answer carrying only text, as produced by an event stream.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Resolves whether the question was in the service's domain.
    ///
    /// `medical` wins when present; otherwise `questionType` then `intent` are
    /// compared against `"medical"`. `None` means the server did not say.
    pub fn in_domain(&self) -> Option<bool> {
        if let Some(medical) = self.medical {
            return Some(medical);
        }
        self.question_type
            .as_deref()
            .or(self.intent.as_deref())
            .map(|intent| intent.eq_ignore_ascii_case(MEDICAL_INTENT))
    }

    /// Soft warning to show alongside an off-domain answer.
    pub fn advisory(&self) -> Option<&'static str> {
        match self.in_domain() {
            Some(false) => Some(
                "This question does not look medical; the answer may be a general reply.",
            ),
            _ => None,
        }
    }
}

/// Decodes a single-shot answer body; a missing `answer` field is malformed.
pub(crate) fn decode_answer(body: &[u8]) -> Result<Answer, RequestError> {
    serde_json::from_slice(body)
        .map_err(|e| RequestError::malformed(format!("invalid answer body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_answer_requires_answer_field() {
        assert!(matches!(
            decode_answer(br#"{"error":"nope"}"#),
            Err(RequestError::MalformedResponse(_))
        ));
        assert!(matches!(
            decode_answer(b"<html>"),
            Err(RequestError::MalformedResponse(_))
        ));
        assert_eq!(
            decode_answer(br#"{"answer":"Hi there"}"#).expect("answer").text,
            "Hi there"
        );
    }

    #[test]
    fn request_trims_question_and_drops_blank_chat_id() {
        let req = StreamRequest::new("  what is a fever?  ", Some(ChatId::new("  "))).expect("req");
        assert_eq!(req.question(), "what is a fever?");
        assert!(req.chat_id().is_none());
    }

    #[test]
    fn request_rejects_empty_question() {
        let err = StreamRequest::new("   ", None).expect_err("empty");
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn body_serializes_wire_field_names() {
        let req = StreamRequest::new("hi", Some(ChatId::new("c-1"))).expect("req");
        let value = serde_json::to_value(req.body()).expect("json");
        assert_eq!(value, serde_json::json!({"question": "hi", "chatId": "c-1"}));

        let req = StreamRequest::new("hi", None).expect("req");
        let value = serde_json::to_value(req.body()).expect("json");
        assert_eq!(value, serde_json::json!({"question": "hi"}));
    }

    #[test]
    fn answer_parses_single_shot_metadata() {
        let answer: Answer = serde_json::from_value(serde_json::json!({
            "answer": "Rest and fluids.",
            "chatId": "c-9",
            "timestamp": "2025-01-02T03:04:05.123456",
            "contextUsed": true,
            "questionType": "medical"
        }))
        .expect("answer");
        assert_eq!(answer.text, "Rest and fluids.");
        assert_eq!(answer.chat_id, Some(ChatId::new("c-9")));
        assert_eq!(answer.context_used, Some(true));
        assert_eq!(answer.in_domain(), Some(true));
        assert!(answer.advisory().is_none());
    }

    #[test]
    fn medical_flag_wins_over_intent() {
        let answer: Answer = serde_json::from_value(serde_json::json!({
            "answer": "Hello!",
            "intent": "medical",
            "medical": false
        }))
        .expect("answer");
        assert_eq!(answer.in_domain(), Some(false));
        assert!(answer.advisory().is_some());
    }

    #[test]
    fn non_medical_intent_is_advisory_only() {
        let answer: Answer =
            serde_json::from_value(serde_json::json!({"answer": "Hi!", "intent": "greeting"}))
                .expect("answer");
        assert_eq!(answer.in_domain(), Some(false));
        assert!(Answer::from_text("x").in_domain().is_none());
    }
}
