//! Elicitation, sampling, and roots parameter types.
//!
//! The runtime routes these requests; it does not interpret form schemas,
//! sampling content, or root URIs beyond the fields typed here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of `elicitation/create`.
///
/// Form mode carries a `requestedSchema`; url mode carries `mode: "url"`,
/// a `url`, and an `elicitationId` the completion notification refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitParams {
    /// Human-readable prompt shown to the user.
    pub message: String,
    /// Form mode: the schema describing the requested input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<Value>,
    /// Url mode marker ("url").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Url mode: the URL the user must visit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Url mode: identifier echoed by
    /// `notifications/elicitation/complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
    /// Request metadata (task relation, progress token).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ElicitParams {
    /// Create form-mode params.
    #[must_use]
    pub fn form(message: impl Into<String>, requested_schema: Value) -> Self {
        Self {
            message: message.into(),
            requested_schema: Some(requested_schema),
            ..Self::default()
        }
    }

    /// Create url-mode params.
    #[must_use]
    pub fn url_mode(
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            mode: Some("url".to_string()),
            url: Some(url.into()),
            elicitation_id: Some(elicitation_id.into()),
            ..Self::default()
        }
    }

    /// Whether these params are url mode.
    #[must_use]
    pub fn is_url_mode(&self) -> bool {
        self.mode.as_deref() == Some("url")
    }
}

/// The user's action in an elicitation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user submitted the requested input.
    Accept,
    /// The user explicitly declined.
    Decline,
    /// The user dismissed without deciding.
    Cancel,
}

/// Result of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    /// What the user did.
    pub action: ElicitAction,
    /// The submitted content when `action` is `accept` (form mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// Parameters of `notifications/elicitation/complete` (url mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationCompleteParams {
    /// The elicitation that finished.
    pub elicitation_id: String,
}

/// Parameters of `sampling/createMessage`.
///
/// Message content and model preferences are schema-opaque; only the
/// fields the runtime touches are typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessageParams {
    /// The conversation to sample from.
    pub messages: Vec<Value>,
    /// Request metadata (task relation, progress token).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Remaining sampling parameters (model preferences, system prompt,
    /// max tokens, tools, ...), passed through untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A root advertised by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// Root URI.
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// The advertised roots.
    pub roots: Vec<Root>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_mode_wire_shape() {
        let params = ElicitParams::form("Your name?", json!({"type": "object"}));
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["message"], "Your name?");
        assert_eq!(wire["requestedSchema"]["type"], "object");
        assert!(wire.get("mode").is_none());
        assert!(!params.is_url_mode());
    }

    #[test]
    fn test_url_mode_wire_shape() {
        let params = ElicitParams::url_mode("Sign in", "https://example.com/auth", "e-1");
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["mode"], "url");
        assert_eq!(wire["elicitationId"], "e-1");
        assert!(params.is_url_mode());
    }

    #[test]
    fn test_sampling_params_passthrough() {
        let params: CreateMessageParams = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": {"type": "text", "text": "hi"}}],
            "maxTokens": 100,
            "tools": [],
        }))
        .unwrap();
        assert_eq!(params.messages.len(), 1);
        assert_eq!(params.rest["maxTokens"], json!(100));

        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["maxTokens"], json!(100));
        assert!(wire.get("tools").is_some());
    }

    #[test]
    fn test_elicit_result_actions() {
        let result: ElicitResult =
            serde_json::from_value(json!({"action": "accept", "content": {"name": "x"}})).unwrap();
        assert_eq!(result.action, ElicitAction::Accept);

        let result: ElicitResult = serde_json::from_value(json!({"action": "decline"})).unwrap();
        assert_eq!(result.action, ElicitAction::Decline);
        assert!(result.content.is_none());
    }
}
