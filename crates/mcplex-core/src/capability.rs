//! Capability flags negotiated during the initialization handshake.
//!
//! Capabilities are mostly opaque bags of optional markers: the runtime
//! inspects only the subsets it acts on (tasks, sampling, elicitation,
//! roots) and passes everything else through untouched, including
//! `experimental` and unknown keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client capabilities advertised during initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Roots (file system access) capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Sampling capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// Elicitation capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
    /// Task capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskCapability>,
    /// Experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// Any capability keys this runtime does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ClientCapabilities {
    /// Create empty capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable roots support.
    #[must_use]
    pub fn with_roots(mut self) -> Self {
        self.roots = Some(RootsCapability::default());
        self
    }

    /// Enable roots support with change notifications.
    #[must_use]
    pub fn with_roots_and_changes(mut self) -> Self {
        self.roots = Some(RootsCapability {
            list_changed: Some(true),
        });
        self
    }

    /// Enable sampling support.
    #[must_use]
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability::default());
        self
    }

    /// Enable form-mode elicitation support.
    ///
    /// The explicit form marker is always emitted even though an empty
    /// elicitation object is accepted inbound as equivalent.
    #[must_use]
    pub fn with_elicitation(mut self) -> Self {
        self.elicitation = Some(ElicitationCapability::form());
        self
    }

    /// Enable form- and url-mode elicitation support.
    #[must_use]
    pub fn with_elicitation_url_mode(mut self) -> Self {
        self.elicitation = Some(ElicitationCapability::form_and_url());
        self
    }

    /// Enable task support.
    #[must_use]
    pub fn with_tasks(mut self) -> Self {
        self.tasks = Some(TaskCapability::default());
        self
    }

    /// Check if roots are supported.
    #[must_use]
    pub fn has_roots(&self) -> bool {
        self.roots.is_some()
    }

    /// Check if sampling is supported.
    #[must_use]
    pub fn has_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Check if form-mode elicitation is supported.
    #[must_use]
    pub fn has_elicitation(&self) -> bool {
        self.elicitation.as_ref().is_some_and(ElicitationCapability::supports_form)
    }

    /// Check if url-mode elicitation is supported.
    #[must_use]
    pub fn has_url_elicitation(&self) -> bool {
        self.elicitation.as_ref().is_some_and(ElicitationCapability::supports_url)
    }

    /// Check if tasks are supported.
    #[must_use]
    pub fn has_tasks(&self) -> bool {
        self.tasks.is_some()
    }

    /// Merge explicit overrides over inferred capabilities, field by field.
    ///
    /// `self` is the explicit side; any field it sets wins over `inferred`.
    #[must_use]
    pub fn merged_over(self, inferred: Self) -> Self {
        let mut other = inferred.other;
        other.extend(self.other);
        Self {
            roots: self.roots.or(inferred.roots),
            sampling: self.sampling.or(inferred.sampling),
            elicitation: self.elicitation.or(inferred.elicitation),
            tasks: self.tasks.or(inferred.tasks),
            experimental: self.experimental.or(inferred.experimental),
            other,
        }
    }
}

/// Server capabilities advertised during initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Task capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskCapability>,
    /// Logging capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// Any capability keys this runtime does not interpret
    /// (tools, resources, prompts, completions, ...).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ServerCapabilities {
    /// Create empty capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable task support.
    #[must_use]
    pub fn with_tasks(mut self) -> Self {
        self.tasks = Some(TaskCapability::default());
        self
    }

    /// Check if tasks are supported.
    #[must_use]
    pub fn has_tasks(&self) -> bool {
        self.tasks.is_some()
    }

    /// Merge explicit overrides over inferred capabilities, field by field.
    #[must_use]
    pub fn merged_over(self, inferred: Self) -> Self {
        let mut other = inferred.other;
        other.extend(self.other);
        Self {
            tasks: self.tasks.or(inferred.tasks),
            logging: self.logging.or(inferred.logging),
            experimental: self.experimental.or(inferred.experimental),
            other,
        }
    }
}

/// Roots capability marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootsCapability {
    /// Whether the client emits `notifications/roots/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling capability marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingCapability {
    /// Whether sampling requests may carry tool definitions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    /// Unknown sub-markers, passed through.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Elicitation capability marker.
///
/// An empty object is spec-equivalent to form-mode support; this runtime
/// accepts the empty form inbound but always emits the explicit marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElicitationCapability {
    /// Form-mode marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Value>,
    /// Url-mode marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    /// Unknown sub-markers, passed through.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ElicitationCapability {
    /// Explicit form-mode capability.
    #[must_use]
    pub fn form() -> Self {
        Self {
            form: Some(Value::Object(Map::new())),
            ..Self::default()
        }
    }

    /// Form- and url-mode capability.
    #[must_use]
    pub fn form_and_url() -> Self {
        Self {
            form: Some(Value::Object(Map::new())),
            url: Some(Value::Object(Map::new())),
            other: Map::new(),
        }
    }

    /// Whether form-mode elicitation is supported.
    ///
    /// An entirely empty capability object counts as form support.
    #[must_use]
    pub fn supports_form(&self) -> bool {
        self.form.is_some() || (self.url.is_none() && self.other.is_empty())
    }

    /// Whether url-mode elicitation is supported.
    #[must_use]
    pub fn supports_url(&self) -> bool {
        self.url.is_some()
    }
}

/// Task capability marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCapability {
    /// Which request methods may be task-augmented, keyed by method name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<Value>,
    /// Unknown sub-markers, passed through.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_pass_through() {
        let caps: ServerCapabilities = serde_json::from_value(json!({
            "tools": {"listChanged": true},
            "tasks": {},
        }))
        .unwrap();
        assert!(caps.has_tasks());
        assert_eq!(caps.other["tools"]["listChanged"], json!(true));

        let back = serde_json::to_value(&caps).unwrap();
        assert_eq!(back["tools"]["listChanged"], json!(true));
    }

    #[test]
    fn test_empty_elicitation_counts_as_form() {
        let caps: ClientCapabilities =
            serde_json::from_value(json!({"elicitation": {}})).unwrap();
        assert!(caps.has_elicitation());
        assert!(!caps.has_url_elicitation());
    }

    #[test]
    fn test_explicit_form_marker_emitted() {
        let caps = ClientCapabilities::new().with_elicitation();
        let wire = serde_json::to_value(&caps).unwrap();
        assert_eq!(wire, json!({"elicitation": {"form": {}}}));
    }

    #[test]
    fn test_url_only_is_not_form() {
        let caps: ClientCapabilities =
            serde_json::from_value(json!({"elicitation": {"url": {}}})).unwrap();
        assert!(!caps.has_elicitation());
        assert!(caps.has_url_elicitation());
    }

    #[test]
    fn test_merge_explicit_wins() {
        let explicit = ClientCapabilities::new().with_sampling();
        let inferred = ClientCapabilities::new().with_roots().with_sampling();
        let merged = explicit.merged_over(inferred);
        assert!(merged.has_roots());
        assert!(merged.has_sampling());
        assert!(!merged.has_elicitation());
    }
}
