//! Protocol version types and negotiation.
//!
//! The client offers its latest supported version in
//! `initialize.params.protocolVersion`; the server answers with the version
//! it will use. The client must disconnect when the answered version is not
//! in its supported set.
//!
//! # Example
//!
//! ```rust
//! use mcplex_core::protocol_version::ProtocolVersion;
//!
//! let version: ProtocolVersion = "2025-06-18".parse().unwrap();
//! assert!(version < ProtocolVersion::LATEST);
//! assert!(!version.supports_tasks());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// MCP protocol versions in chronological order.
///
/// The ordering is:
/// `V2024_11_05 < V2025_03_26 < V2025_06_18 < V2025_11_25`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ProtocolVersion {
    /// Original MCP specification (November 2024).
    V2024_11_05,
    /// OAuth 2.1 and Streamable HTTP update (March 2025). Adds JSON-RPC
    /// batching (removed again in 2025-06-18).
    V2025_03_26,
    /// Elicitation and `_meta` update (June 2025).
    V2025_06_18,
    /// Tasks update (November 2025): task-augmented requests, task polling,
    /// sampling with tools.
    V2025_11_25,
}

impl ProtocolVersion {
    /// The latest supported protocol version.
    pub const LATEST: Self = Self::V2025_11_25;

    /// All supported versions in chronological order.
    pub const ALL: &'static [Self] = &[
        Self::V2024_11_05,
        Self::V2025_03_26,
        Self::V2025_06_18,
        Self::V2025_11_25,
    ];

    /// Returns the string representation used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V2024_11_05 => "2024-11-05",
            Self::V2025_03_26 => "2025-03-26",
            Self::V2025_06_18 => "2025-06-18",
            Self::V2025_11_25 => "2025-11-25",
        }
    }

    /// Whether this version supports task-augmented requests.
    #[must_use]
    pub const fn supports_tasks(&self) -> bool {
        matches!(self, Self::V2025_11_25)
    }

    /// Whether this version supports elicitation.
    #[must_use]
    pub const fn supports_elicitation(&self) -> bool {
        matches!(self, Self::V2025_06_18 | Self::V2025_11_25)
    }

    /// Whether this version supports `_meta` fields on messages.
    #[must_use]
    pub const fn supports_meta(&self) -> bool {
        matches!(self, Self::V2025_06_18 | Self::V2025_11_25)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = UnknownProtocolVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2024-11-05" => Ok(Self::V2024_11_05),
            "2025-03-26" => Ok(Self::V2025_03_26),
            "2025-06-18" => Ok(Self::V2025_06_18),
            "2025-11-25" => Ok(Self::V2025_11_25),
            _ => Err(UnknownProtocolVersion {
                version: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = UnknownProtocolVersion;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(v: ProtocolVersion) -> Self {
        v.as_str().to_string()
    }
}

/// Error returned when parsing an unrecognized protocol version string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown protocol version: {version}")]
pub struct UnknownProtocolVersion {
    /// The unrecognized version string.
    pub version: String,
}

/// Check whether a wire version string is in the supported set.
#[must_use]
pub fn is_version_supported(version: &str) -> bool {
    version.parse::<ProtocolVersion>().is_ok()
}

/// Pick the version a responder should answer an `initialize` with.
///
/// When the requested version is supported it is echoed back; otherwise the
/// responder offers its latest.
#[must_use]
pub fn negotiate(requested: &str) -> ProtocolVersion {
    requested
        .parse()
        .unwrap_or(ProtocolVersion::LATEST)
}
