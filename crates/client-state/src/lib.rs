//! Parses `client_state` (§4.8, §6.2) into a typed [`RoutingSpec`].
//!
//! `client_state` is a stringly-typed, 128-character-limited configuration
//! blob echoed on every notification. We parse it exactly once per
//! notification and never pass the raw string past this crate's boundary —
//! see the "configuration-as-string vs typed spec" design note.

mod grammar;

use std::fmt;

pub use grammar::parse;

/// Platform limit on the wire form of `client_state`.
pub const MAX_CLIENT_STATE_LEN: usize = 128;

/// The payload-shaping mode a `forward` destination asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ForwardMode {
    Simple,
    WithData,
    WithChanges,
}

impl Default for ForwardMode {
    fn default() -> Self {
        ForwardMode::Simple
    }
}

/// An RPA environment preset selector. `Dev`/`Prod` resolve against the
/// built-in preset table; anything else is a custom tag the caller must
/// supply per-call overrides for.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TenantTag {
    Dev,
    Prod,
    Custom(String),
}

impl fmt::Display for TenantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantTag::Dev => f.write_str("DEV"),
            TenantTag::Prod => f.write_str("PROD"),
            TenantTag::Custom(tag) => f.write_str(tag),
        }
    }
}

impl TenantTag {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "DEV" => TenantTag::Dev,
            "PROD" => TenantTag::Prod,
            _ => TenantTag::Custom(raw.to_string()),
        }
    }
}

/// A single routing target parsed from one `;`-or-`|`-delimited chunk of
/// `client_state`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Destination {
    Forward {
        url: String,
        mode: ForwardMode,
        include_fields: Option<Vec<String>>,
        exclude_fields: Option<Vec<String>>,
        change_detection_enabled: bool,
    },
    RpaQueue {
        handler_name: String,
        queue_name: Option<String>,
        tenant_tag: Option<TenantTag>,
        folder_id: Option<String>,
        label: Option<String>,
    },
    None,
}

impl Destination {
    /// True when dispatching this destination requires a current-state
    /// fetch from the platform (§4.1 step 4).
    pub fn requires_item_data(&self) -> bool {
        match self {
            Destination::Forward {
                mode,
                change_detection_enabled,
                ..
            } => *mode != ForwardMode::Simple || *change_detection_enabled,
            Destination::RpaQueue { .. } => true,
            Destination::None => false,
        }
    }

    pub fn change_detection_enabled(&self) -> bool {
        matches!(
            self,
            Destination::Forward {
                change_detection_enabled: true,
                ..
            }
        )
    }
}

/// The parsed, typed form of `client_state`: zero or more destinations.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoutingSpec {
    pub destinations: Vec<Destination>,
}

impl RoutingSpec {
    pub fn requires_item_data(&self) -> bool {
        self.destinations.iter().any(Destination::requires_item_data)
    }

    pub fn any_change_detection_enabled(&self) -> bool {
        self.destinations.iter().any(Destination::change_detection_enabled)
    }
}

/// A single destination chunk failed to parse into anything routable. The
/// containing [`RoutingSpec`] still gets built from whatever destinations
/// did parse — a bad chunk never fails the whole `client_state` (§4.8).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    #[error("destination key missing or unrecognized")]
    UnknownDestinationKind,
    #[error("forward destination requires an https url")]
    MissingOrInsecureUrl,
}
