//! Naming collisions between packs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A namespace in which pack-exposed names must be unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// MCP server names
    ServerName,
    /// File destinations inside a scope
    FileDestination,
    /// Instruction document section ids
    TemplateSection,
    /// Component ids across packs
    ComponentId,
}

impl Namespace {
    /// Human-readable namespace name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServerName => "server name",
            Self::FileDestination => "file destination",
            Self::TemplateSection => "template section",
            Self::ComponentId => "component id",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One overlapping name between a candidate pack and an already registered one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collision {
    /// Where the names clash
    pub namespace: Namespace,
    /// The clashing name
    pub name: String,
    /// Pack being installed
    pub candidate_pack: String,
    /// Pack that already exposes the name
    pub existing_pack: String,
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' of pack '{}' is already used by pack '{}'",
            self.namespace, self.name, self.candidate_pack, self.existing_pack
        )
    }
}
