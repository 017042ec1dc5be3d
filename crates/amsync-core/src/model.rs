//! Domain model: enums that drive client/auth selection, the pipeline
//! step state machine, and the resource vocabulary the fill engines
//! dispatch on.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Target AM environment. The base-URL mapping for each variant lives in
/// configuration, not in code, so that it can be changed without a
/// rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prd,
    Dev,
    Tei,
    Aim,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Environment::Prd => "prd",
            Environment::Dev => "dev",
            Environment::Tei => "tei",
            Environment::Aim => "aim",
        };
        f.write_str(s)
    }
}

/// Supported authentication mechanisms for the upstream requesters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Signed bearer token from a private key + client id.
    Jwt,
    /// Mutual TLS client certificate.
    Cert,
    /// A fixed opaque session cookie supplied at runtime.
    Cookie,
}

/// Monotonic pipeline step marker, persisted in the state store's `params`
/// collection and advanced by the Pipeline Controller. Ordering matters:
/// the controller never regresses a step, only advances it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbStep {
    CreateDb,
    InitialFill,
    ExtraDataFill,
    CreateIndexes,
    ApplyConstraints,
    FinalSync,
}

impl DbStep {
    fn rank(self) -> u8 {
        match self {
            DbStep::CreateDb => 0,
            DbStep::InitialFill => 1,
            DbStep::ExtraDataFill => 2,
            DbStep::CreateIndexes => 3,
            DbStep::ApplyConstraints => 4,
            DbStep::FinalSync => 5,
        }
    }

    /// The step that follows this one, or `None` if this is the last step.
    pub fn next(self) -> Option<DbStep> {
        match self {
            DbStep::CreateDb => Some(DbStep::InitialFill),
            DbStep::InitialFill => Some(DbStep::ExtraDataFill),
            DbStep::ExtraDataFill => Some(DbStep::CreateIndexes),
            DbStep::CreateIndexes => Some(DbStep::ApplyConstraints),
            DbStep::ApplyConstraints => Some(DbStep::FinalSync),
            DbStep::FinalSync => None,
        }
    }
}

impl PartialOrd for DbStep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl Ord for DbStep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A resource the Initial Fill Engine knows how to populate. Variants
/// correspond 1:1 to AM collections rather than being a free-form string,
/// so dependency-group wiring is exhaustiveness-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Assettypes,
    Relatietypes,
    Bestekken,
    Bestekkoppelingen,
    Toezichtgroepen,
    Identiteiten,
    Beheerders,
    Agents,
    Betrokkenerelaties,
    Assets,
    Assetrelaties,
}

impl ResourceKind {
    /// The collection name used both in ArangoDB and as the `fill_<name>`
    /// progress-document suffix.
    pub fn collection_name(self) -> &'static str {
        match self {
            ResourceKind::Assettypes => "assettypes",
            ResourceKind::Relatietypes => "relatietypes",
            ResourceKind::Bestekken => "bestekken",
            ResourceKind::Bestekkoppelingen => "bestekkoppelingen",
            ResourceKind::Toezichtgroepen => "toezichtgroepen",
            ResourceKind::Identiteiten => "identiteiten",
            ResourceKind::Beheerders => "beheerders",
            ResourceKind::Agents => "agents",
            ResourceKind::Betrokkenerelaties => "betrokkenerelaties",
            ResourceKind::Assets => "assets",
            ResourceKind::Assetrelaties => "assetrelaties",
        }
    }
}

/// The four relation-type short names that get a derived, rebuilt edge
/// collection in the Extra Fill Engine.
pub const DERIVED_RELATION_TYPES: [&str; 4] = ["Voedt", "Sturing", "Bevestiging", "HoortBij"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_step_ordering_is_monotonic() {
        assert!(DbStep::CreateDb < DbStep::InitialFill);
        assert!(DbStep::InitialFill < DbStep::ExtraDataFill);
        assert!(DbStep::ExtraDataFill < DbStep::CreateIndexes);
        assert!(DbStep::CreateIndexes < DbStep::ApplyConstraints);
        assert!(DbStep::ApplyConstraints < DbStep::FinalSync);
    }

    #[test]
    fn db_step_next_terminates_at_final_sync() {
        assert_eq!(DbStep::FinalSync.next(), None);
        assert_eq!(DbStep::CreateDb.next(), Some(DbStep::InitialFill));
    }
}
