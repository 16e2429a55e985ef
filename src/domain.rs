use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CrosswalkError;

/// One label space. `Name` is the free-text pivot every id space maps through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    EmilieId,
    BiigleId,
    GuillaumeId,
    Name,
}

impl Namespace {
    pub const ID_SPACES: [Namespace; 3] = [
        Namespace::EmilieId,
        Namespace::BiigleId,
        Namespace::GuillaumeId,
    ];

    pub fn is_id_space(self) -> bool {
        !matches!(self, Namespace::Name)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Namespace::EmilieId | Namespace::BiigleId)
    }

    /// Column (CSV) or key (JSON) that carries labels of this namespace by default.
    pub fn default_column(self) -> &'static str {
        match self {
            Namespace::EmilieId => "class",
            Namespace::BiigleId => "label_id",
            Namespace::GuillaumeId => "guillaume_id",
            Namespace::Name => "label_name",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::EmilieId => write!(f, "emilie-id"),
            Namespace::BiigleId => write!(f, "biigle-id"),
            Namespace::GuillaumeId => write!(f, "guillaume-id"),
            Namespace::Name => write!(f, "name"),
        }
    }
}

impl FromStr for Namespace {
    type Err = CrosswalkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "emilie-id" | "emilie" => Ok(Namespace::EmilieId),
            "biigle-id" | "biigle" => Ok(Namespace::BiigleId),
            "guillaume-id" | "guillaume" => Ok(Namespace::GuillaumeId),
            "name" | "label-name" => Ok(Namespace::Name),
            _ => Err(CrosswalkError::Usage(format!(
                "unknown namespace {value:?}"
            ))),
        }
    }
}

/// A validated identifier within one id namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(String);

impl LabelId {
    pub fn parse(namespace: Namespace, value: &str) -> Result<Self, CrosswalkError> {
        let trimmed = value.trim();
        let invalid = || CrosswalkError::InvalidLabelId {
            namespace,
            value: value.to_string(),
        };
        match namespace {
            Namespace::EmilieId | Namespace::BiigleId => {
                let number: u64 = trimmed.parse().map_err(|_| invalid())?;
                Ok(Self(number.to_string()))
            }
            Namespace::GuillaumeId => {
                let normalized = trimmed.to_ascii_lowercase();
                if !guillaume_code_regex().is_match(&normalized) {
                    return Err(invalid());
                }
                Ok(Self(normalized))
            }
            Namespace::Name => Err(invalid()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn guillaume_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{1,8}\d{1,6}[a-z]?$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId {
    pub namespace: Namespace,
    pub id: LabelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Taxon {
    pub canonical_name: String,
    pub external_ids: Vec<ExternalId>,
}

impl Taxon {
    pub fn id_in(&self, namespace: Namespace) -> Option<&LabelId> {
        self.external_ids
            .iter()
            .find(|ext| ext.namespace == namespace)
            .map(|ext| &ext.id)
    }
}

/// Trims and collapses internal whitespace runs to a single space.
pub fn normalize_name(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub source: Namespace,
    pub target: Namespace,
    pub table_version: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn numeric_ids_strip_padding() {
        let id = LabelId::parse(Namespace::BiigleId, " 004200 ").unwrap();
        assert_eq!(id.as_str(), "4200");
    }

    #[test]
    fn numeric_ids_reject_codes() {
        let err = LabelId::parse(Namespace::EmilieId, "in87").unwrap_err();
        assert_matches!(err, CrosswalkError::InvalidLabelId { .. });
    }

    #[test]
    fn guillaume_codes_lowercase() {
        let id = LabelId::parse(Namespace::GuillaumeId, "IN87").unwrap();
        assert_eq!(id.as_str(), "in87");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_name("  Willemia  anophthalma "),
            "Willemia anophthalma"
        );
    }

    #[test]
    fn namespace_from_str_aliases() {
        assert_eq!("biigle".parse::<Namespace>().unwrap(), Namespace::BiigleId);
        assert_eq!(
            "emilie_id".parse::<Namespace>().unwrap(),
            Namespace::EmilieId
        );
    }
}
