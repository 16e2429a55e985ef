use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::Namespace;
use crate::error::CrosswalkError;
use crate::table::{AliasEntry, ConflictPolicy, CrosswalkTable, TableEntry};

/// A label-tree snapshot as stored on disk.
#[derive(Debug, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SnapshotEntry {
    Triple(TripleEntry),
    Taxon(TaxonEntry),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TripleEntry {
    pub namespace: Namespace,
    pub id: RawId,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonEntry {
    pub name: String,
    #[serde(default)]
    pub emilie_id: Option<RawId>,
    #[serde(default)]
    pub biigle_id: Option<RawId>,
    #[serde(default)]
    pub guillaume_id: Option<RawId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawId {
    Numeric(u64),
    Code(String),
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawId::Numeric(value) => write!(f, "{value}"),
            RawId::Code(value) => write!(f, "{value}"),
        }
    }
}

/// Biigle `label_trees.json` export: a list of trees, each with flat labels.
#[derive(Debug, Deserialize)]
pub struct BiigleLabelTree {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Vec<BiigleLabel>,
}

#[derive(Debug, Deserialize)]
pub struct BiigleLabel {
    pub id: Option<u64>,
    pub name: Option<String>,
}

pub struct SnapshotLoader;

impl SnapshotLoader {
    /// Loads and validates a snapshot file. Either a native snapshot object or a
    /// Biigle label tree export is accepted.
    pub fn load(path: &Utf8Path, policy: ConflictPolicy) -> Result<CrosswalkTable, CrosswalkError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| CrosswalkError::SnapshotRead(path.to_path_buf()))?;
        let fallback_version = path.file_stem().unwrap_or("snapshot").to_string();
        Self::load_str(&content, &fallback_version, policy)
    }

    pub fn load_str(
        content: &str,
        fallback_version: &str,
        policy: ConflictPolicy,
    ) -> Result<CrosswalkTable, CrosswalkError> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|err| CrosswalkError::SnapshotParse(err.to_string()))?;
        if value.is_array() {
            let trees: Vec<BiigleLabelTree> = serde_json::from_value(value)
                .map_err(|err| CrosswalkError::SnapshotParse(err.to_string()))?;
            return Self::resolve_biigle(trees, fallback_version, policy);
        }
        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|err| CrosswalkError::SnapshotParse(err.to_string()))?;
        Self::resolve_snapshot(snapshot, fallback_version, policy)
    }

    pub fn load_many(
        paths: &[Utf8PathBuf],
        policy: ConflictPolicy,
    ) -> Result<CrosswalkTable, CrosswalkError> {
        let mut iter = paths.iter();
        let first = iter
            .next()
            .ok_or_else(|| CrosswalkError::SnapshotParse("no snapshot given".to_string()))?;
        let mut table = Self::load(first, policy)?;
        for path in iter {
            let next = Self::load(path, policy)?;
            table = table.merge(&next, policy)?;
        }
        Ok(table)
    }

    pub fn resolve_snapshot(
        snapshot: Snapshot,
        fallback_version: &str,
        policy: ConflictPolicy,
    ) -> Result<CrosswalkTable, CrosswalkError> {
        let schema_version = snapshot.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(CrosswalkError::SnapshotParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }
        let version = snapshot
            .version
            .unwrap_or_else(|| fallback_version.to_string());

        let mut triples = Vec::new();
        let mut bare_names = Vec::new();
        for entry in snapshot.entries {
            match entry {
                SnapshotEntry::Triple(obj) => {
                    triples.push(TableEntry::new(obj.namespace, obj.id, obj.name));
                }
                SnapshotEntry::Taxon(obj) => {
                    let ids = [
                        (Namespace::EmilieId, obj.emilie_id),
                        (Namespace::BiigleId, obj.biigle_id),
                        (Namespace::GuillaumeId, obj.guillaume_id),
                    ];
                    let before = triples.len();
                    for (namespace, id) in ids {
                        if let Some(id) = id {
                            triples.push(TableEntry::new(namespace, id, obj.name.clone()));
                        }
                    }
                    if triples.len() == before {
                        bare_names.push(obj.name);
                    }
                }
            }
        }

        // Aliases may point at id-less names, so those are registered first.
        let mut table = CrosswalkTable::build(version, triples, Vec::new(), policy)?;
        for name in &bare_names {
            table.insert_name(name)?;
        }
        table.add_aliases(snapshot.aliases, policy)?;
        tracing::info!(
            version = %table.version(),
            taxa = table.len(),
            normalized = table.notices().len(),
            "loaded label snapshot"
        );
        Ok(table)
    }

    pub fn resolve_biigle(
        trees: Vec<BiigleLabelTree>,
        version: &str,
        policy: ConflictPolicy,
    ) -> Result<CrosswalkTable, CrosswalkError> {
        let mut entries = Vec::new();
        for tree in trees {
            for label in tree.labels {
                let (Some(id), Some(name)) = (label.id, label.name) else {
                    tracing::debug!(tree = ?tree.name, "skipping incomplete Biigle label");
                    continue;
                };
                entries.push(TableEntry::new(Namespace::BiigleId, id, name));
            }
        }
        let table = CrosswalkTable::build(version, entries, Vec::new(), policy)?;
        tracing::info!(
            version = %table.version(),
            taxa = table.len(),
            "loaded Biigle label trees"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxon_shorthand_expands_to_triples() {
        let json = r#"{
            "version": "2023-09-27",
            "entries": [
                {"name": "Acari", "emilie_id": 5, "biigle_id": "4200", "guillaume_id": "in87"},
                {"namespace": "emilie-id", "id": 1, "name": "Unclassified"}
            ]
        }"#;
        let table = SnapshotLoader::load_str(json, "fallback", ConflictPolicy::Reject).unwrap();
        assert_eq!(table.version(), "2023-09-27");
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup_by_id(Namespace::GuillaumeId, "in87").unwrap(),
            "Acari"
        );
    }
}
