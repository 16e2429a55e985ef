use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{ExternalId, LabelId, Namespace, Taxon, normalize_name};
use crate::error::CrosswalkError;

/// What to do when two entries claim the same key with different values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Overwrite,
    KeepExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub namespace: Namespace,
    pub id: String,
    pub name: String,
}

impl TableEntry {
    pub fn new(namespace: Namespace, id: impl ToString, name: impl Into<String>) -> Self {
        Self {
            namespace,
            id: id.to_string(),
            name: name.into(),
        }
    }
}

/// A variant name that collapses onto a canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub name: String,
    pub canonical: String,
}

/// A name that only became valid after whitespace normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameNotice {
    pub raw: String,
    pub normalized: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    Exact,
    Alias,
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Translated,
    AlreadyTranslated,
    /// Resolved only after whitespace normalization of the original value.
    Normalized { original: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub value: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct CrosswalkTable {
    version: String,
    ids: BTreeMap<(Namespace, LabelId), String>,
    names: BTreeMap<String, BTreeMap<Namespace, LabelId>>,
    aliases: BTreeMap<String, String>,
    notices: Vec<NameNotice>,
}

impl CrosswalkTable {
    pub fn build(
        version: impl Into<String>,
        entries: impl IntoIterator<Item = TableEntry>,
        aliases: impl IntoIterator<Item = AliasEntry>,
        policy: ConflictPolicy,
    ) -> Result<Self, CrosswalkError> {
        let mut table = Self {
            version: version.into(),
            ..Self::default()
        };
        for entry in entries {
            if !entry.namespace.is_id_space() {
                return Err(CrosswalkError::InvalidEntry(format!(
                    "{:?} cannot be keyed in the name namespace",
                    entry.name
                )));
            }
            let id = LabelId::parse(entry.namespace, &entry.id)?;
            let name = table.normalize_incoming(&entry.name)?;
            table.insert(entry.namespace, id, name, policy)?;
        }
        table.add_aliases(aliases, policy)?;
        tracing::debug!(
            version = %table.version,
            taxa = table.names.len(),
            ids = table.ids.len(),
            aliases = table.aliases.len(),
            "crosswalk table built"
        );
        Ok(table)
    }

    /// Strict build from bare triples.
    pub fn from_entries(
        version: impl Into<String>,
        entries: impl IntoIterator<Item = TableEntry>,
    ) -> Result<Self, CrosswalkError> {
        Self::build(version, entries, Vec::new(), ConflictPolicy::Reject)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn notices(&self) -> &[NameNotice] {
        &self.notices
    }

    pub fn aliases(&self) -> impl Iterator<Item = AliasEntry> + '_ {
        self.aliases.iter().map(|(name, canonical)| AliasEntry {
            name: name.clone(),
            canonical: canonical.clone(),
        })
    }

    pub fn taxa(&self) -> Vec<Taxon> {
        self.names
            .iter()
            .map(|(name, ids)| Taxon {
                canonical_name: name.clone(),
                external_ids: ids
                    .iter()
                    .map(|(namespace, id)| ExternalId {
                        namespace: *namespace,
                        id: id.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn add_aliases(
        &mut self,
        aliases: impl IntoIterator<Item = AliasEntry>,
        policy: ConflictPolicy,
    ) -> Result<(), CrosswalkError> {
        for alias in aliases {
            self.insert_alias(&alias.name, &alias.canonical, policy)?;
        }
        Ok(())
    }

    /// Registers a canonical name that carries no id yet.
    pub fn insert_name(&mut self, name: &str) -> Result<(), CrosswalkError> {
        let name = self.normalize_incoming(name)?;
        self.names.entry(name).or_default();
        Ok(())
    }

    pub fn lookup_by_id(&self, namespace: Namespace, id: &str) -> Result<&str, CrosswalkError> {
        let unknown = || CrosswalkError::UnknownLabel {
            namespace,
            value: id.to_string(),
        };
        let parsed = LabelId::parse(namespace, id).map_err(|_| unknown())?;
        self.ids
            .get(&(namespace, parsed))
            .map(String::as_str)
            .ok_or_else(unknown)
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<Vec<ExternalId>, CrosswalkError> {
        let (canonical, _) = self
            .resolve_name(name)
            .ok_or_else(|| CrosswalkError::UnknownLabel {
                namespace: Namespace::Name,
                value: name.to_string(),
            })?;
        Ok(self.ids_for(canonical))
    }

    /// Resolves a free-text name to its canonical form, reporting how it matched.
    pub fn resolve_name(&self, value: &str) -> Option<(&str, NameMatch)> {
        if let Some((name, _)) = self.names.get_key_value(value) {
            return Some((name.as_str(), NameMatch::Exact));
        }
        if let Some(canonical) = self.aliases.get(value) {
            return Some((canonical.as_str(), NameMatch::Alias));
        }
        let normalized = normalize_name(value);
        if normalized == value {
            return None;
        }
        if let Some((name, _)) = self.names.get_key_value(&normalized) {
            return Some((name.as_str(), NameMatch::Whitespace));
        }
        self.aliases
            .get(&normalized)
            .map(|canonical| (canonical.as_str(), NameMatch::Whitespace))
    }

    /// True when `value` is already a valid, known label in `namespace` as written.
    pub fn recognizes(&self, namespace: Namespace, value: &str) -> bool {
        match namespace {
            Namespace::Name => self.names.contains_key(value),
            _ => LabelId::parse(namespace, value)
                .map(|id| self.ids.contains_key(&(namespace, id)))
                .unwrap_or(false),
        }
    }

    /// Translates a single value, pivoting through the canonical name.
    pub fn translate_value(
        &self,
        value: &str,
        from: Namespace,
        to: Namespace,
    ) -> Result<Translation, CrosswalkError> {
        let (canonical, matched) = match from {
            Namespace::Name => {
                self.resolve_name(value)
                    .ok_or_else(|| CrosswalkError::UnknownLabel {
                        namespace: from,
                        value: value.to_string(),
                    })?
            }
            _ => (self.lookup_by_id(from, value)?, NameMatch::Exact),
        };

        let translated = match to {
            Namespace::Name => canonical.to_string(),
            _ => self
                .names
                .get(canonical)
                .and_then(|ids| ids.get(&to))
                .map(|id| id.as_str().to_string())
                .ok_or_else(|| CrosswalkError::UnknownLabel {
                    namespace: to,
                    value: canonical.to_string(),
                })?,
        };

        let outcome = match matched {
            NameMatch::Whitespace => Outcome::Normalized {
                original: value.to_string(),
            },
            NameMatch::Exact | NameMatch::Alias => Outcome::Translated,
        };
        Ok(Translation {
            value: translated,
            outcome,
        })
    }

    /// Like [`translate_value`](Self::translate_value), but a value that is already a
    /// valid `to` label passes through, so re-applying a translation is a no-op.
    pub fn translate_idempotent(
        &self,
        value: &str,
        from: Namespace,
        to: Namespace,
    ) -> Result<Translation, CrosswalkError> {
        if self.recognizes(to, value) {
            return Ok(Translation {
                value: value.to_string(),
                outcome: Outcome::AlreadyTranslated,
            });
        }
        self.translate_value(value, from, to)
    }

    /// Combines two snapshots, e.g. to chain a biigle→emilie pass with an id→name pass.
    pub fn merge(
        &self,
        other: &CrosswalkTable,
        on_conflict: ConflictPolicy,
    ) -> Result<CrosswalkTable, CrosswalkError> {
        let mut merged = self.clone();
        merged.version = format!("{}+{}", self.version, other.version);
        for ((namespace, id), name) in &other.ids {
            merged.insert(*namespace, id.clone(), name.clone(), on_conflict)?;
        }
        for name in other.names.keys() {
            merged.names.entry(name.clone()).or_default();
        }
        for (alias, canonical) in &other.aliases {
            merged.insert_alias(alias, canonical, on_conflict)?;
        }
        for notice in &other.notices {
            if !merged.notices.contains(notice) {
                merged.notices.push(notice.clone());
            }
        }
        Ok(merged)
    }

    fn ids_for(&self, canonical: &str) -> Vec<ExternalId> {
        self.names
            .get(canonical)
            .map(|ids| {
                ids.iter()
                    .map(|(namespace, id)| ExternalId {
                        namespace: *namespace,
                        id: id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn normalize_incoming(&mut self, raw: &str) -> Result<String, CrosswalkError> {
        let normalized = normalize_name(raw);
        if normalized.is_empty() {
            return Err(CrosswalkError::InvalidEntry(format!(
                "empty label name {raw:?}"
            )));
        }
        if normalized != raw {
            let notice = NameNotice {
                raw: raw.to_string(),
                normalized: normalized.clone(),
            };
            if !self.notices.contains(&notice) {
                tracing::warn!(raw = ?raw, normalized = %normalized, "normalized label name");
                self.notices.push(notice);
            }
        }
        Ok(normalized)
    }

    fn insert(
        &mut self,
        namespace: Namespace,
        id: LabelId,
        name: String,
        policy: ConflictPolicy,
    ) -> Result<(), CrosswalkError> {
        if self.aliases.contains_key(&name) {
            return Err(CrosswalkError::InvalidEntry(format!(
                "{name:?} is declared both as an alias and as a canonical name"
            )));
        }

        let key = (namespace, id.clone());
        let id_conflict = self
            .ids
            .get(&key)
            .filter(|existing| **existing != name)
            .cloned();
        let name_conflict = self
            .names
            .get(&name)
            .and_then(|ids| ids.get(&namespace))
            .filter(|existing| **existing != id)
            .cloned();

        if id_conflict.is_none() && name_conflict.is_none() && self.ids.contains_key(&key) {
            return Ok(());
        }

        if let Some(existing) = &id_conflict {
            match policy {
                ConflictPolicy::Reject => {
                    return Err(CrosswalkError::DuplicateKeyConflict {
                        namespace,
                        key: id.to_string(),
                        existing: existing.clone(),
                        incoming: name,
                    });
                }
                ConflictPolicy::KeepExisting => return Ok(()),
                ConflictPolicy::Overwrite => {}
            }
        }
        if let Some(existing) = &name_conflict {
            match policy {
                ConflictPolicy::Reject => {
                    return Err(CrosswalkError::DuplicateKeyConflict {
                        namespace,
                        key: name,
                        existing: existing.to_string(),
                        incoming: id.to_string(),
                    });
                }
                ConflictPolicy::KeepExisting => return Ok(()),
                ConflictPolicy::Overwrite => {}
            }
        }

        if let Some(old_name) = id_conflict {
            tracing::warn!(%namespace, id = %id, old = %old_name, new = %name, "overwriting label id");
            if let Some(ids) = self.names.get_mut(&old_name) {
                ids.remove(&namespace);
            }
        }
        if let Some(old_id) = name_conflict {
            tracing::warn!(%namespace, name = %name, old = %old_id, new = %id, "overwriting label name");
            self.ids.remove(&(namespace, old_id));
        }

        self.ids.insert(key, name.clone());
        self.names.entry(name).or_default().insert(namespace, id);
        Ok(())
    }

    fn insert_alias(
        &mut self,
        alias: &str,
        canonical: &str,
        policy: ConflictPolicy,
    ) -> Result<(), CrosswalkError> {
        let alias = normalize_name(alias);
        let canonical = self.normalize_incoming(canonical)?;
        if !self.names.contains_key(&canonical) {
            return Err(CrosswalkError::InvalidEntry(format!(
                "alias {alias:?} points at unknown name {canonical:?}"
            )));
        }
        if self.names.contains_key(&alias) {
            return Err(CrosswalkError::InvalidEntry(format!(
                "alias {alias:?} shadows a canonical name"
            )));
        }
        match self.aliases.get(&alias) {
            Some(existing) if *existing == canonical => Ok(()),
            Some(existing) => match policy {
                ConflictPolicy::Reject => Err(CrosswalkError::DuplicateKeyConflict {
                    namespace: Namespace::Name,
                    key: alias,
                    existing: existing.clone(),
                    incoming: canonical,
                }),
                ConflictPolicy::KeepExisting => Ok(()),
                ConflictPolicy::Overwrite => {
                    self.aliases.insert(alias, canonical);
                    Ok(())
                }
            },
            None => {
                self.aliases.insert(alias, canonical);
                Ok(())
            }
        }
    }
}
