use assert_matches::assert_matches;

use label_crosswalk::domain::Namespace;
use label_crosswalk::error::CrosswalkError;
use label_crosswalk::table::{AliasEntry, ConflictPolicy, CrosswalkTable, Outcome, TableEntry};

fn entries() -> Vec<TableEntry> {
    vec![
        TableEntry::new(Namespace::EmilieId, 1, "Unclassified"),
        TableEntry::new(Namespace::EmilieId, 2, "Dirt"),
        TableEntry::new(Namespace::EmilieId, 5, "Acari"),
        TableEntry::new(Namespace::BiigleId, 4200, "Acari"),
        TableEntry::new(Namespace::GuillaumeId, "in87", "Acari"),
        TableEntry::new(Namespace::EmilieId, 8, "Willemia anophthalma"),
        TableEntry::new(Namespace::BiigleId, 4213, "Willemia anophthalma"),
    ]
}

#[test]
fn every_loaded_triple_round_trips_through_lookups() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    for entry in entries() {
        assert_eq!(
            table.lookup_by_id(entry.namespace, &entry.id).unwrap(),
            entry.name
        );
        let ids = table.lookup_by_name(&entry.name).unwrap();
        assert!(
            ids.iter()
                .any(|ext| ext.namespace == entry.namespace && ext.id.as_str() == entry.id),
            "{} missing from {:?}",
            entry.id,
            ids
        );
    }
}

#[test]
fn same_id_with_different_name_is_rejected() {
    let mut list = entries();
    list.push(TableEntry::new(Namespace::BiigleId, 4200, "Collembola"));
    let err = CrosswalkTable::from_entries("v1", list).unwrap_err();
    assert_matches!(
        err,
        CrosswalkError::DuplicateKeyConflict { namespace: Namespace::BiigleId, ref key, .. } if key == "4200"
    );
    assert!(err.is_table_error());
}

#[test]
fn overwrite_policy_lets_last_entry_win() {
    let mut list = entries();
    list.push(TableEntry::new(Namespace::BiigleId, 4200, "Collembola"));
    let table =
        CrosswalkTable::build("v1", list, Vec::new(), ConflictPolicy::Overwrite).unwrap();
    assert_eq!(
        table.lookup_by_id(Namespace::BiigleId, "4200").unwrap(),
        "Collembola"
    );
    let acari = table.lookup_by_name("Acari").unwrap();
    assert!(acari.iter().all(|ext| ext.namespace != Namespace::BiigleId));
}

#[test]
fn biigle_to_emilie_pivots_through_name() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let name = table
        .translate_value("4200", Namespace::BiigleId, Namespace::Name)
        .unwrap();
    assert_eq!(name.value, "Acari");
    let emilie = table
        .translate_value("4200", Namespace::BiigleId, Namespace::EmilieId)
        .unwrap();
    assert_eq!(emilie.value, "5");
}

#[test]
fn round_trip_returns_original_value() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let there = table
        .translate_value("in87", Namespace::GuillaumeId, Namespace::BiigleId)
        .unwrap();
    let back = table
        .translate_value(&there.value, Namespace::BiigleId, Namespace::GuillaumeId)
        .unwrap();
    assert_eq!(back.value, "in87");
}

#[test]
fn translating_twice_is_a_no_op() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let once = table
        .translate_idempotent("Acari", Namespace::Name, Namespace::BiigleId)
        .unwrap();
    let twice = table
        .translate_idempotent(&once.value, Namespace::Name, Namespace::BiigleId)
        .unwrap();
    assert_eq!(once.value, twice.value);
    assert_eq!(twice.outcome, Outcome::AlreadyTranslated);
}

#[test]
fn unknown_id_is_reported_with_namespace() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let err = table
        .translate_value("9999", Namespace::BiigleId, Namespace::EmilieId)
        .unwrap_err();
    assert_matches!(
        err,
        CrosswalkError::UnknownLabel { namespace: Namespace::BiigleId, value } if value == "9999"
    );
}

#[test]
fn missing_target_id_is_unknown() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let err = table
        .translate_value("2", Namespace::EmilieId, Namespace::BiigleId)
        .unwrap_err();
    assert_matches!(err, CrosswalkError::UnknownLabel { namespace: Namespace::BiigleId, .. });
}

#[test]
fn double_space_name_is_flagged_not_silently_matched() {
    let table = CrosswalkTable::from_entries("v1", entries()).unwrap();
    let out = table
        .translate_value("Willemia  anophthalma", Namespace::Name, Namespace::EmilieId)
        .unwrap();
    assert_eq!(out.value, "8");
    assert_matches!(out.outcome, Outcome::Normalized { ref original } if original == "Willemia  anophthalma");
}

#[test]
fn normalized_table_names_are_recorded() {
    let table = CrosswalkTable::from_entries(
        "v1",
        vec![TableEntry::new(Namespace::EmilieId, 8, " Willemia  anophthalma")],
    )
    .unwrap();
    assert_eq!(table.notices().len(), 1);
    assert_eq!(table.notices()[0].normalized, "Willemia anophthalma");
    assert!(table.recognizes(Namespace::Name, "Willemia anophthalma"));
}

#[test]
fn prefix_names_do_not_collide() {
    let table = CrosswalkTable::from_entries(
        "v1",
        vec![
            TableEntry::new(Namespace::EmilieId, 10, "Isotoma"),
            TableEntry::new(Namespace::EmilieId, 11, "Isotoma viridis"),
        ],
    )
    .unwrap();
    let out = table
        .translate_value("Isotoma viridis", Namespace::Name, Namespace::EmilieId)
        .unwrap();
    assert_eq!(out.value, "11");
}

#[test]
fn aliases_collapse_onto_canonical_name() {
    let table = CrosswalkTable::build(
        "v1",
        entries(),
        vec![AliasEntry {
            name: "Acari sp".to_string(),
            canonical: "Acari".to_string(),
        }],
        ConflictPolicy::Reject,
    )
    .unwrap();
    let out = table
        .translate_value("Acari sp", Namespace::Name, Namespace::EmilieId)
        .unwrap();
    assert_eq!(out.value, "5");
    assert_eq!(out.outcome, Outcome::Translated);

    let back = table
        .translate_value(&out.value, Namespace::EmilieId, Namespace::Name)
        .unwrap();
    assert_eq!(back.value, "Acari");
}

#[test]
fn alias_to_unknown_name_is_invalid() {
    let err = CrosswalkTable::build(
        "v1",
        entries(),
        vec![AliasEntry {
            name: "Mites".to_string(),
            canonical: "Oribatida".to_string(),
        }],
        ConflictPolicy::Reject,
    )
    .unwrap_err();
    assert_matches!(err, CrosswalkError::InvalidEntry(_));
}

#[test]
fn merge_combines_versions_and_detects_conflicts() {
    let left = CrosswalkTable::from_entries("emilie", entries()).unwrap();
    let right = CrosswalkTable::from_entries(
        "biigle",
        vec![TableEntry::new(Namespace::BiigleId, 4190, "Collembola")],
    )
    .unwrap();
    let merged = left.merge(&right, ConflictPolicy::Reject).unwrap();
    assert_eq!(merged.version(), "emilie+biigle");
    assert_eq!(
        merged.lookup_by_id(Namespace::BiigleId, "4190").unwrap(),
        "Collembola"
    );

    let clash = CrosswalkTable::from_entries(
        "clash",
        vec![TableEntry::new(Namespace::EmilieId, 5, "Collembola")],
    )
    .unwrap();
    let err = left.merge(&clash, ConflictPolicy::Reject).unwrap_err();
    assert_matches!(err, CrosswalkError::DuplicateKeyConflict { .. });
}
