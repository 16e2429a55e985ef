use assert_matches::assert_matches;

use label_crosswalk::domain::{LabelId, Namespace, normalize_name};
use label_crosswalk::error::CrosswalkError;

#[test]
fn namespace_display_matches_cli_values() {
    for namespace in [
        Namespace::EmilieId,
        Namespace::BiigleId,
        Namespace::GuillaumeId,
        Namespace::Name,
    ] {
        let parsed: Namespace = namespace.to_string().parse().unwrap();
        assert_eq!(parsed, namespace);
    }
}

#[test]
fn default_columns() {
    assert_eq!(Namespace::EmilieId.default_column(), "class");
    assert_eq!(Namespace::BiigleId.default_column(), "label_id");
    assert_eq!(Namespace::Name.default_column(), "label_name");
}

#[test]
fn guillaume_codes_are_validated() {
    assert!(LabelId::parse(Namespace::GuillaumeId, "co31").is_ok());
    assert!(LabelId::parse(Namespace::GuillaumeId, "co31b").is_ok());
    let err = LabelId::parse(Namespace::GuillaumeId, "Acari").unwrap_err();
    assert_matches!(err, CrosswalkError::InvalidLabelId { namespace: Namespace::GuillaumeId, .. });
}

#[test]
fn negative_and_empty_ids_are_invalid() {
    assert!(LabelId::parse(Namespace::BiigleId, "-1").is_err());
    assert!(LabelId::parse(Namespace::BiigleId, "").is_err());
    assert!(LabelId::parse(Namespace::EmilieId, "4.0").is_err());
}

#[test]
fn normalization_handles_tabs_and_newlines() {
    assert_eq!(normalize_name("Folsomia\tcandida\n"), "Folsomia candida");
    assert_eq!(normalize_name("   "), "");
}

#[test]
fn serde_names_are_kebab_case() {
    let json = serde_json::to_string(&Namespace::GuillaumeId).unwrap();
    assert_eq!(json, "\"guillaume-id\"");
}
