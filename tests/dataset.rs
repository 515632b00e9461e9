mod common;

use bug_digest::{
    config::Config,
    dataset::{Dataset, SortKey, sort_stats},
};
use common::SAMPLE_CSV;

#[test]
fn groups_follow_first_seen_order() {
    let cfg = Config::default();
    let ds = common::load(&cfg, SAMPLE_CSV);
    let index = ds.index();

    assert_eq!(ds.records.len(), 6);
    assert_eq!(index.projects.len(), 2);
    let p1 = index.project("P1").unwrap();
    assert_eq!(p1.group.label, "P1");
    assert_eq!(p1.components[0].group.label, "P1 / A");
    let a: Vec<&str> = p1.components[0]
        .group
        .records
        .iter()
        .map(|r| r.values[0].as_str())
        .collect();
    assert_eq!(a, ["BUG-1", "BUG-3"]);
}

#[test]
fn multi_project_rows_are_exploded() {
    let cfg = Config::default();
    let csv = "\
Issue key,Project,Component/s
BUG-1,\"P1, P2\",\"P1_Login, P2_Sync\"
BUG-2,,Orphan
BUG-3,P2,
";
    let ds = common::load(&cfg, csv);
    assert_eq!(ds.records.len(), 3);
    assert_eq!(ds.records[0].project, "P1");
    assert_eq!(ds.records[0].components, ["Login", "P2_Sync"]);
    assert_eq!(ds.records[1].project, "P2");
    assert_eq!(ds.records[1].components, ["P1_Login", "Sync"]);
    assert_eq!(ds.records[2].components, ["General"]);
    assert_eq!(ds.value(&ds.records[1], "Project"), Some("P2"));
    assert_eq!(ds.value(&ds.records[2], "Component/s"), Some("General"));
}

#[test]
fn extra_component_columns_fold_into_first() {
    let mut cfg = Config::default();
    cfg.columns.components = vec!["Component/s".into(), "Component/s 2".into()];
    let csv = "Issue key,Project,Component/s,Component/s 2\nBUG-1,P,UI,Backend\nBUG-2,P,,UI\n";
    let ds = common::load(&cfg, csv);
    assert_eq!(ds.headers, ["Issue key", "Project", "Component/s"]);
    assert_eq!(ds.records[0].components, ["UI", "Backend"]);
    assert_eq!(ds.records[1].components, ["UI"]);
    assert_eq!(ds.index().projects[0].components.len(), 2);
}

#[test]
fn missing_project_column_is_an_error() {
    let cfg = Config::default();
    let err = Dataset::from_reader(&cfg, "Key,Component/s\n1,UI\n".as_bytes()).unwrap_err();
    assert!(err.to_string().contains("Project"));
}

#[test]
fn created_dates_are_parsed() {
    let cfg = Config::default();
    let ds = common::load(&cfg, SAMPLE_CSV);
    let d = ds.records[0].created.unwrap();
    assert_eq!((d.year(), d.month() as u8, d.day()), (2024, 1, 5));
}

#[test]
fn project_selection_and_stats() {
    let cfg = Config::default();
    let mut ds = common::load(&cfg, SAMPLE_CSV);

    let mut stats = ds.project_stats();
    sort_stats(&mut stats, SortKey::Components, true);
    assert_eq!(stats[0].name, "P2");
    assert_eq!(stats[0].component_count, 3);
    assert_eq!(stats[0].components_preview, ["C", "D", "E"]);
    sort_stats(&mut stats, SortKey::Name, false);
    assert_eq!(stats[0].name, "P1");
    assert_eq!(SortKey::parse("Reports"), Some(SortKey::Reports));
    assert_eq!(SortKey::parse("size"), None);

    ds.retain_projects(&["P2".to_string()]);
    assert!(ds.records.iter().all(|r| r.project == "P2"));
    ds.retain_projects(&[]);
    assert_eq!(ds.records.len(), 3);
}
