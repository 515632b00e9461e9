use bug_digest::{
    config::Config,
    parser::{FieldKey, HeadingTable, ImpactLevel, SummaryFields, parse},
};

fn builtin(raw: &str) -> SummaryFields {
    parse(raw, &HeadingTable::builtin())
}

#[test]
fn well_formed_answer() {
    let f = builtin(
        "Here is the summary you asked for.\n\
         ## Summary\n- login fails\n- sync stalls\n\n\
         ## Recommendations for Developers\n- add retries\n\n\
         ## Recommendations for Testers\n- cover offline mode\n\n\
         ## Potential Customer Impact\nUsers lose work.\n\n\
         ## Impact Level\nImpact: High\n",
    );
    assert_eq!(f.summary, "- login fails\n- sync stalls");
    assert_eq!(f.developer_recommendations, "- add retries");
    assert_eq!(f.tester_recommendations, "- cover offline mode");
    assert_eq!(f.customer_impact, "Users lose work.");
    assert_eq!(f.impact_level, ImpactLevel::High);
}

#[test]
fn heading_variants_do_not_collide() {
    let f = builtin(
        "### **Key Findings:**\nA\n# developer recommendations\nB\n## QA Recommendations\nC\n\
         ##   Customer   Impact  \nD\n## Impact Rating:\nlowish, maybe MEDIUM\n",
    );
    assert_eq!(f.summary, "A");
    assert_eq!(f.developer_recommendations, "B");
    assert_eq!(f.tester_recommendations, "C");
    assert_eq!(f.customer_impact, "D");
    assert_eq!(f.impact_level, ImpactLevel::Medium);
}

#[test]
fn missing_sections_are_empty() {
    let f = builtin("## Summary\nonly this");
    assert_eq!(f.summary, "only this");
    assert_eq!(f.developer_recommendations, "");
    assert_eq!(f.customer_impact, "");
    assert_eq!(f.impact_level, ImpactLevel::NotAvailable);
}

#[test]
fn never_fails_on_garbage() {
    for raw in ["", "\n\n", "no headings at all", "##\n#\n###   ", "## Impact Level\n???"] {
        let f = builtin(raw);
        assert!(f.is_empty(), "{raw:?}");
        assert_eq!(f.impact_level, ImpactLevel::NotAvailable);
    }
}

#[test]
fn later_duplicate_wins_and_unknown_headings_stay_in_section() {
    let f = builtin("## Summary\nfirst\n## Summary\nsecond\n### Details\nmore");
    assert_eq!(f.summary, "second\n### Details\nmore");
}

#[test]
fn impact_normalization() {
    let cases = [
        ("Impact: HIGH", ImpactLevel::High),
        ("impact: medium", ImpactLevel::Medium),
        ("**Low**", ImpactLevel::Low),
        ("N/A", ImpactLevel::NotAvailable),
        ("severe", ImpactLevel::NotAvailable),
    ];
    for (text, want) in cases {
        let f = builtin(&format!("## Impact Level\n{text}"));
        assert_eq!(f.impact_level, want, "{text}");
        assert_eq!(f.get(FieldKey::ImpactLevel), want.as_str());
    }
    assert_eq!(
        serde_json::to_string(&ImpactLevel::NotAvailable).unwrap(),
        "\"N/A\""
    );
}

#[test]
fn reparsing_rendered_fields_is_stable() {
    let f = builtin(
        "## Summary\n- a\n## Recommendations for Developers\n- b\n## Potential Customer Impact\nc\n## Impact Level\nLOW",
    );
    let again = builtin(&f.to_markdown());
    assert_eq!(again, f);
    assert_eq!(builtin(&again.to_markdown()), again);
}

#[test]
fn configured_headings_extend_builtin() {
    let mut cfg = Config::default();
    cfg.parser
        .headings
        .insert("Issue Overview".into(), FieldKey::Summary);
    let f = parse("## Issue overview:\nX\n## Summary\nY", &cfg.parser.heading_table());
    assert_eq!(f.summary, "Y");

    cfg.parser.include_builtin_headings = false;
    let f = parse("## Issue overview\nX\n## Summary\nY", &cfg.parser.heading_table());
    assert_eq!(f.summary, "X\n## Summary\nY");
}

#[test]
fn value_on_the_heading_line() {
    let f = builtin("## Potential Customer Impact\nUsers wait.\n## Impact Level: HIGH\n");
    assert_eq!(f.customer_impact, "Users wait.");
    assert_eq!(f.impact_level, ImpactLevel::High);

    let f = builtin("## **Summary:** crashes on login\n- and on logout\n## Customer Impact Level - low\n");
    assert_eq!(f.summary, "crashes on login\n- and on logout");
    assert_eq!(f.customer_impact, "");
    assert_eq!(f.impact_level, ImpactLevel::Low);
}
