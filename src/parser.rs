//! Parsing of the model's markdown answer into fixed summary fields.
//!
//! The model is asked for five `##` sections but is free to vary case,
//! wording or to skip sections entirely. [`parse`] never fails: anything it
//! cannot place ends up discarded, and the impact level falls back to `N/A`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Summary,
    DeveloperRecommendations,
    TesterRecommendations,
    CustomerImpact,
    ImpactLevel,
}

impl FieldKey {
    pub const ALL: [FieldKey; 5] = [
        FieldKey::Summary,
        FieldKey::DeveloperRecommendations,
        FieldKey::TesterRecommendations,
        FieldKey::CustomerImpact,
        FieldKey::ImpactLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Summary => "summary",
            FieldKey::DeveloperRecommendations => "developer_recommendations",
            FieldKey::TesterRecommendations => "tester_recommendations",
            FieldKey::CustomerImpact => "customer_impact",
            FieldKey::ImpactLevel => "impact_level",
        }
    }

    /// Heading used when rendering fields back to markdown.
    pub fn heading(self) -> &'static str {
        match self {
            FieldKey::Summary => "Summary",
            FieldKey::DeveloperRecommendations => "Recommendations for Developers",
            FieldKey::TesterRecommendations => "Recommendations for Testers",
            FieldKey::CustomerImpact => "Potential Customer Impact",
            FieldKey::ImpactLevel => "Impact Level",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImpactLevel {
    #[default]
    #[serde(rename = "N/A")]
    NotAvailable,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl ImpactLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ImpactLevel::High => "HIGH",
            ImpactLevel::Medium => "MEDIUM",
            ImpactLevel::Low => "LOW",
            ImpactLevel::NotAvailable => "N/A",
        }
    }

    /// First whole-word HIGH/MEDIUM/LOW token in `text`, case-insensitive.
    pub fn detect(text: &str) -> ImpactLevel {
        static TOKEN: OnceLock<Regex> = OnceLock::new();
        let re = TOKEN.get_or_init(|| {
            Regex::new(r"(?i)\b(high|medium|low)\b").expect("static impact regex")
        });
        match re.find(text).map(|m| m.as_str().to_ascii_uppercase()) {
            Some(t) if t == "HIGH" => ImpactLevel::High,
            Some(t) if t == "MEDIUM" => ImpactLevel::Medium,
            Some(t) if t == "LOW" => ImpactLevel::Low,
            _ => ImpactLevel::NotAvailable,
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured form of one model answer. All fields are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFields {
    pub summary: String,
    pub developer_recommendations: String,
    pub tester_recommendations: String,
    pub customer_impact: String,
    pub impact_level: ImpactLevel,
}

impl SummaryFields {
    pub fn get(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::Summary => &self.summary,
            FieldKey::DeveloperRecommendations => &self.developer_recommendations,
            FieldKey::TesterRecommendations => &self.tester_recommendations,
            FieldKey::CustomerImpact => &self.customer_impact,
            FieldKey::ImpactLevel => self.impact_level.as_str(),
        }
    }

    /// Render back into the five-header shape the prompts ask for.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for key in FieldKey::ALL {
            out.push_str("## ");
            out.push_str(key.heading());
            out.push('\n');
            match key {
                FieldKey::ImpactLevel => {
                    out.push_str("Impact: ");
                    out.push_str(self.impact_level.as_str());
                }
                _ => out.push_str(self.get(key)),
            }
            out.push_str("\n\n");
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.developer_recommendations.is_empty()
            && self.tester_recommendations.is_empty()
            && self.customer_impact.is_empty()
    }
}

/// Normalized heading text -> field.
#[derive(Debug, Clone, Default)]
pub struct HeadingTable {
    entries: HashMap<String, FieldKey>,
    max_words: usize,
}

impl HeadingTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Headings seen across the prompt revisions.
    pub fn builtin() -> Self {
        let mut t = Self::empty();
        for (text, key) in [
            ("summary", FieldKey::Summary),
            ("summary of issues", FieldKey::Summary),
            ("overall summary", FieldKey::Summary),
            ("key findings", FieldKey::Summary),
            ("recommendations for developers", FieldKey::DeveloperRecommendations),
            ("developer recommendations", FieldKey::DeveloperRecommendations),
            ("dev recommendations", FieldKey::DeveloperRecommendations),
            ("recommendations for testers", FieldKey::TesterRecommendations),
            ("tester recommendations", FieldKey::TesterRecommendations),
            ("qa recommendations", FieldKey::TesterRecommendations),
            ("potential customer impact", FieldKey::CustomerImpact),
            ("customer impact", FieldKey::CustomerImpact),
            ("impact description", FieldKey::CustomerImpact),
            ("impact level", FieldKey::ImpactLevel),
            ("impact rating", FieldKey::ImpactLevel),
            ("customer impact level", FieldKey::ImpactLevel),
        ] {
            t.insert(text, key);
        }
        t
    }

    pub fn insert(&mut self, text: &str, key: FieldKey) {
        let norm = normalize_heading(text);
        self.max_words = self.max_words.max(norm.split(' ').count());
        self.entries.insert(norm, key);
    }

    pub fn lookup(&self, heading: &str) -> Option<FieldKey> {
        self.entries.get(&normalize_heading(heading)).copied()
    }

    /// Longest table entry that matches the heading's leading words, plus
    /// whatever text follows it on the heading line (`Impact Level: HIGH`).
    pub fn match_prefix(&self, heading: &str) -> Option<(FieldKey, String)> {
        let words: Vec<&str> = heading.split_whitespace().collect();
        let longest = words.len().min(self.max_words);
        (1..=longest).rev().find_map(|n| {
            let key = self.lookup(&words[..n].join(" "))?;
            let rest = words[n..]
                .join(" ")
                .trim_start_matches(|c: char| c == ':' || c == '*' || c == '_' || c == '-')
                .trim()
                .to_string();
            Some((key, rest))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_heading(raw: &str) -> String {
    let t = raw
        .trim()
        .trim_end_matches(':')
        .trim()
        .trim_matches(|c| c == '*' || c == '_')
        .trim()
        .trim_end_matches(':')
        .to_lowercase();
    t.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heading text of a markdown `#` line, if the line is one.
fn heading_text(line: &str) -> Option<&str> {
    let t = line.trim();
    let rest = t.trim_start_matches('#');
    if rest.len() == t.len() {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() { None } else { Some(text) }
}

fn section_body(inline: Option<&str>, lines: &[&str]) -> String {
    let mut body: Vec<&str> = inline.into_iter().collect();
    body.extend_from_slice(lines);
    body.join("\n").trim().to_string()
}

pub fn parse(raw: &str, headings: &HeadingTable) -> SummaryFields {
    let mut sections: HashMap<FieldKey, String> = HashMap::new();
    let mut current: Option<FieldKey> = None;
    let mut buf: Vec<&str> = Vec::new();
    let mut inline: Option<String> = None;

    for line in raw.lines() {
        if let Some((key, rest)) = heading_text(line).and_then(|h| headings.match_prefix(h)) {
            if let Some(prev) = current.take() {
                sections.insert(prev, section_body(inline.as_deref(), &buf));
            }
            buf.clear();
            inline = Some(rest).filter(|r| !r.is_empty());
            current = Some(key);
            continue;
        }
        if current.is_some() {
            buf.push(line);
        }
    }
    if let Some(prev) = current {
        sections.insert(prev, section_body(inline.as_deref(), &buf));
    }

    let mut take = |k: FieldKey| sections.remove(&k).unwrap_or_default();
    let impact_text = take(FieldKey::ImpactLevel);
    SummaryFields {
        summary: take(FieldKey::Summary),
        developer_recommendations: take(FieldKey::DeveloperRecommendations),
        tester_recommendations: take(FieldKey::TesterRecommendations),
        customer_impact: take(FieldKey::CustomerImpact),
        impact_level: ImpactLevel::detect(&impact_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_normalization() {
        assert_eq!(normalize_heading("  **Impact   Level:** "), "impact level");
        assert_eq!(heading_text("### Summary"), Some("Summary"));
        assert_eq!(heading_text("#"), None);
        assert_eq!(heading_text("Summary"), None);
    }

    #[test]
    fn longest_heading_prefix_wins() {
        let table = HeadingTable::builtin();
        assert_eq!(
            table.match_prefix("Customer Impact Level: high"),
            Some((FieldKey::ImpactLevel, "high".to_string()))
        );
        assert_eq!(
            table.match_prefix("Customer Impact"),
            Some((FieldKey::CustomerImpact, String::new()))
        );
        assert_eq!(table.match_prefix("Summaryish"), None);
    }

    #[test]
    fn impact_detect_prefers_leftmost_token() {
        assert_eq!(ImpactLevel::detect("low now, high later"), ImpactLevel::Low);
        assert_eq!(ImpactLevel::detect("highlight only"), ImpactLevel::NotAvailable);
    }
}
