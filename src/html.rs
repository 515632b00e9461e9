use crate::{
    charts::ProjectCharts,
    export::ExportIndex,
    parser::{ImpactLevel, SummaryFields},
    pipeline::{ComponentSummary, SummaryRun, TaskFailure},
};
use pulldown_cmark::{Options, Parser, html::push_html};
use std::collections::HashMap;
use std::fmt::Write as _;

const EMPTY_SUMMARY_MESSAGE: &str = "Summary unavailable: there are too many or too varied bug \
reports under this component for a concise overview. Consider using more specific labels.";

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; margin: 40px; background: #f9f9f9; }
h1 { color: #29384a; }
.project { margin-bottom: 56px; }
.summary-box { background: #004080; color: #fff; padding: 24px; border-radius: 12px; margin-bottom: 24px; box-shadow: 0 4px 12px rgba(0,0,0,0.07); }
.summary-box a { color: #cfe3ff; }
.charts { display: flex; flex-wrap: wrap; gap: 16px; margin-bottom: 24px; }
.chart { background: #fff; padding: 12px; border-radius: 8px; }
table { width: 100%; border-collapse: collapse; background: #fff; }
th, td { padding: 14px 10px; border-bottom: 1px solid #e3e3e3; vertical-align: top; }
th { background: #29384a; color: #fff; font-weight: bold; }
tr:hover td { background: #eef2f6; }
.impact { font-weight: bold; color: #fff; border-radius: 8px; padding: 4px 12px; display: inline-block; }
.center-fallback { text-align: center; color: #555; font-style: italic; padding: 20px; }
.failures { background: #fff3f3; border: 1px solid #e0b4b4; padding: 12px 20px; border-radius: 8px; }
"#;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn markdown_to_html(md: &str) -> String {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    push_html(&mut out, Parser::new_ext(md, opts));
    out
}

pub fn impact_color(level: ImpactLevel) -> &'static str {
    match level {
        ImpactLevel::High => "#FF0000",
        ImpactLevel::Medium => "#FFA500",
        ImpactLevel::Low => "#00B000",
        ImpactLevel::NotAvailable => "#CCCCCC",
    }
}

pub struct ReportInputs<'a> {
    pub title: &'a str,
    pub generated_at: &'a str,
    pub model: &'a str,
    pub run: &'a SummaryRun,
    pub charts: &'a HashMap<String, ProjectCharts>,
    pub exports: &'a ExportIndex,
    pub failures: &'a [TaskFailure],
}

pub fn build_html_report(inp: &ReportInputs<'_>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{}</h1>\n<p>Generated {} with model <code>{}</code>.</p>\n",
        escape(inp.title),
        escape(inp.title),
        escape(inp.generated_at),
        escape(inp.model),
    );

    if !inp.failures.is_empty() {
        html.push_str("<div class=\"failures\"><h3>Summaries that could not be generated</h3><ul>");
        for f in inp.failures {
            let target = match &f.component {
                Some(c) => format!("{} / {}", f.project, c),
                None => f.project.clone(),
            };
            let _ = write!(
                html,
                "<li><b>{}</b> (chunk {}): {}</li>",
                escape(&target),
                f.chunk_index + 1,
                escape(&f.message)
            );
        }
        html.push_str("</ul></div>\n");
    }

    for project in &inp.run.projects {
        let _ = write!(
            html,
            "<section class=\"project\">\n<h2>{}</h2>\n<p>{} reports",
            escape(&project.project),
            project.record_count
        );
        if let Some(path) = inp.exports.project(&project.project) {
            let _ = write!(html, " (<a href=\"{}\">CSV</a>)", escape(path));
        }
        html.push_str("</p>\n");

        html.push_str("<div class=\"summary-box\">\n<h2>Overall Summary</h2>\n");
        match &project.overall {
            Some(fields) => overall_block(&mut html, fields),
            None => html.push_str("<p><i>No overall summary was produced.</i></p>\n"),
        }
        html.push_str("</div>\n");

        if let Some(charts) = inp.charts.get(&project.project) {
            html.push_str("<div class=\"charts\">\n");
            for (title, svg) in charts.iter() {
                let _ = write!(
                    html,
                    "<div class=\"chart\"><h4>{}</h4>{}</div>\n",
                    escape(title),
                    svg
                );
            }
            html.push_str("</div>\n");
        }

        component_table(&mut html, &project.project, &project.components, inp.exports);
        html.push_str("</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn overall_block(html: &mut String, fields: &SummaryFields) {
    html.push_str(&markdown_to_html(&fields.summary));
    for (title, body) in [
        ("Recommendations for Developers", &fields.developer_recommendations),
        ("Recommendations for Testers", &fields.tester_recommendations),
        ("Potential Customer Impact", &fields.customer_impact),
    ] {
        if body.is_empty() {
            continue;
        }
        let _ = write!(html, "<h3>{title}</h3>\n{}", markdown_to_html(body));
    }
    let _ = write!(
        html,
        "<p><span class=\"impact\" style=\"background:{};\">Impact: {}</span></p>\n",
        impact_color(fields.impact_level),
        fields.impact_level
    );
}

/// Components ordered by impact, HIGH first; ties keep dataset order.
pub fn sorted_by_impact(components: &[ComponentSummary]) -> Vec<&ComponentSummary> {
    let mut sorted: Vec<&ComponentSummary> = components.iter().collect();
    sorted.sort_by(|a, b| b.fields.impact_level.cmp(&a.fields.impact_level));
    sorted
}

fn component_table(
    html: &mut String,
    project: &str,
    components: &[ComponentSummary],
    exports: &ExportIndex,
) {
    if components.is_empty() {
        return;
    }
    html.push_str(
        "<table>\n<thead><tr><th>Component</th><th>Summary of Issues</th>\
         <th>Recommendations for Developers</th><th>Recommendations for Testers</th>\
         <th>Potential Customer Impact</th><th>Impact Level</th></tr></thead>\n<tbody>\n",
    );

    for c in sorted_by_impact(components) {
        let name = match exports.component(project, &c.component) {
            Some(path) => format!(
                "<a href=\"{}\">{}</a>",
                escape(path),
                escape(&c.component)
            ),
            None => escape(&c.component),
        };
        let name = format!("<b>{name}</b><br><small>{} reports</small>", c.record_count);

        if c.fields.summary.trim().is_empty() {
            let _ = write!(
                html,
                "<tr><td>{name}</td><td colspan=\"5\" class=\"center-fallback\">{EMPTY_SUMMARY_MESSAGE}</td></tr>\n"
            );
            continue;
        }

        let f = &c.fields;
        let _ = write!(
            html,
            "<tr><td>{name}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><span class=\"impact\" style=\"background:{};\">{}</span></td></tr>\n",
            markdown_to_html(&f.summary),
            markdown_to_html(&f.developer_recommendations),
            markdown_to_html(&f.tester_recommendations),
            markdown_to_html(&f.customer_impact),
            impact_color(f.impact_level),
            f.impact_level,
        );
    }
    html.push_str("</tbody>\n</table>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn markdown_lists_render() {
        let html = markdown_to_html("- one\n- two");
        assert!(html.contains("<li>one</li>"));
    }
}
