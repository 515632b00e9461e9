//! Inline SVG charts for the HTML report.

use crate::{
    config::Columns,
    dataset::{Dataset, ProjectGroup},
    html::escape,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const PALETTE: [&str; 8] = [
    "#440154", "#46327e", "#365c8d", "#277f8e", "#1fa187", "#4ac16d", "#a0da39", "#fde725",
];

const PRIORITY_ORDER: [&str; 5] = ["Minor", "Major", "High", "Critical", "Blocker"];
const SEVERITY_ORDER: [&str; 4] = ["Low", "Medium", "High", "Critical"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectCharts {
    pub reports_per_component: Option<String>,
    pub resolution: Option<String>,
    pub priority: Option<String>,
    pub severity: Option<String>,
    pub reports_over_time: Option<String>,
}

impl ProjectCharts {
    pub fn render(ds: &Dataset, cols: &Columns, project: &ProjectGroup<'_>) -> Self {
        Self {
            reports_per_component: reports_per_component(project),
            resolution: resolution_pie(ds, &cols.resolution, project),
            priority: grouped_bar(ds, &cols.priority, &PRIORITY_ORDER, project),
            severity: grouped_bar(ds, &cols.severity, &SEVERITY_ORDER, project),
            reports_over_time: reports_over_time(project),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Reports per component", &self.reports_per_component),
            ("Resolutions", &self.resolution),
            ("Priority per component", &self.priority),
            ("Severity per component", &self.severity),
            ("New reports per month", &self.reports_over_time),
        ]
        .into_iter()
        .filter_map(|(title, svg)| svg.as_deref().map(|s| (title, s)))
    }
}

pub fn reports_per_component(project: &ProjectGroup<'_>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = project
        .components
        .iter()
        .map(|c| (c.name.as_str(), c.group.len()))
        .collect();
    if counts.is_empty() {
        return None;
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let row_h = 24;
    let label_w = 180;
    let plot_w = 420;
    let height = counts.len() * row_h + 30;
    let max = counts.iter().map(|c| c.1).max().unwrap_or(1).max(1);

    let mut svg = open_svg(label_w + plot_w + 60, height);
    for (i, (name, n)) in counts.iter().enumerate() {
        let y = 10 + i * row_h;
        let w = (*n as f64 / max as f64 * plot_w as f64).round();
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end" font-size="12">{}</text><rect x="{}" y="{}" width="{w}" height="{}" fill="{}"/><text x="{}" y="{}" font-size="11">{n}</text>"#,
            label_w - 6,
            y + 15,
            escape(name),
            label_w,
            y + 3,
            row_h - 6,
            PALETTE[i % PALETTE.len()],
            label_w as f64 + w + 4.0,
            y + 15,
        );
    }
    svg.push_str("</svg>");
    Some(svg)
}

pub fn resolution_pie(ds: &Dataset, column: &str, project: &ProjectGroup<'_>) -> Option<String> {
    ds.column(column)?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for rec in &project.group.records {
        let v = ds.value(rec, column).unwrap_or("").trim();
        let v = if v.is_empty() { "Unresolved" } else { v };
        *counts.entry(v.to_string()).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return None;
    }
    let mut slices: Vec<(String, usize)> = counts.into_iter().collect();
    slices.sort_by(|a, b| b.1.cmp(&a.1));

    let (cx, cy, r) = (120.0_f64, 120.0_f64, 100.0_f64);
    let mut svg = open_svg(480, (slices.len() * 20 + 40).max(250));
    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (i, (label, n)) in slices.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let frac = *n as f64 / total as f64;
        if slices.len() == 1 {
            let _ = write!(svg, r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{color}"/>"#);
        } else {
            let end = angle + frac * std::f64::consts::TAU;
            let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
            let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
            let large = if frac > 0.5 { 1 } else { 0 };
            let _ = write!(
                svg,
                r#"<path d="M{cx},{cy} L{x1:.2},{y1:.2} A{r},{r} 0 {large} 1 {x2:.2},{y2:.2} Z" fill="{color}" stroke="white"/>"#
            );
            angle = end;
        }
        let ly = 20 + i * 20;
        let _ = write!(
            svg,
            r#"<rect x="250" y="{}" width="12" height="12" fill="{color}"/><text x="268" y="{}" font-size="12">{} ({:.1}%)</text>"#,
            ly,
            ly + 11,
            escape(label),
            frac * 100.0
        );
    }
    svg.push_str("</svg>");
    Some(svg)
}

pub fn grouped_bar(
    ds: &Dataset,
    column: &str,
    order: &[&str],
    project: &ProjectGroup<'_>,
) -> Option<String> {
    ds.column(column)?;
    let mut categories: Vec<String> = order.iter().map(|s| s.to_string()).collect();
    let mut counts: Vec<BTreeMap<String, usize>> = Vec::new();
    for comp in &project.components {
        let mut per: BTreeMap<String, usize> = BTreeMap::new();
        for rec in &comp.group.records {
            let v = ds.value(rec, column).unwrap_or("").trim();
            if v.is_empty() {
                continue;
            }
            if !categories.iter().any(|c| c == v) {
                categories.push(v.to_string());
            }
            *per.entry(v.to_string()).or_insert(0) += 1;
        }
        counts.push(per);
    }
    let present: Vec<&String> = categories
        .iter()
        .filter(|c| counts.iter().any(|m| m.contains_key(*c)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let max = counts
        .iter()
        .flat_map(|m| m.values().copied())
        .max()
        .unwrap_or(1)
        .max(1);
    let bar_w = 14;
    let group_w = present.len() * bar_w + 16;
    let plot_h = 200;
    let left = 40;
    let width = left + counts.len() * group_w + 160;
    let mut svg = open_svg(width, plot_h + 110);
    let _ = write!(
        svg,
        r##"<line x1="{left}" y1="{}" x2="{}" y2="{}" stroke="#999"/>"##,
        plot_h + 10,
        left + counts.len() * group_w,
        plot_h + 10
    );

    for (gi, (comp, per)) in project.components.iter().zip(&counts).enumerate() {
        let gx = left + gi * group_w + 8;
        for (ci, cat) in present.iter().enumerate() {
            let n = per.get(*cat).copied().unwrap_or(0);
            if n == 0 {
                continue;
            }
            let h = (n as f64 / max as f64 * plot_h as f64).round();
            let _ = write!(
                svg,
                r#"<rect x="{}" y="{}" width="{}" height="{h}" fill="{}"><title>{}: {n}</title></rect>"#,
                gx + ci * bar_w,
                plot_h as f64 + 10.0 - h,
                bar_w - 2,
                PALETTE[ci % PALETTE.len()],
                escape(cat),
            );
        }
        let tx = gx + present.len() * bar_w / 2;
        let _ = write!(
            svg,
            r#"<text x="{tx}" y="{}" font-size="11" text-anchor="end" transform="rotate(-45 {tx} {})">{}</text>"#,
            plot_h + 24,
            plot_h + 24,
            escape(&comp.name)
        );
    }

    let lx = left + counts.len() * group_w + 20;
    for (ci, cat) in present.iter().enumerate() {
        let ly = 14 + ci * 18;
        let _ = write!(
            svg,
            r#"<rect x="{lx}" y="{ly}" width="12" height="12" fill="{}"/><text x="{}" y="{}" font-size="12">{}</text>"#,
            PALETTE[ci % PALETTE.len()],
            lx + 18,
            ly + 11,
            escape(cat)
        );
    }
    svg.push_str("</svg>");
    Some(svg)
}

/// Monthly counts of new reports, with empty months filled in.
pub fn monthly_counts(project: &ProjectGroup<'_>) -> Vec<((i32, u8), usize)> {
    let mut counts: BTreeMap<(i32, u8), usize> = BTreeMap::new();
    for rec in &project.group.records {
        if let Some(d) = rec.created {
            *counts.entry((d.year(), d.month() as u8)).or_insert(0) += 1;
        }
    }
    let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let (mut y, mut m) = first;
    while (y, m) <= last {
        out.push(((y, m), counts.get(&(y, m)).copied().unwrap_or(0)));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    out
}

pub fn reports_over_time(project: &ProjectGroup<'_>) -> Option<String> {
    let points = monthly_counts(project);
    if points.is_empty() {
        return None;
    }
    let max = points.iter().map(|p| p.1).max().unwrap_or(1).max(1);
    let step = 48usize;
    let (left, plot_h) = (40usize, 200usize);
    let width = left + points.len().max(2) * step + 20;
    let mut svg = open_svg(width, plot_h + 80);

    let coords: Vec<(f64, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, (_, n))| {
            (
                (left + i * step + step / 2) as f64,
                10.0 + plot_h as f64 - (*n as f64 / max as f64 * plot_h as f64),
            )
        })
        .collect();
    let path: Vec<String> = coords.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
    let _ = write!(
        svg,
        r##"<polyline points="{}" fill="none" stroke="#0072ff" stroke-width="2"/>"##,
        path.join(" ")
    );
    for (((y, m), n), (px, py)) in points.iter().zip(&coords) {
        let _ = write!(
            svg,
            r##"<circle cx="{px:.1}" cy="{py:.1}" r="3" fill="#0072ff"><title>{y}-{m:02}: {n}</title></circle><text x="{px:.1}" y="{}" font-size="10" text-anchor="end" transform="rotate(-45 {px:.1} {})">{y}-{m:02}</text>"##,
            plot_h + 26,
            plot_h + 26
        );
    }
    svg.push_str("</svg>");
    Some(svg)
}

fn open_svg(width: usize, height: usize) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="Arial, sans-serif">"#
    )
}
