use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use time::{Date, format_description::BorrowedFormatItem};
use tracing::{debug, info, warn};

/// One normalized bug report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub project: String,
    pub components: Vec<String>,
    pub created: Option<Date>,
    /// Every column value, in `Dataset::headers` order.
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<ReportRecord>,
}

/// Records sharing a project, or a project and component, in dataset order.
#[derive(Debug, Clone)]
pub struct ReportGroup<'a> {
    pub label: String,
    pub headers: &'a [String],
    pub records: Vec<&'a ReportRecord>,
}

impl<'a> ReportGroup<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// CSV text (header row included) for a slice of this group's records.
    pub fn render_csv(&self, records: &[&ReportRecord]) -> Result<String, csv::Error> {
        render_csv(self.headers, records)
    }
}

pub fn render_csv(headers: &[String], records: &[&ReportRecord]) -> Result<String, csv::Error> {
    let mut w = csv::WriterBuilder::new().from_writer(Vec::new());
    w.write_record(headers)?;
    for rec in records {
        w.write_record(&rec.values)?;
    }
    let bytes = w.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Clone)]
pub struct ComponentGroup<'a> {
    pub name: String,
    pub group: ReportGroup<'a>,
}

#[derive(Debug, Clone)]
pub struct ProjectGroup<'a> {
    pub name: String,
    pub group: ReportGroup<'a>,
    pub components: Vec<ComponentGroup<'a>>,
}

/// Projects in first-seen order, components in first-seen order per project.
#[derive(Debug, Clone, Default)]
pub struct ProjectIndex<'a> {
    pub projects: Vec<ProjectGroup<'a>>,
}

impl ProjectIndex<'_> {
    pub fn total_tasks(&self) -> usize {
        self.projects.iter().map(|p| 1 + p.components.len()).sum()
    }

    pub fn project(&self, name: &str) -> Option<&ProjectGroup<'_>> {
        self.projects.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
    pub name: String,
    pub report_count: usize,
    pub component_count: usize,
    pub components_preview: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Reports,
    Components,
    Name,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reports" | "report_count" => Some(Self::Reports),
            "components" | "component_count" => Some(Self::Components),
            "name" | "alphabetical" => Some(Self::Name),
            _ => None,
        }
    }
}

impl Dataset {
    pub fn load(cfg: &Config, path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open input CSV: {}", path.display()))?;
        let ds = Self::from_reader(cfg, file)
            .with_context(|| format!("reading input CSV: {}", path.display()))?;
        info!(
            "loaded {} records ({} columns) from {}",
            ds.records.len(),
            ds.headers.len(),
            path.display()
        );
        Ok(ds)
    }

    pub fn from_reader<R: Read>(cfg: &Config, rdr: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
        let raw_headers: Vec<String> = reader
            .headers()
            .with_context(|| "reading CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let cols = &cfg.columns;
        let project_idx = find_column(&raw_headers, &cols.project)
            .ok_or_else(|| anyhow!("project column not found: {}", cols.project))?;
        let component_idxs: Vec<usize> = cols
            .components
            .iter()
            .filter_map(|c| {
                let idx = find_column(&raw_headers, c);
                if idx.is_none() {
                    warn!("component column not found: {c}");
                }
                idx
            })
            .collect();
        if component_idxs.is_empty() {
            return Err(anyhow!(
                "none of the component columns were found: {:?}",
                cols.components
            ));
        }

        // Extra component columns fold into the first one.
        let primary_component = component_idxs[0];
        let keep: Vec<usize> = (0..raw_headers.len())
            .filter(|i| *i == primary_component || !component_idxs.contains(i))
            .collect();
        let headers: Vec<String> = keep.iter().map(|&i| raw_headers[i].clone()).collect();
        let out_project = keep.iter().position(|&i| i == project_idx).unwrap_or(0);
        let out_component = keep
            .iter()
            .position(|&i| i == primary_component)
            .unwrap_or(0);
        let created_idx = find_column(&raw_headers, &cols.created);

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for (row_no, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("reading CSV row {}", row_no + 2))?;
            let cell = |i: usize| row.get(i).unwrap_or("").trim();

            let projects = split_list(cell(project_idx));
            if projects.is_empty() {
                dropped += 1;
                continue;
            }

            let joined_components = component_idxs
                .iter()
                .map(|&i| cell(i))
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            let created = created_idx.and_then(|i| parse_created(cell(i)));

            for project in projects {
                let components =
                    clean_components(&project, &joined_components, &cols.default_component);
                let mut values: Vec<String> = keep.iter().map(|&i| cell(i).to_string()).collect();
                values[out_project] = project.clone();
                values[out_component] = components.join(", ");
                records.push(ReportRecord {
                    project,
                    components,
                    created,
                    values,
                });
            }
        }

        if dropped > 0 {
            debug!("dropped {dropped} rows with no project");
        }

        Ok(Dataset { headers, records })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        find_column(&self.headers, name)
    }

    pub fn value<'r>(&self, rec: &'r ReportRecord, column: &str) -> Option<&'r str> {
        self.column(column)
            .and_then(|i| rec.values.get(i))
            .map(String::as_str)
    }

    /// Keep only records whose project is in `names`. Empty keeps all.
    pub fn retain_projects(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.records.retain(|r| names.iter().any(|n| n == &r.project));
    }

    pub fn index(&self) -> ProjectIndex<'_> {
        let mut projects: Vec<ProjectGroup<'_>> = Vec::new();
        let mut project_pos: HashMap<&str, usize> = HashMap::new();
        let mut component_pos: Vec<HashMap<String, usize>> = Vec::new();

        for rec in &self.records {
            let pi = *project_pos.entry(rec.project.as_str()).or_insert_with(|| {
                projects.push(ProjectGroup {
                    name: rec.project.clone(),
                    group: self.group(rec.project.clone()),
                    components: Vec::new(),
                });
                component_pos.push(HashMap::new());
                projects.len() - 1
            });
            let project = &mut projects[pi];
            project.group.records.push(rec);

            for comp in &rec.components {
                let ci = match component_pos[pi].get(comp) {
                    Some(&ci) => ci,
                    None => {
                        project.components.push(ComponentGroup {
                            name: comp.clone(),
                            group: self.group(format!("{} / {}", rec.project, comp)),
                        });
                        let ci = project.components.len() - 1;
                        component_pos[pi].insert(comp.clone(), ci);
                        ci
                    }
                };
                project.components[ci].group.records.push(rec);
            }
        }

        ProjectIndex { projects }
    }

    fn group(&self, label: String) -> ReportGroup<'_> {
        ReportGroup {
            label,
            headers: &self.headers,
            records: Vec::new(),
        }
    }

    pub fn project_stats(&self) -> Vec<ProjectStats> {
        self.index()
            .projects
            .iter()
            .map(|p| {
                let mut names: Vec<String> = p.components.iter().map(|c| c.name.clone()).collect();
                names.sort();
                names.truncate(3);
                ProjectStats {
                    name: p.name.clone(),
                    report_count: p.group.len(),
                    component_count: p.components.len(),
                    components_preview: names,
                }
            })
            .collect()
    }
}

pub fn sort_stats(stats: &mut [ProjectStats], key: SortKey, descending: bool) {
    stats.sort_by(|a, b| {
        let ord = match key {
            SortKey::Reports => a.report_count.cmp(&b.report_count),
            SortKey::Components => a.component_count.cmp(&b.component_count),
            SortKey::Name => a.name.cmp(&b.name),
        };
        if descending { ord.reverse() } else { ord }
    });
}

fn find_column(headers: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_components(project: &str, raw: &str, default_component: &str) -> Vec<String> {
    let prefix = format!("{project}_");
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let name = part.strip_prefix(prefix.as_str()).unwrap_or(part).trim();
        let name = if name.is_empty() { default_component } else { name };
        if !out.iter().any(|c| c == name) {
            out.push(name.to_string());
        }
    }
    if out.is_empty() {
        out.push(default_component.to_string());
    }
    out
}

fn date_formats() -> &'static [Vec<BorrowedFormatItem<'static>>] {
    use std::sync::OnceLock;
    static FORMATS: OnceLock<Vec<Vec<BorrowedFormatItem<'static>>>> = OnceLock::new();
    FORMATS.get_or_init(|| {
        [
            "[year]-[month]-[day]",
            "[year]/[month]/[day]",
            "[day]/[month]/[year]",
            "[day padding:none]/[month padding:none]/[year]",
            "[day]/[month repr:short case_sensitive:false]/[year]",
            "[day]-[month repr:short case_sensitive:false]-[year]",
            "[day].[month].[year]",
        ]
        .into_iter()
        .filter_map(|f| time::format_description::parse_borrowed::<2>(f).ok())
        .collect()
    })
}

/// Creation date from the leading date part of a timestamp cell.
pub fn parse_created(raw: &str) -> Option<Date> {
    let head = raw.split_whitespace().next()?;
    // RFC 3339 style "2024-03-12T10:15:00Z"
    let head = head
        .split_once('T')
        .filter(|(d, _)| d.len() == 10 && d.as_bytes().get(4) == Some(&b'-'))
        .map(|(d, _)| d)
        .unwrap_or(head);
    date_formats()
        .iter()
        .find_map(|fmt| Date::parse(head, fmt.as_slice()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_prefix_and_default() {
        assert_eq!(
            clean_components("APP", "APP_Login, APP_, Sync,Sync", "General"),
            vec!["Login", "General", "Sync"]
        );
        assert_eq!(clean_components("APP", "", "General"), vec!["General"]);
    }

    #[test]
    fn created_dates() {
        let d = parse_created("2024-03-12 10:15").unwrap();
        assert_eq!((d.year(), d.month() as u8, d.day()), (2024, 3, 12));
        let d = parse_created("12/Mar/2024 10:15 AM").unwrap();
        assert_eq!((d.year(), d.month() as u8, d.day()), (2024, 3, 12));
        assert!(parse_created("not a date").is_none());
        assert!(parse_created("").is_none());
    }
}
