use crate::parser::{FieldKey, HeadingTable};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub columns: Columns,
    #[serde(default)]
    pub chunking: Chunking,
    #[serde(default)]
    pub llm: Llm,
    #[serde(default)]
    pub prompts: Prompts,
    #[serde(default)]
    pub parser: Parser,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        match self.chunking.mode.as_str() {
            "fixed" => {
                if self.chunking.chunk_size == 0 {
                    bail!("chunking.chunk_size must be >= 1 when mode=\"fixed\"");
                }
            }
            "all" => {}
            other => bail!("unknown chunking.mode: {other} (expected \"fixed\" or \"all\")"),
        }

        for (name, tpl) in [
            ("prompts.project_initial", &self.prompts.project_initial),
            ("prompts.component_initial", &self.prompts.component_initial),
        ] {
            if !tpl.contains("{reports}") {
                bail!("{name} must contain the {{reports}} placeholder");
            }
        }
        for (name, tpl) in [
            ("prompts.project_refinement", &self.prompts.project_refinement),
            ("prompts.component_refinement", &self.prompts.component_refinement),
        ] {
            if !tpl.contains("{previous_summary}") || !tpl.contains("{new_reports}") {
                bail!("{name} must contain {{previous_summary}} and {{new_reports}}");
            }
        }

        if self.progress.band_start < 0.0
            || self.progress.band_start > self.progress.band_end
            || self.progress.band_end > 100.0
        {
            bail!(
                "progress band must satisfy 0 <= band_start <= band_end <= 100 (got {}..{})",
                self.progress.band_start,
                self.progress.band_end
            );
        }
        if self.columns.project.trim().is_empty() {
            bail!("columns.project must not be empty");
        }
        if self.columns.components.is_empty() {
            bail!("columns.components must name at least one column");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub job_name: String,
    pub overwrite: bool,
    pub continue_on_error: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            overwrite: true,
            continue_on_error: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

/// Column mapping for the input CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub project: String,
    pub components: Vec<String>,
    pub created: String,
    pub resolution: String,
    pub priority: String,
    pub severity: String,
    pub default_component: String,
}
impl Default for Columns {
    fn default() -> Self {
        Self {
            project: "Project".into(),
            components: vec!["Component/s".into()],
            created: "Created".into(),
            resolution: "Resolution".into(),
            priority: "Priority".into(),
            severity: "Severity".into(),
            default_component: "General".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Chunking {
    pub mode: String,
    pub chunk_size: usize,
}
impl Default for Chunking {
    fn default() -> Self {
        Self {
            mode: "fixed".into(),
            chunk_size: 5,
        }
    }
}

impl Chunking {
    /// Records per chunk for a group of `group_len` records.
    pub fn effective_size(&self, group_len: usize) -> usize {
        if self.mode == "all" {
            group_len.max(1)
        } else {
            self.chunk_size.max(1)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Llm {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}
impl Default for Llm {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.1:8b".into(),
            temperature: 0.2,
            request_timeout_seconds: 0,
            max_retries: 2,
            retry_backoff_ms: 2000,
        }
    }
}

const RESPONSE_FORMAT: &str = "Respond in Markdown and use exactly these section markers, in this order:\n\
## Summary\n(bulleted list, at most 5 concise bullets grouping similar reports)\n\n\
## Recommendations for Developers\n(bulleted list)\n\n\
## Recommendations for Testers\n(bulleted list)\n\n\
## Potential Customer Impact\n(one or two sentences)\n\n\
## Impact Level\n(Write: Impact: HIGH/MEDIUM/LOW)\n\n\
Rate the impact HIGH if customers can no longer use the software, MEDIUM if usage is heavily impeded \
but still possible, LOW if it is a minor annoyance.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub system: String,
    pub project_initial: String,
    pub project_refinement: String,
    pub component_initial: String,
    pub component_refinement: String,
}
impl Default for Prompts {
    fn default() -> Self {
        Self {
            system: "You are a senior software QA lead. Act as a domain expert and follow the \
                     requested response structure exactly."
                .into(),
            project_initial: format!(
                "Given the bug reports for project '{{label}}' below (CSV), write a concise overall \
                 summary of the key recurring issues and their impact across all components, and \
                 note notable trends.\n{RESPONSE_FORMAT}\n\nBug reports:\n{{reports}}"
            ),
            project_refinement: format!(
                "You are refining an existing overall summary for project '{{label}}'.\n\
                 Existing summary:\n{{previous_summary}}\n\n\
                 Update it so it also covers the additional bug reports below (CSV). Merge similar \
                 issues instead of appending, and re-evaluate the impact level.\n{RESPONSE_FORMAT}\n\n\
                 Additional bug reports:\n{{new_reports}}"
            ),
            component_initial: format!(
                "Given the following bug reports (CSV) for the '{{label}}' component, summarize the \
                 key findings and recurring issues, give separate recommendations for developers \
                 and testers, describe the potential customer impact and rate it.\n\
                 {RESPONSE_FORMAT}\n\nBug reports:\n{{reports}}"
            ),
            component_refinement: format!(
                "You are refining an existing summary for the '{{label}}' component.\n\
                 Existing summary:\n{{previous_summary}}\n\n\
                 Update it so it also covers the additional bug reports below (CSV). Merge similar \
                 issues instead of appending, and re-evaluate the impact level.\n{RESPONSE_FORMAT}\n\n\
                 Additional bug reports:\n{{new_reports}}"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parser {
    /// Normalized heading text -> field. Extends the built-in table; an entry
    /// with the same text replaces the built-in mapping.
    #[serde(default)]
    pub headings: BTreeMap<String, FieldKey>,
    pub include_builtin_headings: bool,
}
impl Default for Parser {
    fn default() -> Self {
        Self {
            headings: BTreeMap::new(),
            include_builtin_headings: true,
        }
    }
}

impl Parser {
    pub fn heading_table(&self) -> HeadingTable {
        let mut table = if self.include_builtin_headings {
            HeadingTable::builtin()
        } else {
            HeadingTable::empty()
        };
        for (text, key) in &self.headings {
            table.insert(text, *key);
        }
        table
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub band_start: f32,
    pub band_end: f32,
    /// Terminal progress bar during `run`; ignored when stderr is not a TTY.
    pub show_bar: bool,
}
impl Default for Progress {
    fn default() -> Self {
        Self {
            band_start: 10.0,
            band_end: 95.0,
            show_bar: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub normalize_newlines: bool,
    pub trim_trailing_whitespace: bool,
    pub control_chars_to_sanitize: Vec<u8>,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            normalize_newlines: true,
            trim_trailing_whitespace: true,
            control_chars_to_sanitize: (0u8..32).chain(std::iter::once(127)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_html: bool,
    pub write_report_json: bool,
    pub write_exports: bool,
    pub write_charts: bool,
    pub html_filename: String,
    pub report_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_html: true,
            write_report_json: true,
            write_exports: true,
            write_charts: true,
            html_filename: "bug_report_summary.html".into(),
            report_filename: "report.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_responses: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_responses: false,
            dump_effective_config: true,
        }
    }
}
