use crate::{
    dataset::{ProjectIndex, render_csv},
    util::{UniqueStems, ensure_dir, safe_file_stem},
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Relative paths (from the job directory) of written CSV exports.
#[derive(Debug, Clone, Default)]
pub struct ExportIndex {
    files: BTreeMap<(String, Option<String>), String>,
}

impl ExportIndex {
    pub fn project(&self, project: &str) -> Option<&str> {
        self.files
            .get(&(project.to_string(), None))
            .map(String::as_str)
    }

    pub fn component(&self, project: &str, component: &str) -> Option<&str> {
        self.files
            .get(&(project.to_string(), Some(component.to_string())))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Writes `exports/<project>.csv` and `exports/<project>/<component>.csv`.
pub fn write_exports(index: &ProjectIndex<'_>, job_dir: &Path) -> Result<ExportIndex> {
    let root = job_dir.join("exports");
    ensure_dir(&root)?;
    let mut out = ExportIndex::default();
    let mut project_stems = UniqueStems::default();

    for project in &index.projects {
        let project_stem = project_stems.claim(safe_file_stem(&project.name));
        let rel = format!("exports/{project_stem}.csv");
        write_csv(job_dir, &rel, project.group.headers, &project.group.records)?;
        out.files.insert((project.name.clone(), None), rel);

        let dir = root.join(&project_stem);
        ensure_dir(&dir)?;
        let mut component_stems = UniqueStems::default();
        for comp in &project.components {
            let comp_stem = component_stems.claim(safe_file_stem(&comp.name));
            let rel = format!("exports/{project_stem}/{comp_stem}.csv");
            write_csv(job_dir, &rel, comp.group.headers, &comp.group.records)?;
            out.files
                .insert((project.name.clone(), Some(comp.name.clone())), rel);
        }
    }

    debug!("wrote {} CSV exports under {}", out.len(), root.display());
    Ok(out)
}

fn write_csv(
    job_dir: &Path,
    rel: &str,
    headers: &[String],
    records: &[&crate::dataset::ReportRecord],
) -> Result<()> {
    let path = job_dir.join(rel);
    let text = render_csv(headers, records).with_context(|| format!("rendering {rel}"))?;
    std::fs::write(&path, text).with_context(|| format!("write {}", path.display()))
}
