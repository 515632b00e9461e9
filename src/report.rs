use crate::{
    chunk_plan::chunk_count,
    config::Config,
    dataset::ProjectIndex,
    parser::ImpactLevel,
    pipeline::{RunOutcome, TaskFailure},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    CompletedWithFailures,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub input: String,
    pub started: String,
    pub finished: String,
    pub status: RunStatus,
    pub model: String,
    pub chunk_mode: String,
    pub chunk_size: usize,
    pub record_count: usize,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub model_calls: usize,
    pub projects: Vec<ProjectReport>,
    pub failures: Vec<TaskFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: String,
    pub record_count: usize,
    pub chunk_count: usize,
    pub overall_impact: Option<ImpactLevel>,
    pub components: Vec<ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub component: String,
    pub record_count: usize,
    pub chunk_count: usize,
    pub impact_level: Option<ImpactLevel>,
}

pub struct JobMeta<'a> {
    pub job_id: &'a str,
    pub input: &'a str,
    pub started: &'a str,
    pub finished: &'a str,
    pub tasks_completed: usize,
}

impl JobReport {
    pub fn build(
        cfg: &Config,
        meta: &JobMeta<'_>,
        index: &ProjectIndex<'_>,
        outcome: &RunOutcome,
    ) -> Self {
        let status = if outcome.cancelled {
            RunStatus::Cancelled
        } else if outcome.failures.is_empty() {
            RunStatus::Ok
        } else {
            RunStatus::CompletedWithFailures
        };

        let chunks_for = |n: usize| chunk_count(n, cfg.chunking.effective_size(n));
        let projects = index
            .projects
            .iter()
            .map(|p| ProjectReport {
                project: p.name.clone(),
                record_count: p.group.len(),
                chunk_count: chunks_for(p.group.len()),
                overall_impact: outcome.summaries.overall(&p.name).map(|f| f.impact_level),
                components: p
                    .components
                    .iter()
                    .map(|c| ComponentReport {
                        component: c.name.clone(),
                        record_count: c.group.len(),
                        chunk_count: chunks_for(c.group.len()),
                        impact_level: outcome
                            .summaries
                            .component(&p.name, &c.name)
                            .map(|f| f.impact_level),
                    })
                    .collect(),
            })
            .collect();

        JobReport {
            job_id: meta.job_id.to_string(),
            input: meta.input.to_string(),
            started: meta.started.to_string(),
            finished: meta.finished.to_string(),
            status,
            model: cfg.llm.model.clone(),
            chunk_mode: cfg.chunking.mode.clone(),
            chunk_size: cfg.chunking.chunk_size,
            record_count: index.projects.iter().map(|p| p.group.len()).sum(),
            tasks_total: index.total_tasks(),
            tasks_completed: meta.tasks_completed,
            model_calls: outcome.model_calls,
            projects,
            failures: outcome.failures.clone(),
        }
    }
}
