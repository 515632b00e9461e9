use crate::{
    config::Config,
    dataset::{ProjectIndex, ReportGroup},
    engine::Engine,
    parser::{HeadingTable, SummaryFields},
    postprocess,
    progress::{ProgressBand, ProgressEvent, ProgressSink, ProgressState},
    summarizer::{PromptSet, RetryPolicy, SummarizeError, Summarizer, SummaryOutcome},
    util::{UniqueStems, safe_file_stem},
};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Pipeline<E: Engine> {
    cfg: Config,
    engine: E,
    headings: HeadingTable,
    state: Arc<ProgressState>,
    responses_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub component: String,
    pub record_count: usize,
    pub fields: SummaryFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project: String,
    pub record_count: usize,
    pub overall: Option<SummaryFields>,
    pub components: Vec<ComponentSummary>,
}

/// Completed summaries in dataset order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryRun {
    pub projects: Vec<ProjectSummary>,
}

impl SummaryRun {
    pub fn overall(&self, project: &str) -> Option<&SummaryFields> {
        self.projects
            .iter()
            .find(|p| p.project == project)
            .and_then(|p| p.overall.as_ref())
    }

    pub fn component(&self, project: &str, component: &str) -> Option<&SummaryFields> {
        self.projects
            .iter()
            .find(|p| p.project == project)
            .and_then(|p| p.components.iter().find(|c| c.component == component))
            .map(|c| &c.fields)
    }

    pub fn component_count(&self) -> usize {
        self.projects.iter().map(|p| p.components.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub project: String,
    pub component: Option<String>,
    pub chunk_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    pub summaries: SummaryRun,
    pub failures: Vec<TaskFailure>,
    pub cancelled: bool,
    pub model_calls: usize,
}

enum TaskResult {
    Done(Option<SummaryFields>),
    Failed,
    Cancelled,
}

impl<E: Engine> Pipeline<E> {
    pub fn new(cfg: &Config, engine: E, state: Arc<ProgressState>) -> Self {
        Self {
            cfg: cfg.clone(),
            headings: cfg.parser.heading_table(),
            engine,
            state,
            responses_dir: None,
        }
    }

    /// Write every raw model answer under `dir` for inspection.
    pub fn with_responses_dir(mut self, dir: PathBuf) -> Self {
        self.responses_dir = Some(dir);
        self
    }

    pub fn state(&self) -> &Arc<ProgressState> {
        &self.state
    }

    pub fn run(&self, index: &ProjectIndex<'_>, sink: &dyn ProgressSink) -> Result<RunOutcome> {
        let started = Instant::now();
        let total = index.total_tasks();
        self.state.reset(total);
        let band = ProgressBand {
            start: self.cfg.progress.band_start,
            end: self.cfg.progress.band_end,
        };
        let cancel = self.state.cancel_token().clone();

        info!(
            "summarizing {} projects, {} tasks, chunk mode={} size={}",
            index.projects.len(),
            total,
            self.cfg.chunking.mode,
            self.cfg.chunking.chunk_size
        );

        let mut outcome = RunOutcome::default();
        let mut dump_stems = UniqueStems::default();

        for project in &index.projects {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            self.announce(sink, band, &format!("Project {}", project.name));
            let overall = match self.run_task(
                &project.group,
                PromptSet::project(&self.cfg),
                &project.name,
                None,
                &mut outcome,
                &mut dump_stems,
            )? {
                TaskResult::Done(fields) => fields,
                TaskResult::Failed => None,
                TaskResult::Cancelled => {
                    outcome.cancelled = true;
                    break;
                }
            };
            self.state.complete_task();

            let mut summary = ProjectSummary {
                project: project.name.clone(),
                record_count: project.group.len(),
                overall,
                components: Vec::new(),
            };

            for comp in &project.components {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    break;
                }

                self.announce(sink, band, &comp.group.label);
                match self.run_task(
                    &comp.group,
                    PromptSet::component(&self.cfg),
                    &project.name,
                    Some(&comp.name),
                    &mut outcome,
                    &mut dump_stems,
                )? {
                    TaskResult::Done(Some(fields)) => summary.components.push(ComponentSummary {
                        component: comp.name.clone(),
                        record_count: comp.group.len(),
                        fields,
                    }),
                    TaskResult::Done(None) | TaskResult::Failed => {}
                    TaskResult::Cancelled => {
                        outcome.cancelled = true;
                        break;
                    }
                }
                self.state.complete_task();
            }

            // Completed entries are kept even when the run stops here.
            outcome.summaries.projects.push(summary);
            if outcome.cancelled {
                break;
            }
        }

        if outcome.cancelled {
            warn!(
                "run cancelled after {}/{} tasks",
                self.state.completed(),
                total
            );
        } else {
            info!(
                "summaries done: {} tasks, {} model calls, {} failures in {:?}",
                self.state.completed(),
                outcome.model_calls,
                outcome.failures.len(),
                started.elapsed()
            );
        }
        Ok(outcome)
    }

    fn announce(&self, sink: &dyn ProgressSink, band: ProgressBand, label: &str) {
        self.state.set_label(label);
        let completed = self.state.completed();
        let total = self.state.total();
        sink.notify(&ProgressEvent {
            percent: band.percent(completed, total),
            label: label.to_string(),
            completed,
            total,
        });
    }

    fn run_task(
        &self,
        group: &ReportGroup<'_>,
        prompts: PromptSet<'_>,
        project: &str,
        component: Option<&str>,
        outcome: &mut RunOutcome,
        dump_stems: &mut UniqueStems,
    ) -> Result<TaskResult> {
        let chunk_size = self.cfg.chunking.effective_size(group.len());
        let summarizer = Summarizer::new(&self.cfg.prompts.system, chunk_size)
            .with_retry(RetryPolicy::from_config(&self.cfg));
        let counting = CountingEngine {
            inner: &self.engine,
            calls: std::cell::Cell::new(0),
        };

        let started = Instant::now();
        let result = summarizer.summarize(&counting, group, prompts, self.state.cancel_token());
        outcome.model_calls += counting.calls.get();

        match result {
            Ok(SummaryOutcome::Completed(raw)) => {
                self.dump_response(project, component, &raw, dump_stems);
                let fields = postprocess::parse_response(&self.cfg, &self.headings, &raw);
                if fields.is_empty() {
                    warn!("{}: model answer had no recognizable sections", group.label);
                }
                info!(
                    "{}: {} records, impact={} in {:?}",
                    group.label,
                    group.len(),
                    fields.impact_level,
                    started.elapsed()
                );
                Ok(TaskResult::Done(Some(fields)))
            }
            Ok(SummaryOutcome::NoData) => {
                debug!("{}: no records, skipped", group.label);
                Ok(TaskResult::Done(None))
            }
            Ok(SummaryOutcome::Cancelled) => Ok(TaskResult::Cancelled),
            Err(err) => self.handle_failure(err, group, project, component, outcome),
        }
    }

    fn handle_failure(
        &self,
        err: SummarizeError,
        group: &ReportGroup<'_>,
        project: &str,
        component: Option<&str>,
        outcome: &mut RunOutcome,
    ) -> Result<TaskResult> {
        let chunk_index = err.chunk_index();
        let message = format!("{:#}", anyhow::Error::from(err));
        if !self.cfg.global.continue_on_error {
            return Err(anyhow!("summarizing {} failed: {message}", group.label));
        }
        error!("{}: {message}", group.label);
        outcome.failures.push(TaskFailure {
            project: project.to_string(),
            component: component.map(str::to_string),
            chunk_index,
            message,
        });
        Ok(TaskResult::Failed)
    }

    fn dump_response(
        &self,
        project: &str,
        component: Option<&str>,
        raw: &str,
        stems: &mut UniqueStems,
    ) {
        let Some(dir) = &self.responses_dir else {
            return;
        };
        let stem = stems.claim(match component {
            Some(c) => format!("{}__{}", safe_file_stem(project), safe_file_stem(c)),
            None => safe_file_stem(project),
        });
        let path = dir.join(format!("{stem}.md"));
        if let Err(e) = std::fs::write(&path, raw) {
            warn!("could not write {}: {e}", path.display());
        }
    }
}

struct CountingEngine<'e, E: Engine> {
    inner: &'e E,
    calls: std::cell::Cell<usize>,
}

impl<E: Engine> Engine for CountingEngine<'_, E> {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, crate::engine::CompletionError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.complete(system, prompt)
    }
}
