//! Chunk-by-chunk summarization of one report group.
//!
//! The first chunk is sent with the `initial` template. Every later chunk is
//! sent with the `refinement` template together with the previous answer, and
//! that answer is replaced (not extended) by the new one. The model therefore
//! never sees more than one summary plus one chunk, whatever the group size.

use crate::{
    chunk_plan::{chunk_count, chunks},
    config::Config,
    dataset::ReportGroup,
    engine::{CompletionError, Engine},
    progress::CancelToken,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Template pair for one kind of group.
#[derive(Debug, Clone, Copy)]
pub struct PromptSet<'a> {
    /// Placeholders: `{reports}`, `{label}`.
    pub initial: &'a str,
    /// Placeholders: `{previous_summary}`, `{new_reports}`, `{label}`.
    pub refinement: &'a str,
}

impl<'a> PromptSet<'a> {
    pub fn project(cfg: &'a Config) -> Self {
        Self {
            initial: &cfg.prompts.project_initial,
            refinement: &cfg.prompts.project_refinement,
        }
    }

    pub fn component(cfg: &'a Config) -> Self {
        Self {
            initial: &cfg.prompts.component_initial,
            refinement: &cfg.prompts.component_refinement,
        }
    }

    pub fn render_initial(&self, label: &str, reports: &str) -> String {
        fill_template(self.initial, &[("label", label), ("reports", reports)])
    }

    pub fn render_refinement(&self, label: &str, previous: &str, new_reports: &str) -> String {
        fill_template(
            self.refinement,
            &[
                ("label", label),
                ("previous_summary", previous),
                ("new_reports", new_reports),
            ],
        )
    }
}

/// Single pass `{name}` substitution; inserted values are never rescanned.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = vars.iter().find_map(|(name, value)| {
            tail.strip_prefix(name)
                .and_then(|t| t.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// What a summarization run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Raw text of the model's answer to the last chunk.
    Completed(String),
    /// The cancel flag was observed; anything produced so far is dropped.
    Cancelled,
    /// The group had no records; the model was never called.
    NoData,
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("completion failed on chunk {} of {chunk_count}", .chunk_index + 1)]
    Completion {
        chunk_index: usize,
        chunk_count: usize,
        #[source]
        source: CompletionError,
    },
    #[error("could not render chunk {} as CSV", .chunk_index + 1)]
    Render {
        chunk_index: usize,
        #[source]
        source: csv::Error,
    },
}

impl SummarizeError {
    pub fn chunk_index(&self) -> usize {
        match self {
            SummarizeError::Completion { chunk_index, .. }
            | SummarizeError::Render { chunk_index, .. } => *chunk_index,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: Duration::ZERO,
    };

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.llm.max_retries,
            backoff: Duration::from_millis(cfg.llm.retry_backoff_ms),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

pub struct Summarizer<'a> {
    pub system: &'a str,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl<'a> Summarizer<'a> {
    pub fn new(system: &'a str, chunk_size: usize) -> Self {
        Self {
            system,
            chunk_size: chunk_size.max(1),
            retry: RetryPolicy::NONE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn summarize<E: Engine + ?Sized>(
        &self,
        engine: &E,
        group: &ReportGroup<'_>,
        prompts: PromptSet<'_>,
        cancel: &CancelToken,
    ) -> Result<SummaryOutcome, SummarizeError> {
        if group.is_empty() {
            return Ok(SummaryOutcome::NoData);
        }

        let total = chunk_count(group.len(), self.chunk_size);
        let mut running: Option<String> = None;

        for (chunk_index, chunk) in chunks(&group.records, self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                debug!("{}: cancelled before chunk {}/{}", group.label, chunk_index + 1, total);
                return Ok(SummaryOutcome::Cancelled);
            }

            let table = group
                .render_csv(chunk)
                .map_err(|source| SummarizeError::Render {
                    chunk_index,
                    source,
                })?;

            let prompt = match running.as_deref() {
                None => prompts.render_initial(&group.label, &table),
                Some(prev) => prompts.render_refinement(&group.label, prev, &table),
            };

            debug!(
                "{}: chunk {}/{} records={} prompt_chars={}",
                group.label,
                chunk_index + 1,
                total,
                chunk.len(),
                prompt.len()
            );

            let answer = match self.complete_with_retry(engine, &prompt, cancel) {
                Ok(Some(text)) => text,
                Ok(None) => return Ok(SummaryOutcome::Cancelled),
                Err(source) => {
                    return Err(SummarizeError::Completion {
                        chunk_index,
                        chunk_count: total,
                        source,
                    });
                }
            };
            running = Some(answer);
        }

        Ok(running.map_or(SummaryOutcome::NoData, SummaryOutcome::Completed))
    }

    /// `Ok(None)` when cancellation was observed while waiting to retry.
    fn complete_with_retry<E: Engine + ?Sized>(
        &self,
        engine: &E,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>, CompletionError> {
        let mut attempt = 0u32;
        loop {
            match engine.complete(self.system, prompt) {
                Ok(text) => return Ok(Some(text)),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        "completion attempt {attempt} failed, retrying in {:?}: {err}",
                        delay
                    );
                    std::thread::sleep(delay);
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
