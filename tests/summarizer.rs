mod common;

use bug_digest::{
    config::Config,
    dataset::ReportGroup,
    engine::CompletionError,
    progress::CancelToken,
    summarizer::{PromptSet, RetryPolicy, SummarizeError, Summarizer, SummaryOutcome},
};
use common::ScriptedEngine;
use std::time::Duration;

const PROMPTS: PromptSet<'static> = PromptSet {
    initial: "INIT {label}\n{reports}",
    refinement: "REFINE {label} prev=<{previous_summary}>\n{new_reports}",
};

fn answers(n: usize) -> ScriptedEngine {
    (1..=n).fold(ScriptedEngine::answering("unused"), |e, i| {
        e.then(Ok(format!("answer {i}")))
    })
}

#[test]
fn one_call_per_chunk_and_summary_is_threaded() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(7));
    let index = ds.index();
    let group = &index.projects[0].group;
    let engine = answers(3);

    let out = Summarizer::new("sys", 3)
        .summarize(&engine, group, PROMPTS, &CancelToken::new())
        .unwrap();

    assert_eq!(out, SummaryOutcome::Completed("answer 3".into()));
    let prompts = engine.prompts.borrow();
    assert_eq!(prompts.len(), 3);

    assert!(prompts[0].starts_with("INIT Solo\nIssue key,Summary,Project,Component/s\n"));
    assert!(prompts[0].contains("BUG-1,") && prompts[0].contains("BUG-3,"));
    assert!(!prompts[0].contains("BUG-4,"));

    assert!(prompts[1].starts_with("REFINE Solo prev=<answer 1>"));
    assert!(prompts[1].contains("BUG-4,") && prompts[1].contains("BUG-6,"));
    assert!(!prompts[1].contains("BUG-3,"));

    assert!(prompts[2].starts_with("REFINE Solo prev=<answer 2>"));
    assert!(prompts[2].contains("BUG-7,"));
    assert!(!prompts[2].contains("answer 1"));
}

#[test]
fn group_that_fits_one_chunk_uses_initial_prompt_only() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(4));
    let index = ds.index();
    let engine = answers(1);

    let out = Summarizer::new("sys", 10)
        .summarize(&engine, &index.projects[0].group, PROMPTS, &CancelToken::new())
        .unwrap();
    assert_eq!(out, SummaryOutcome::Completed("answer 1".into()));
    assert_eq!(engine.calls(), 1);
    assert!(engine.prompts.borrow()[0].starts_with("INIT"));
}

#[test]
fn empty_group_makes_no_calls() {
    let headers = vec!["Issue key".to_string()];
    let group = ReportGroup {
        label: "Nothing".into(),
        headers: &headers,
        records: Vec::new(),
    };
    let engine = answers(1);
    let out = Summarizer::new("sys", 3)
        .summarize(&engine, &group, PROMPTS, &CancelToken::new())
        .unwrap();
    assert_eq!(out, SummaryOutcome::NoData);
    assert_eq!(engine.calls(), 0);
}

#[test]
fn cancelled_before_start_makes_no_calls() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(7));
    let index = ds.index();
    let cancel = CancelToken::new();
    cancel.cancel();
    let engine = answers(3);

    let out = Summarizer::new("sys", 3)
        .summarize(&engine, &index.projects[0].group, PROMPTS, &cancel)
        .unwrap();
    assert_eq!(out, SummaryOutcome::Cancelled);
    assert_eq!(engine.calls(), 0);
}

#[test]
fn cancelled_mid_group_drops_partial_summary() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(7));
    let index = ds.index();
    let cancel = CancelToken::new();
    let engine = answers(3).cancel_on_call(1, cancel.clone());

    let out = Summarizer::new("sys", 3)
        .summarize(&engine, &index.projects[0].group, PROMPTS, &cancel)
        .unwrap();
    assert_eq!(out, SummaryOutcome::Cancelled);
    assert_eq!(engine.calls(), 1);
}

#[test]
fn failure_names_the_chunk() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(7));
    let index = ds.index();
    let engine = ScriptedEngine::answering("unused")
        .then(Ok("answer 1".into()))
        .then(Err(CompletionError::Malformed("no message".into())));

    let err = Summarizer::new("sys", 3)
        .summarize(&engine, &index.projects[0].group, PROMPTS, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SummarizeError::Completion {
            chunk_index: 1,
            chunk_count: 3,
            ..
        }
    ));
    assert_eq!(err.chunk_index(), 1);
    assert_eq!(err.to_string(), "completion failed on chunk 2 of 3");
    assert_eq!(engine.calls(), 2);
}

#[test]
fn transient_errors_are_retried() {
    let cfg = Config::default();
    let ds = common::load(&cfg, &common::single_group_csv(2));
    let index = ds.index();
    let retry = RetryPolicy {
        max_retries: 2,
        backoff: Duration::ZERO,
    };

    let engine = ScriptedEngine::answering("recovered").then(Err(CompletionError::Status {
        code: 503,
        body: "busy".into(),
    }));
    let out = Summarizer::new("sys", 5)
        .with_retry(retry)
        .summarize(&engine, &index.projects[0].group, PROMPTS, &CancelToken::new())
        .unwrap();
    assert_eq!(out, SummaryOutcome::Completed("recovered".into()));
    assert_eq!(engine.calls(), 2);

    let engine = ScriptedEngine::answering("never")
        .then(Err(CompletionError::Status {
            code: 400,
            body: "bad request".into(),
        }));
    let res = Summarizer::new("sys", 5).with_retry(retry).summarize(
        &engine,
        &index.projects[0].group,
        PROMPTS,
        &CancelToken::new(),
    );
    assert!(res.is_err());
    assert_eq!(engine.calls(), 1);

    let engine = (0..3).fold(ScriptedEngine::answering("never"), |e, _| {
        e.then(Err(CompletionError::Transport("refused".into())))
    });
    let res = Summarizer::new("sys", 5).with_retry(retry).summarize(
        &engine,
        &index.projects[0].group,
        PROMPTS,
        &CancelToken::new(),
    );
    assert!(res.is_err());
    assert_eq!(engine.calls(), 3);
}
