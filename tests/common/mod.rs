#![allow(dead_code)]

use bug_digest::{
    config::Config,
    dataset::Dataset,
    engine::{CompletionError, Engine},
    progress::CancelToken,
};
use std::cell::RefCell;
use std::collections::VecDeque;

pub const SAMPLE_CSV: &str = "\
Issue key,Summary,Project,Component/s,Created,Priority,Severity,Resolution
BUG-1,Login button missing,P1,P1_A,2024-01-05 09:00,Major,High,Fixed
BUG-2,Sync stalls,P1,B,2024-01-20 10:00,Minor,Low,
BUG-3,Login loops,P1,A,2024-03-02 11:00,Critical,High,Won't Fix
BUG-4,Crash on export,P2,C,2024-02-01 08:00,Blocker,Critical,Fixed
BUG-5,Typo in footer,P2,D,2024-02-03 08:00,Minor,Low,Fixed
BUG-6,Slow search,P2,E,2024-02-07 08:00,Major,Medium,
";

pub const HIGH_ANSWER: &str = "## Summary\n- things break\n\n## Recommendations for Developers\n- fix them\n\n## Recommendations for Testers\n- test them\n\n## Potential Customer Impact\nUsers are blocked.\n\n## Impact Level\nImpact: HIGH\n";

pub fn load(cfg: &Config, csv: &str) -> Dataset {
    Dataset::from_reader(cfg, csv.as_bytes()).expect("parse sample CSV")
}

/// CSV with `n` reports in a single project and component.
pub fn single_group_csv(n: usize) -> String {
    let mut s = String::from("Issue key,Summary,Project,Component/s\n");
    for i in 1..=n {
        s.push_str(&format!("BUG-{i},Report number {i},Solo,Core\n"));
    }
    s
}

/// Engine that answers from a script, then with a fixed fallback.
pub struct ScriptedEngine {
    pub prompts: RefCell<Vec<String>>,
    script: RefCell<VecDeque<Result<String, CompletionError>>>,
    fallback: String,
    cancel_on_call: Option<(usize, CancelToken)>,
}

impl ScriptedEngine {
    pub fn answering(fallback: &str) -> Self {
        Self {
            prompts: RefCell::new(Vec::new()),
            script: RefCell::new(VecDeque::new()),
            fallback: fallback.to_string(),
            cancel_on_call: None,
        }
    }

    pub fn then(self, answer: Result<String, CompletionError>) -> Self {
        self.script.borrow_mut().push_back(answer);
        self
    }

    /// Trip `cancel` while serving the `n`th call (1-based).
    pub fn cancel_on_call(mut self, n: usize, cancel: CancelToken) -> Self {
        self.cancel_on_call = Some((n, cancel));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl Engine for ScriptedEngine {
    fn complete(&self, _system: &str, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        if let Some((n, cancel)) = &self.cancel_on_call {
            if self.calls() == *n {
                cancel.cancel();
            }
        }
        match self.script.borrow_mut().pop_front() {
            Some(answer) => answer,
            None => Ok(self.fallback.clone()),
        }
    }
}
