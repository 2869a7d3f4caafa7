//! Phase execution - applies one batch of actions sequentially

use crate::context::{ApplyContext, PhaseProgress};
use crate::types::{ApplyResult, ExecuteSummary};
use anyhow::Result;

/// One item of a phase together with its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<'a, T> {
    pub item: &'a T,
    pub result: ApplyResult,
}

/// Run `apply` over every item, in order, one at a time
///
/// Each call receives the [`ApplyContext`] for its step. An `Err` returned by
/// `apply` is folded into [`ApplyResult::Failed`]; a phase never aborts
/// early, so one failing action cannot starve the rest of the batch.
pub fn run_phase<'a, T, I, F>(items: I, mut apply: F) -> Vec<Applied<'a, T>>
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: ExactSizeIterator,
    F: FnMut(&T, &ApplyContext) -> Result<ApplyResult>,
{
    let items = items.into_iter();
    let mut progress = PhaseProgress::new(items.len());
    let mut applied = Vec::with_capacity(items.len());

    for item in items {
        let ctx = progress.advance();
        let result = match apply(item, &ctx) {
            Ok(result) => result,
            Err(e) => ApplyResult::failed(format!("{e:#}")),
        };
        log::debug!("{ctx}result: {result}");
        applied.push(Applied { item, result });
    }

    applied
}

/// Tally the results of a phase
pub fn summarize<T>(applied: &[Applied<'_, T>]) -> ExecuteSummary {
    let mut summary = ExecuteSummary::default();
    for entry in applied {
        summary.add_result(&entry.result);
    }
    summary
}
