use super::cancel::CancellationToken;
use super::config::SearchConfig;
use super::evaluator::pool::EvaluatorPool;
use super::progress::ProgressReporter;

/// Shared, read-only handles every search task needs.
#[derive(Clone, Copy)]
pub struct SearchContext<'a> {
    pub config: &'a SearchConfig,
    pub pool: &'a EvaluatorPool<'a>,
    pub reporter: &'a ProgressReporter<'a>,
    pub cancel: &'a CancellationToken,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        config: &'a SearchConfig,
        pool: &'a EvaluatorPool<'a>,
        reporter: &'a ProgressReporter<'a>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            config,
            pool,
            reporter,
            cancel,
        }
    }

    /// Same handles with a different cancellation token.
    pub fn with_cancel(self, cancel: &'a CancellationToken) -> Self {
        Self { cancel, ..self }
    }
}
