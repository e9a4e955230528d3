pub mod conformers;
pub mod enumerate;
pub mod search;

use crate::utils::progress::CliProgressHandler;
use rxnpath::engine::cancel::CancellationToken;

/// Process-wide handles every command receives from `main`.
#[derive(Clone)]
pub struct CommandContext {
    pub cancel: CancellationToken,
    pub progress: CliProgressHandler,
}

impl CommandContext {
    #[cfg(test)]
    pub fn quiet() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: CliProgressHandler::hidden(),
        }
    }
}
