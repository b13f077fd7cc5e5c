pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod model;
pub mod report;
pub mod scheme;
pub mod task;
pub mod utils;

pub use config::{CliArgs, MergeConfig, OutputLayout, ResolveStrategy};
pub use error::{ErrorCode, MergeError, MergeResult, exit_code_for};
pub use logging::{LoggingConfig, init_logging};
pub use merge::{MergeOptions, MergePhase, Merger};
pub use model::MergeOutcome;
pub use task::{MergeJob, MergeTask};

use anyhow::Result;
use merge::resolver::resolver_for;

/// Run a configured merge to completion.
///
/// Ctrl-C cancels the merge, even while an interactive prompt waits for an
/// answer. A notice goes to stderr when the merge outlives
/// `config.notice_delay`, but never while conflicts are being asked about.
pub async fn run(config: MergeConfig) -> Result<MergeOutcome> {
    tracing::info!(
        inputs = config.inputs.len(),
        output = %config.output.display(),
        layout = %config.layout,
        resolve = %config.resolve,
        "starting merge",
    );

    let merger = Merger::new(MergeOptions {
        layout: config.layout,
        overwrite: config.overwrite,
    });
    let task = MergeTask::spawn(MergeJob {
        merger,
        inputs: config.inputs.clone(),
        output: config.output.clone(),
        resolver: resolver_for(config.resolve),
    });

    let token = task.token();
    let interrupt = tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => {
                        tracing::warn!("interrupt received, cancelling merge");
                        token.cancel();
                    }
                    Err(error) => tracing::warn!(?error, "failed to listen for ctrl-c"),
                }
            }
            _ = token.cancelled() => {}
        }
    });

    let result = task
        .wait(config.notice_delay, |phase| {
            if !should_announce(config.resolve, phase) {
                return false;
            }
            eprintln!("merging reports, please wait ({phase})...");
            true
        })
        .await;
    interrupt.abort();

    match result {
        Ok(outcome) => Ok(outcome),
        Err(error) => {
            error.track();
            Err(error.into())
        }
    }
}

/// Whether the "please wait" notice may be printed during `phase`.
fn should_announce(resolve: ResolveStrategy, phase: MergePhase) -> bool {
    // the interactive resolver owns the terminal while it asks
    !(resolve == ResolveStrategy::Interactive && phase == MergePhase::Resolving)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_stays_out_of_interactive_prompts() {
        assert!(!should_announce(ResolveStrategy::Interactive, MergePhase::Resolving));
        assert!(should_announce(ResolveStrategy::Interactive, MergePhase::Writing));
        assert!(should_announce(ResolveStrategy::MostRecent, MergePhase::Resolving));
        assert!(should_announce(
            ResolveStrategy::Fail,
            MergePhase::Scanning { done: 1, total: 2 }
        ));
    }
}
