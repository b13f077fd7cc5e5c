//! Background execution of a merge
//!
//! The merge runs on a blocking worker. The caller keeps a handle that can:
//! - cancel the merge through a [`CancellationToken`]
//! - get told once when the merge is still running after a delay
//! - await the outcome
//!
//! # Example
//!
//! ```rust,no_run
//! use report_merge::merge::{MergeOptions, Merger};
//! use report_merge::merge::resolver::MostRecentResolver;
//! use report_merge::task::{MergeJob, MergeTask};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let job = MergeJob {
//!     merger: Merger::new(MergeOptions::default()),
//!     inputs: vec!["run1.xml".into(), "run2.xml".into()],
//!     output: "merged".into(),
//!     resolver: Box::new(MostRecentResolver),
//! };
//! let task = MergeTask::spawn(job);
//! let outcome = task
//!     .wait(Duration::from_secs(2), |phase| {
//!         eprintln!("still {phase}...");
//!         true
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{MergeError, MergeResult};
use crate::merge::resolver::ConflictResolver;
use crate::merge::{MergePhase, MergeProgress, Merger};
use crate::model::MergeOutcome;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a merge needs, moved onto the worker.
pub struct MergeJob {
    pub merger: Merger,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub resolver: Box<dyn ConflictResolver>,
}

/// How long a cancelled worker may take to unwind before the wait gives up on it.
const CANCEL_GRACE: Duration = Duration::from_millis(500);

pub struct MergeTask {
    handle: JoinHandle<MergeResult<MergeOutcome>>,
    token: CancellationToken,
    progress: MergeProgress,
}

impl MergeTask {
    /// Start the merge on a blocking worker. Must be called inside a tokio runtime.
    pub fn spawn(job: MergeJob) -> Self {
        let token = CancellationToken::new();
        let progress = job.merger.progress();
        let worker_token = token.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let MergeJob {
                merger,
                inputs,
                output,
                mut resolver,
            } = job;
            merger.merge(&inputs, &output, resolver.as_mut(), &worker_token)
        });

        Self {
            handle,
            token,
            progress,
        }
    }

    /// Token that stops the merge at its next checkpoint.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the merge to finish.
    ///
    /// Once `notice_delay` has passed with the merge still running,
    /// `on_notice` is called with the current phase. It returns whether the
    /// notice was shown; a declined notice is offered again after another
    /// delay, and at most one notice is ever shown.
    ///
    /// Cancelling the token ends the wait with [`MergeError::Cancelled`] even
    /// when the worker is stuck in a blocking call. The worker gets a short
    /// grace period to clean up its partial output first.
    pub async fn wait<F>(self, notice_delay: Duration, mut on_notice: F) -> MergeResult<MergeOutcome>
    where
        F: FnMut(MergePhase) -> bool,
    {
        let MergeTask {
            handle,
            token,
            progress,
        } = self;
        tokio::pin!(handle);
        let mut noticed = false;

        loop {
            tokio::select! {
                joined = &mut handle => return flatten(joined),
                _ = token.cancelled() => {
                    return match timeout(CANCEL_GRACE, &mut handle).await {
                        Ok(joined) => flatten(joined),
                        Err(_) => {
                            warn!(
                                grace_ms = CANCEL_GRACE.as_millis() as u64,
                                "merge worker still blocked after cancel, abandoning it"
                            );
                            Err(MergeError::Cancelled)
                        }
                    };
                }
                _ = sleep(notice_delay), if !noticed => {
                    let phase = *progress.lock();
                    noticed = on_notice(phase);
                    if noticed {
                        info!(%phase, delay_ms = notice_delay.as_millis() as u64, "merge still running");
                    }
                }
            }
        }
    }
}

fn flatten(
    joined: Result<MergeResult<MergeOutcome>, tokio::task::JoinError>,
) -> MergeResult<MergeOutcome> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => Err(MergeError::Cancelled),
        Err(err) => {
            warn!(error = %err, "merge worker panicked");
            Err(MergeError::Worker {
                message: err.to_string(),
            })
        }
    }
}
