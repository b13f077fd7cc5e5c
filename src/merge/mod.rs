//! Merging of test-run reports
//!
//! A merge runs in three streaming passes per input:
//! 1. scan ids and test urls ([`crate::report::reader`])
//! 2. copy the work directories with renumbered ids
//! 3. copy the test results, skipping the losers of conflict resolution
//!
//! Between 1 and 2 the [`plan::MergePlan`] assigns new work directory ids and
//! asks a [`resolver::ConflictResolver`] to settle duplicated urls.

pub mod plan;
pub mod resolver;

use crate::config::OutputLayout;
use crate::error::{MergeError, MergeResult};
use crate::log_slow_operation;
use crate::model::{MergeOutcome, ReportIndex};
use crate::report::reader::{check_cancel, scan};
use crate::report::summary::write_summary;
use crate::report::writer::XmlReportWriter;
use crate::report::{StagedReportDir, check_report_dir_target, resolve_source};
use parking_lot::Mutex;
use plan::MergePlan;
use resolver::ConflictResolver;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

const SLOW_PHASE_MS: u64 = 1_000;

/// Where a running merge currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePhase {
    #[default]
    Starting,
    Scanning {
        done: usize,
        total: usize,
    },
    Resolving,
    Writing,
    Summarizing,
    Finished,
}

impl std::fmt::Display for MergePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePhase::Starting => write!(f, "starting"),
            MergePhase::Scanning { done, total } => write!(f, "scanning {}/{}", done, total),
            MergePhase::Resolving => write!(f, "resolving conflicts"),
            MergePhase::Writing => write!(f, "writing merged report"),
            MergePhase::Summarizing => write!(f, "writing summary"),
            MergePhase::Finished => write!(f, "finished"),
        }
    }
}

/// Shared view of a merge's phase, read by whoever waits on it.
pub type MergeProgress = Arc<Mutex<MergePhase>>;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub layout: OutputLayout,
    pub overwrite: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            layout: OutputLayout::ReportDir,
            overwrite: false,
        }
    }
}

pub struct Merger {
    options: MergeOptions,
    progress: MergeProgress,
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            progress: MergeProgress::default(),
        }
    }

    pub fn progress(&self) -> MergeProgress {
        self.progress.clone()
    }

    fn set_phase(&self, phase: MergePhase) {
        *self.progress.lock() = phase;
    }

    /// Refuse an output that cannot be written before any input is scanned.
    fn check_output(&self, output: &Path) -> MergeResult<()> {
        match self.options.layout {
            OutputLayout::ReportDir => check_report_dir_target(output, self.options.overwrite),
            OutputLayout::XmlFile if output.is_dir() => Err(MergeError::NotAReportDir {
                path: output.to_path_buf(),
            }),
            OutputLayout::XmlFile if output.exists() && !self.options.overwrite => {
                Err(MergeError::OutputExists {
                    path: output.to_path_buf(),
                })
            }
            OutputLayout::XmlFile => Ok(()),
        }
    }

    /// Merge `inputs` into `output`.
    ///
    /// Nothing is written at `output` unless the whole merge succeeds.
    pub fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        resolver: &mut dyn ConflictResolver,
        cancel: &CancellationToken,
    ) -> MergeResult<MergeOutcome> {
        let started = Instant::now();
        if inputs.len() < 2 {
            return Err(MergeError::NotEnoughInputs {
                count: inputs.len(),
            });
        }

        let sources = inputs
            .iter()
            .map(PathBuf::as_path)
            .map(resolve_source)
            .collect::<MergeResult<Vec<_>>>()?;
        self.check_output(output)?;

        let scan_started = Instant::now();
        let mut indexes: Vec<ReportIndex> = Vec::with_capacity(sources.len());
        for (input, source) in sources.iter().enumerate() {
            self.set_phase(MergePhase::Scanning {
                done: input,
                total: sources.len(),
            });
            check_cancel(cancel)?;
            let index = scan(source, input, cancel)?;
            tracing::info!(
                input,
                path = %source.xml_path.display(),
                work_dirs = index.work_dirs.len(),
                results = index.results.len(),
                "read report"
            );
            indexes.push(index);
        }
        log_slow_operation!(scan_started.elapsed(), SLOW_PHASE_MS, phase = "scan", "merge phase");

        self.set_phase(MergePhase::Resolving);
        let plan = MergePlan::build(&indexes, resolver, cancel)?;
        tracing::info!(
            work_dirs = plan.work_dir_count(),
            conflicts = plan.conflicts().len(),
            dropped = plan.dropped_count(),
            "merge plan ready"
        );

        self.set_phase(MergePhase::Writing);
        let write_started = Instant::now();
        let (stats, outputs) = match self.options.layout {
            OutputLayout::XmlFile => {
                self.check_output(output)?;
                let stats = write_xml(output, &indexes, &plan, cancel)?;
                log_slow_operation!(write_started.elapsed(), SLOW_PHASE_MS, phase = "write", "merge phase");
                (stats, vec![output.to_path_buf()])
            }
            OutputLayout::ReportDir => {
                let staged = StagedReportDir::new(output, self.options.overwrite)?;
                let dir = staged.dir();
                let xml_path = dir.xml_path();
                let stats = write_xml(&xml_path, &indexes, &plan, cancel)?;
                log_slow_operation!(write_started.elapsed(), SLOW_PHASE_MS, phase = "write", "merge phase");

                self.set_phase(MergePhase::Summarizing);
                check_cancel(cancel)?;
                let mut written = vec![xml_path];
                written.extend(write_summary(dir, &indexes, &plan)?);
                written.push(dir.write_marker()?);
                check_cancel(cancel)?;

                let outputs: Vec<PathBuf> = written.iter().map(|p| staged.final_path(p)).collect();
                staged.commit()?;
                (stats, outputs)
            }
        };
        self.set_phase(MergePhase::Finished);
        let outcome = MergeOutcome {
            inputs: indexes
                .iter()
                .map(|index| index.source.display_name())
                .collect(),
            work_dirs: stats.work_dirs,
            results_written: stats.results,
            results_dropped: plan.dropped_count(),
            conflicts: plan.conflicts().to_vec(),
            status_counts: plan.status_counts(),
            outputs,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            inputs = outcome.inputs.len(),
            work_dirs = outcome.work_dirs,
            results = outcome.results_written,
            conflicts = outcome.conflicts.len(),
            elapsed_ms = outcome.elapsed_ms,
            output = %output.display(),
            "merge complete"
        );
        Ok(outcome)
    }
}

/// Stream the merged XML into a temporary file and move it into place.
///
/// Nothing is left at `path` when the merge fails or is cancelled.
fn write_xml(
    path: &Path,
    indexes: &[ReportIndex],
    plan: &MergePlan,
    cancel: &CancellationToken,
) -> MergeResult<crate::report::writer::WriteStats> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| MergeError::io(parent, e))?;

    let temp = NamedTempFile::new_in(parent).map_err(|e| MergeError::io(parent, e))?;
    let mut writer = XmlReportWriter::new(BufWriter::new(temp), path);
    let stats = writer.write_merged(indexes, plan, cancel)?;

    let temp = writer
        .into_inner()
        .into_inner()
        .map_err(|e| MergeError::io(path, e.into_error()))?;
    temp.persist(path).map_err(|e| MergeError::io(path, e.error))?;
    Ok(stats)
}
