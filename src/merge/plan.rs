use super::resolver::{Candidate, Conflict, ConflictResolver, Resolution};
use crate::error::{MergeError, MergeResult};
use crate::model::{ConflictRecord, ReportIndex, TestResultDescr, TestStatus};
use crate::report::reader::check_cancel;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

/// Work directory id given to results that lost a conflict.
pub const DROPPED: i64 = -1;

/// Renumbered ids and conflict winners for a set of scanned inputs.
#[derive(Debug, Default)]
pub struct MergePlan {
    work_dir_ids: HashMap<(usize, i64), i64>,
    dropped: HashSet<(usize, usize)>,
    conflicts: Vec<ConflictRecord>,
    kept: Vec<TestResultDescr>,
}

impl MergePlan {
    pub fn build(
        indexes: &[ReportIndex],
        resolver: &mut dyn ConflictResolver,
        cancel: &CancellationToken,
    ) -> MergeResult<Self> {
        let mut plan = MergePlan::default();

        let mut next_id = 0i64;
        for index in indexes {
            for wd in &index.work_dirs {
                plan.work_dir_ids.insert((wd.input, wd.id), next_id);
                next_id += 1;
            }
        }

        let mut by_url: IndexMap<&str, Vec<&TestResultDescr>> = IndexMap::new();
        for index in indexes {
            for result in &index.results {
                by_url.entry(result.url.as_str()).or_default().push(result);
            }
        }

        for (url, results) in &by_url {
            if results.len() < 2 {
                continue;
            }
            check_cancel(cancel)?;

            let conflict = Conflict {
                url: url.to_string(),
                candidates: results
                    .iter()
                    .map(|r| Candidate {
                        input: r.input,
                        ordinal: r.ordinal,
                        source: indexes[r.input].source.display_name(),
                        status: r.status.clone(),
                        end_time: r.end_time,
                    })
                    .collect(),
            };

            let winner = match resolver.resolve(&conflict)? {
                Resolution::Keep(idx) if idx < results.len() => idx,
                Resolution::Keep(idx) => {
                    return Err(MergeError::Resolver {
                        url: conflict.url,
                        message: format!(
                            "chose candidate {} of {}",
                            idx + 1,
                            results.len()
                        ),
                    });
                }
                Resolution::Cancel => return Err(MergeError::Cancelled),
            };

            for (idx, loser) in results.iter().enumerate() {
                if idx != winner {
                    plan.dropped.insert((loser.input, loser.ordinal));
                }
            }

            tracing::info!(
                url = %conflict.url,
                candidates = results.len(),
                winner = %conflict.candidates[winner].source,
                "resolved conflict"
            );
            plan.conflicts.push(ConflictRecord {
                url: conflict.url.clone(),
                candidates: conflict
                    .candidates
                    .iter()
                    .map(|c| c.source.clone())
                    .collect(),
                winner: conflict.candidates[winner].source.clone(),
            });
        }

        plan.kept = indexes
            .iter()
            .flat_map(|index| index.results.iter())
            .filter(|r| !plan.dropped.contains(&(r.input, r.ordinal)))
            .cloned()
            .collect();

        Ok(plan)
    }

    /// New id for work directory `old` of `input`.
    pub fn new_work_dir_id(&self, input: usize, old: i64) -> Option<i64> {
        self.work_dir_ids.get(&(input, old)).copied()
    }

    /// Work directory id a test result is written with; [`DROPPED`] for conflict losers.
    pub fn result_work_dir_id(&self, input: usize, ordinal: usize, old: i64) -> Option<i64> {
        if self.dropped.contains(&(input, ordinal)) {
            Some(DROPPED)
        } else {
            self.new_work_dir_id(input, old)
        }
    }

    pub fn is_kept(&self, input: usize, ordinal: usize) -> bool {
        !self.dropped.contains(&(input, ordinal))
    }

    pub fn work_dir_count(&self) -> usize {
        self.work_dir_ids.len()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn kept(&self) -> &[TestResultDescr] {
        &self.kept
    }

    /// Kept results per status; known statuses always present, in a fixed order.
    pub fn status_counts(&self) -> IndexMap<String, usize> {
        let mut counts: IndexMap<String, usize> = TestStatus::KNOWN
            .iter()
            .map(|status| (status.to_string(), 0))
            .collect();
        for result in &self.kept {
            *counts.entry(result.status.to_string()).or_default() += 1;
        }
        counts
    }
}
