//! Conflict resolution strategies
//!
//! A conflict is one test url that appears more than once across the inputs.
//! A resolver picks the candidate whose result survives in the merged report.

use crate::config::ResolveStrategy;
use crate::error::{MergeError, MergeResult};
use crate::model::TestStatus;
use chrono::{DateTime, FixedOffset};
use std::io::{self, BufRead, BufReader, Write};

/// One of the results competing for a url.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub input: usize,
    pub ordinal: usize,
    pub source: String,
    pub status: TestStatus,
    pub end_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub url: String,
    /// Ordered by input, then document order.
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the candidate at this index.
    Keep(usize),
    /// Abort the whole merge.
    Cancel,
}

pub trait ConflictResolver: Send {
    fn resolve(&mut self, conflict: &Conflict) -> MergeResult<Resolution>;
}

/// Index of the most recent candidate.
///
/// Candidates without a timestamp lose to any with one; ties go to the earliest.
pub fn most_recent_index(candidates: &[Candidate]) -> usize {
    let mut best = 0;
    for (idx, candidate) in candidates.iter().enumerate().skip(1) {
        let newer = match (&candidate.end_time, &candidates[best].end_time) {
            (Some(time), Some(best_time)) => time > best_time,
            (Some(_), None) => true,
            _ => false,
        };
        if newer {
            best = idx;
        }
    }
    best
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MostRecentResolver;

impl ConflictResolver for MostRecentResolver {
    fn resolve(&mut self, conflict: &Conflict) -> MergeResult<Resolution> {
        let idx = most_recent_index(&conflict.candidates);
        tracing::debug!(url = %conflict.url, winner = idx, "resolved by most recent");
        Ok(Resolution::Keep(idx))
    }
}

/// Refuses every conflict.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailResolver;

impl ConflictResolver for FailResolver {
    fn resolve(&mut self, conflict: &Conflict) -> MergeResult<Resolution> {
        Err(MergeError::UnresolvedConflict {
            url: conflict.url.clone(),
            inputs: conflict
                .candidates
                .iter()
                .map(|c| c.source.clone())
                .collect(),
        })
    }
}

/// Asks the user to pick a winner for each conflict.
///
/// Answers: a candidate number, `m` to take the most recent result for this
/// and every later conflict, `q` to cancel. End of input cancels.
pub struct InteractiveResolver<R, W> {
    input: R,
    output: W,
    most_recent_from_now: bool,
}

impl InteractiveResolver<BufReader<io::Stdin>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr())
    }
}

impl<R: BufRead, W: Write> InteractiveResolver<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            most_recent_from_now: false,
        }
    }

    fn prompt(&mut self, conflict: &Conflict) -> io::Result<()> {
        writeln!(self.output, "Conflict: {}", conflict.url)?;
        for (idx, candidate) in conflict.candidates.iter().enumerate() {
            let time = candidate
                .end_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown time".to_string());
            writeln!(
                self.output,
                "  [{}] {} ({}, {})",
                idx + 1,
                candidate.source,
                candidate.status,
                time
            )?;
        }
        write!(
            self.output,
            "Keep which result? [1-{}, m = most recent for all, q = cancel]: ",
            conflict.candidates.len()
        )?;
        self.output.flush()
    }
}

impl<R: BufRead + Send, W: Write + Send> ConflictResolver for InteractiveResolver<R, W> {
    fn resolve(&mut self, conflict: &Conflict) -> MergeResult<Resolution> {
        if self.most_recent_from_now {
            return Ok(Resolution::Keep(most_recent_index(&conflict.candidates)));
        }

        let resolver_error = |e: io::Error| MergeError::Resolver {
            url: conflict.url.clone(),
            message: e.to_string(),
        };

        loop {
            self.prompt(conflict).map_err(resolver_error)?;

            let mut line = String::new();
            let read = self.input.read_line(&mut line).map_err(resolver_error)?;
            if read == 0 {
                tracing::info!(url = %conflict.url, "no answer for conflict, cancelling");
                return Ok(Resolution::Cancel);
            }

            match line.trim() {
                "q" | "Q" => return Ok(Resolution::Cancel),
                "m" | "M" => {
                    self.most_recent_from_now = true;
                    return Ok(Resolution::Keep(most_recent_index(&conflict.candidates)));
                }
                answer => match answer.parse::<usize>() {
                    Ok(n) if (1..=conflict.candidates.len()).contains(&n) => {
                        return Ok(Resolution::Keep(n - 1));
                    }
                    _ => {
                        writeln!(self.output, "Invalid choice {:?}", answer)
                            .map_err(resolver_error)?;
                    }
                },
            }
        }
    }
}

pub fn resolver_for(strategy: ResolveStrategy) -> Box<dyn ConflictResolver> {
    match strategy {
        ResolveStrategy::MostRecent => Box::new(MostRecentResolver),
        ResolveStrategy::Interactive => Box::new(InteractiveResolver::stdio()),
        ResolveStrategy::Fail => Box::new(FailResolver),
    }
}
