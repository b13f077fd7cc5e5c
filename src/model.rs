use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use strum::EnumString;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    NotRun,
    #[strum(default)]
    Other(String),
}

impl TestStatus {
    pub const KNOWN: [TestStatus; 4] = [
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Error,
        TestStatus::NotRun,
    ];

    pub fn parse(raw: &str) -> Self {
        // EnumString with a default variant never fails
        raw.trim()
            .parse()
            .unwrap_or_else(|_| TestStatus::Other(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Error => "ERROR",
            TestStatus::NotRun => "NOT_RUN",
            TestStatus::Other(raw) => raw.as_str(),
        }
    }

    /// Page listing results with this status inside a report directory.
    pub fn page_name(&self) -> Option<&'static str> {
        match self {
            TestStatus::Passed => Some("passed.html"),
            TestStatus::Failed => Some("failed.html"),
            TestStatus::Error => Some("error.html"),
            TestStatus::NotRun => Some("notRun.html"),
            TestStatus::Other(_) => None,
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSource {
    /// Path given on the command line.
    pub requested: PathBuf,
    /// XML file that is actually read.
    pub xml_path: PathBuf,
}

impl ReportSource {
    pub fn display_name(&self) -> String {
        self.requested.display().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WorkDirDescr {
    pub input: usize,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResultDescr {
    pub input: usize,
    /// Document-order position among the input's test results.
    pub ordinal: usize,
    pub url: String,
    pub work_dir_id: i64,
    pub status: TestStatus,
    pub end_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct ReportIndex {
    /// Position of this input on the command line.
    pub input: usize,
    pub source: ReportSource,
    pub root_attributes: Vec<(String, String)>,
    pub work_dirs: Vec<WorkDirDescr>,
    pub results: Vec<TestResultDescr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub url: String,
    pub candidates: Vec<String>,
    pub winner: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MergeOutcome {
    pub inputs: Vec<String>,
    pub work_dirs: usize,
    pub results_written: usize,
    pub results_dropped: usize,
    pub conflicts: Vec<ConflictRecord>,
    pub status_counts: IndexMap<String, usize>,
    pub outputs: Vec<PathBuf>,
    pub elapsed_ms: u64,
}
