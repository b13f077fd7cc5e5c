//! Element and attribute names of the XML test-run report.

pub const REPORT: &str = "Report";

pub const WORK_DIRECTORIES: &str = "WorkDirectories";
pub const WORK_DIRECTORY: &str = "WorkDirectory";
pub const WORK_DIRECTORY_ID: &str = "id";

pub const TEST_RESULTS: &str = "TestResults";
pub const TEST_RESULT: &str = "TestResult";
pub const TEST_RESULT_URL: &str = "url";
pub const TEST_RESULT_WORK_DIR_ID: &str = "workDirID";
pub const TEST_RESULT_STATUS: &str = "status";

pub const RESULT_PROPERTIES: &str = "ResultProperties";
pub const PROPERTY: &str = "Property";
pub const PROPERTY_NAME: &str = "name";
pub const PROPERTY_VALUE: &str = "value";

pub const INTERVIEW: &str = "Interview";
pub const QUESTION: &str = "Question";
pub const SECTIONS: &str = "Sections";
pub const SECTION: &str = "Section";
pub const OUTPUT: &str = "Output";

/// Result property carrying the time a test finished.
pub const END_TIME_PROPERTY: &str = "end";

/// Marker file identifying a report directory.
pub const REPORT_DIR_MARKER: &str = "reportdir.dat";
/// Location of the XML report inside a report directory.
pub const REPORT_DIR_XML: &str = "xml/report.xml";
pub const REPORT_DIR_SUMMARY: &str = "text/summary.txt";
pub const REPORT_DIR_INDEX: &str = "index.html";
pub const REPORT_DIR_HTML: &str = "html";

/// True when `name` (possibly prefixed, e.g. `r:TestResult`) has local name `local`.
pub fn is_element(name: &[u8], local: &str) -> bool {
    let local_part = match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    };
    local_part == local.as_bytes()
}
