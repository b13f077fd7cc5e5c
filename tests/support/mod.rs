#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use report_merge::model::{ReportIndex, ReportSource};
use report_merge::report::reader::scan;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// One `TestResult` in a fixture report.
#[derive(Debug, Clone)]
pub struct ResultFixture {
    pub url: String,
    pub work_dir: i64,
    pub status: String,
    pub end: Option<String>,
    pub output: Option<String>,
}

impl ResultFixture {
    pub fn new(url: &str, work_dir: i64, status: &str) -> Self {
        Self {
            url: url.to_string(),
            work_dir,
            status: status.to_string(),
            end: None,
            output: None,
        }
    }

    pub fn ended(mut self, end: &str) -> Self {
        self.end = Some(end.to_string());
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }
}

/// Render a report the way the harness writes them.
pub fn report_xml(generator: &str, work_dirs: &[i64], results: &[ResultFixture]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<Report xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" formatVersion=\"v1\" generator=\"{}\">\n",
        generator
    ));
    xml.push_str("  <WorkDirectories>\n");
    for id in work_dirs {
        xml.push_str(&format!(
            "    <WorkDirectory id=\"{id}\" jti=\"/runs/{generator}/{id}.jti\">\n      <TestSuite root=\"/suites/{generator}\"/>\n    </WorkDirectory>\n"
        ));
    }
    xml.push_str("  </WorkDirectories>\n");
    xml.push_str("  <Interview><Question name=\"tests\" value=\"all\"/></Interview>\n");
    xml.push_str("  <TestResults>\n");
    for result in results {
        xml.push_str(&format!(
            "    <TestResult url=\"{}\" workDirID=\"{}\" status=\"{}\">\n",
            result.url, result.work_dir, result.status
        ));
        xml.push_str("      <ResultProperties>\n");
        if let Some(end) = &result.end {
            xml.push_str(&format!("        <Property name=\"end\" value=\"{}\"/>\n", end));
        }
        xml.push_str("      </ResultProperties>\n");
        if let Some(output) = &result.output {
            xml.push_str(&format!(
                "      <Sections><Section><Output title=\"out1\">{}</Output></Section></Sections>\n",
                output
            ));
        }
        xml.push_str("    </TestResult>\n");
    }
    xml.push_str("  </TestResults>\n");
    xml.push_str("</Report>\n");
    xml
}

pub struct Workspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dir");
        }
        fs::write(&path, contents).expect("write fixture");
        path
    }

    pub fn report(&self, relative: &str, work_dirs: &[i64], results: &[ResultFixture]) -> PathBuf {
        self.write(relative, &report_xml(relative, work_dirs, results))
    }
}

/// Scan a merged report back into descriptors.
pub fn rescan(xml_path: &Path) -> ReportIndex {
    let source = ReportSource {
        requested: xml_path.to_path_buf(),
        xml_path: xml_path.to_path_buf(),
    };
    scan(&source, 0, &CancellationToken::new()).expect("merged report scans")
}
