//! Report files and report directories on disk.

pub mod reader;
pub mod summary;
pub mod writer;

use crate::error::{MergeError, MergeResult};
use crate::model::ReportSource;
use crate::scheme::{REPORT_DIR_MARKER, REPORT_DIR_XML};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Resolve a command-line path to the XML file it names.
///
/// A path is either an XML report file or a report directory holding
/// `xml/report.xml`.
pub fn resolve_source(path: &Path) -> MergeResult<ReportSource> {
    if path.is_file() {
        return Ok(ReportSource {
            requested: path.to_path_buf(),
            xml_path: path.to_path_buf(),
        });
    }

    if path.is_dir() {
        let xml_path = path.join(REPORT_DIR_XML);
        if xml_path.is_file() {
            return Ok(ReportSource {
                requested: path.to_path_buf(),
                xml_path,
            });
        }
        return Err(MergeError::NotAReport {
            path: path.to_path_buf(),
            reason: format!("directory has no {}", REPORT_DIR_XML),
        });
    }

    Err(MergeError::NotAReport {
        path: path.to_path_buf(),
        reason: "no such file or directory".to_string(),
    })
}

pub fn is_report_dir(path: &Path) -> bool {
    path.join(REPORT_DIR_MARKER).is_file()
}

/// Check that `root` may receive a report directory.
///
/// Nothing is created. A missing or empty directory is fine; a non-empty one
/// must already be a report directory and `overwrite` must be set.
pub fn check_report_dir_target(root: &Path, overwrite: bool) -> MergeResult<()> {
    if !root.exists() {
        return Ok(());
    }
    if !root.is_dir() {
        return Err(MergeError::NotAReportDir {
            path: root.to_path_buf(),
        });
    }
    let empty = fs::read_dir(root)
        .map_err(|e| MergeError::io(root, e))?
        .next()
        .is_none();
    if empty {
        return Ok(());
    }
    if !is_report_dir(root) {
        return Err(MergeError::NotAReportDir {
            path: root.to_path_buf(),
        });
    }
    if !overwrite {
        return Err(MergeError::OutputExists {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

/// A report directory being written.
#[derive(Debug, Clone)]
pub struct ReportDir {
    root: PathBuf,
}

impl ReportDir {
    /// Lay out `xml/`, `text/` and `html/` under an existing `root`.
    pub fn create(root: &Path) -> MergeResult<Self> {
        for sub in ["xml", "text", "html"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| MergeError::io(&dir, e))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn xml_path(&self) -> PathBuf {
        self.path(REPORT_DIR_XML)
    }

    /// Write the marker last so a half-written directory is never taken for a report.
    pub fn write_marker(&self) -> MergeResult<PathBuf> {
        let marker = self.path(REPORT_DIR_MARKER);
        let contents = format!(
            "#Report directory\n#{}\n",
            Utc::now().format("%a %b %d %H:%M:%S UTC %Y")
        );
        fs::write(&marker, contents).map_err(|e| MergeError::io(&marker, e))?;
        Ok(marker)
    }
}

/// A report directory built in a hidden sibling of its target.
///
/// Dropping it without [`StagedReportDir::commit`] removes everything written
/// so far, so a failed or cancelled merge leaves the target untouched.
#[derive(Debug)]
pub struct StagedReportDir {
    staging: TempDir,
    dir: ReportDir,
    target: PathBuf,
    overwrite: bool,
}

impl StagedReportDir {
    pub fn new(target: &Path, overwrite: bool) -> MergeResult<Self> {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| MergeError::io(parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".report-merge-")
            .tempdir_in(parent)
            .map_err(|e| MergeError::io(parent, e))?;
        let dir = ReportDir::create(staging.path())?;
        Ok(Self {
            staging,
            dir,
            target: target.to_path_buf(),
            overwrite,
        })
    }

    pub fn dir(&self) -> &ReportDir {
        &self.dir
    }

    /// Where a file written under the staging directory ends up after commit.
    pub fn final_path(&self, staged: &Path) -> PathBuf {
        staged
            .strip_prefix(self.staging.path())
            .map(|relative| self.target.join(relative))
            .unwrap_or_else(|_| staged.to_path_buf())
    }

    /// Replace the target with the staged directory.
    pub fn commit(self) -> MergeResult<PathBuf> {
        // the target may have changed while the merge ran
        check_report_dir_target(&self.target, self.overwrite)?;
        if self.target.exists() {
            tracing::info!(path = %self.target.display(), "replacing existing report directory");
            fs::remove_dir_all(&self.target).map_err(|e| MergeError::io(&self.target, e))?;
        }
        fs::rename(self.staging.path(), &self.target)
            .map_err(|e| MergeError::io(&self.target, e))?;
        Ok(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn resolves_plain_xml_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.xml");
        fs::write(&file, "<Report/>").unwrap();

        let source = resolve_source(&file).unwrap();
        assert_eq!(source.xml_path, file);
    }

    #[test]
    fn resolves_report_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("xml")).unwrap();
        fs::write(dir.path().join(REPORT_DIR_XML), "<Report/>").unwrap();

        let source = resolve_source(dir.path()).unwrap();
        assert_eq!(source.requested, dir.path());
        assert_eq!(source.xml_path, dir.path().join(REPORT_DIR_XML));
    }

    #[test]
    fn rejects_directory_without_xml() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            resolve_source(dir.path()),
            Err(MergeError::NotAReport { .. })
        );
    }

    #[test]
    fn refuses_foreign_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert_matches!(
            check_report_dir_target(dir.path(), true),
            Err(MergeError::NotAReportDir { .. })
        );
    }

    #[test]
    fn existing_report_dir_requires_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REPORT_DIR_MARKER), "").unwrap();

        assert_matches!(
            check_report_dir_target(dir.path(), false),
            Err(MergeError::OutputExists { .. })
        );
        assert!(check_report_dir_target(dir.path(), true).is_ok());
        assert!(check_report_dir_target(&dir.path().join("fresh"), false).is_ok());
    }

    #[test]
    fn dropped_staging_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        {
            let staged = StagedReportDir::new(&target, false).unwrap();
            fs::write(staged.dir().xml_path(), "<Report/>").unwrap();
        }
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn commit_replaces_existing_report() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        fs::create_dir_all(target.join("html")).unwrap();
        fs::write(target.join(REPORT_DIR_MARKER), "").unwrap();
        fs::write(target.join("html/stale.html"), "old").unwrap();

        let staged = StagedReportDir::new(&target, true).unwrap();
        let xml = staged.dir().xml_path();
        fs::write(&xml, "<Report/>").unwrap();
        assert_eq!(staged.final_path(&xml), target.join(REPORT_DIR_XML));
        staged.commit().unwrap();

        assert!(target.join(REPORT_DIR_XML).is_file());
        assert!(!target.join("html/stale.html").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
