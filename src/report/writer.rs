//! Streaming writer for the merged report.
//!
//! Each input is read again and the `WorkDirectory` / `TestResult` subtrees are
//! copied event by event. Only the id attributes are rewritten, everything
//! else (text, CDATA, comments) goes out exactly as it came in.

use super::reader::{attribute, check_cancel, open};
use crate::error::{MergeError, MergeResult};
use crate::merge::plan::{DROPPED, MergePlan};
use crate::model::ReportIndex;
use crate::scheme::{self, is_element};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    WorkDirectories,
    TestResults,
}

impl Section {
    fn element(self) -> &'static str {
        match self {
            Section::WorkDirectories => scheme::WORK_DIRECTORIES,
            Section::TestResults => scheme::TEST_RESULTS,
        }
    }

    fn child(self) -> &'static str {
        match self {
            Section::WorkDirectories => scheme::WORK_DIRECTORY,
            Section::TestResults => scheme::TEST_RESULT,
        }
    }

    fn id_attribute(self) -> &'static str {
        match self {
            Section::WorkDirectories => scheme::WORK_DIRECTORY_ID,
            Section::TestResults => scheme::TEST_RESULT_WORK_DIR_ID,
        }
    }
}

enum Step {
    Open(BytesStart<'static>, bool),
    Close,
    Skip,
    Eof,
}

/// Counts of what was copied into the merged report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub work_dirs: usize,
    pub results: usize,
}

pub struct XmlReportWriter<W: Write> {
    writer: Writer<W>,
    target: PathBuf,
}

impl<W: Write> XmlReportWriter<W> {
    /// `target` names the destination in error messages.
    pub fn new(inner: W, target: impl Into<PathBuf>) -> Self {
        Self {
            writer: Writer::new(inner),
            target: target.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Write the whole merged document.
    pub fn write_merged(
        &mut self,
        indexes: &[ReportIndex],
        plan: &MergePlan,
        cancel: &CancellationToken,
    ) -> MergeResult<WriteStats> {
        let mut stats = WriteStats::default();

        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.newline(0)?;

        let mut root = BytesStart::new(scheme::REPORT);
        for (key, value) in &merged_root_attributes(indexes) {
            root.push_attribute((key.as_str(), value.as_str()));
        }
        self.emit(Event::Start(root))?;

        for section in [Section::WorkDirectories, Section::TestResults] {
            self.newline(1)?;
            self.emit(Event::Start(BytesStart::new(section.element())))?;
            for index in indexes {
                let written = self.copy_section(index, section, plan, cancel)?;
                match section {
                    Section::WorkDirectories => stats.work_dirs += written,
                    Section::TestResults => stats.results += written,
                }
            }
            self.newline(1)?;
            self.emit(Event::End(BytesEnd::new(section.element())))?;
        }

        self.newline(0)?;
        self.emit(Event::End(BytesEnd::new(scheme::REPORT)))?;
        self.newline(0)?;
        self.writer
            .get_mut()
            .flush()
            .map_err(|e| MergeError::io(&self.target, e))?;

        Ok(stats)
    }

    fn copy_section(
        &mut self,
        index: &ReportIndex,
        section: Section,
        plan: &MergePlan,
        cancel: &CancellationToken,
    ) -> MergeResult<usize> {
        let path = index.source.xml_path.as_path();
        let input = index.input;
        let mut reader = open(path)?;
        let mut buf = Vec::new();
        let mut depth = 0usize;
        let mut in_section = false;
        let mut ordinal = 0usize;
        let mut written = 0usize;

        loop {
            let step = match reader
                .read_event_into(&mut buf)
                .map_err(|err| MergeError::xml(path, err))?
            {
                Event::Start(e) => Step::Open(e.into_owned(), false),
                Event::Empty(e) => Step::Open(e.into_owned(), true),
                Event::End(_) => Step::Close,
                Event::Eof => Step::Eof,
                _ => Step::Skip,
            };
            buf.clear();

            match step {
                Step::Eof => break,
                Step::Skip => {}
                Step::Close => {
                    depth = depth.saturating_sub(1);
                    if depth < 2 {
                        in_section = false;
                    }
                }
                Step::Open(start, is_empty) => {
                    let name = start.local_name();
                    if depth == 2 && in_section && is_element(name.as_ref(), section.child()) {
                        check_cancel(cancel)?;
                        let new_id = match section {
                            Section::WorkDirectories => {
                                let old = id_attribute(&start, section, path)?;
                                plan.new_work_dir_id(input, old)
                            }
                            Section::TestResults => {
                                let old = id_attribute(&start, section, path)?;
                                let id = plan.result_work_dir_id(input, ordinal, old);
                                ordinal += 1;
                                id
                            }
                        }
                        .ok_or_else(|| {
                            MergeError::malformed(
                                path,
                                format!("{} with an unknown id", section.child()),
                            )
                        })?;

                        if new_id == DROPPED {
                            if !is_empty {
                                skip_subtree(&mut reader, path)?;
                            }
                            continue;
                        }

                        let rewritten = rewrite_id(&start, section.id_attribute(), new_id, path)?;
                        self.newline(2)?;
                        if is_empty {
                            self.emit(Event::Empty(rewritten))?;
                        } else {
                            self.emit(Event::Start(rewritten))?;
                            self.copy_subtree(&mut reader, path)?;
                        }
                        written += 1;
                        continue;
                    }

                    if !is_empty {
                        if depth == 1 && is_element(name.as_ref(), section.element()) {
                            in_section = true;
                        }
                        depth += 1;
                    }
                }
            }
        }

        tracing::debug!(
            input,
            section = section.element(),
            written,
            "copied section"
        );
        Ok(written)
    }

    /// Copy events up to and including the end tag closing the element just opened.
    fn copy_subtree<R: BufRead>(&mut self, reader: &mut Reader<R>, path: &Path) -> MergeResult<()> {
        let mut depth = 1usize;
        let mut buf = Vec::new();
        loop {
            let done = {
                let event = reader
                    .read_event_into(&mut buf)
                    .map_err(|err| MergeError::xml(path, err))?;
                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    Event::Eof => {
                        return Err(MergeError::malformed(path, "document ends inside an element"));
                    }
                    _ => {}
                }
                self.emit(event)?;
                depth == 0
            };
            buf.clear();
            if done {
                return Ok(());
            }
        }
    }

    fn newline(&mut self, indent: usize) -> MergeResult<()> {
        let text = format!("\n{}", "  ".repeat(indent));
        self.emit(Event::Text(BytesText::from_escaped(text)))
    }

    fn emit(&mut self, event: Event<'_>) -> MergeResult<()> {
        self.writer
            .write_event(event)
            .map_err(|err| MergeError::xml(&self.target, err))
    }
}

/// The first input's root attributes plus namespace declarations bound on
/// the other inputs' roots, so prefixed elements copied from any input stay bound.
///
/// A prefix bound to different URIs by different inputs keeps the first binding.
fn merged_root_attributes(indexes: &[ReportIndex]) -> Vec<(String, String)> {
    let mut attributes = indexes
        .first()
        .map(|index| index.root_attributes.clone())
        .unwrap_or_default();
    for index in indexes.iter().skip(1) {
        for (key, value) in &index.root_attributes {
            if key != "xmlns" && !key.starts_with("xmlns:") {
                continue;
            }
            match attributes.iter().find(|(bound, _)| bound == key) {
                None => attributes.push((key.clone(), value.clone())),
                Some((_, first)) if first != value => tracing::warn!(
                    input = index.input,
                    prefix = %key,
                    kept = %first,
                    dropped = %value,
                    "namespace prefix bound to different URIs"
                ),
                Some(_) => {}
            }
        }
    }
    attributes
}

fn id_attribute(start: &BytesStart, section: Section, path: &Path) -> MergeResult<i64> {
    let raw = attribute(start, section.id_attribute(), path)?.unwrap_or_default();
    raw.trim().parse().map_err(|_| {
        MergeError::malformed(
            path,
            format!(
                "{} has non-numeric {} {:?}",
                section.child(),
                section.id_attribute(),
                raw
            ),
        )
    })
}

fn rewrite_id(
    start: &BytesStart,
    key: &str,
    value: i64,
    path: &Path,
) -> MergeResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let value = value.to_string();
    let mut out = BytesStart::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| MergeError::xml(path, err))?;
        if attr.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value.as_str()));
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(out)
}

fn skip_subtree<R: BufRead>(reader: &mut Reader<R>, path: &Path) -> MergeResult<()> {
    let mut depth = 1usize;
    let mut buf = Vec::new();
    while depth > 0 {
        match reader
            .read_event_into(&mut buf)
            .map_err(|err| MergeError::xml(path, err))?
        {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(MergeError::malformed(path, "document ends inside an element"));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}
