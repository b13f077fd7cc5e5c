use crate::error::{MergeError, MergeResult};
use crate::model::{ReportIndex, ReportSource, TestResultDescr, TestStatus, WorkDirDescr};
use crate::scheme::{self, is_element};
use crate::utils::parse_result_time;
use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Open a report for streaming.
pub(crate) fn open(path: &Path) -> MergeResult<Reader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| MergeError::io(path, e))?;
    Ok(Reader::from_reader(BufReader::new(file)))
}

/// Value of attribute `key` on `e`, unescaped.
pub(crate) fn attribute(e: &BytesStart, key: &str, path: &Path) -> MergeResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| MergeError::xml(path, err))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| MergeError::xml(path, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn integer_attribute(e: &BytesStart, key: &str, element: &str, path: &Path) -> MergeResult<i64> {
    let raw = attribute(e, key, path)?.ok_or_else(|| {
        MergeError::malformed(path, format!("{} without a {} attribute", element, key))
    })?;
    raw.trim().parse::<i64>().map_err(|_| {
        MergeError::malformed(
            path,
            format!("{} has non-numeric {} {:?}", element, key, raw),
        )
    })
}

enum Step {
    Open(BytesStart<'static>, bool),
    Close,
    Skip,
}

struct PendingResult {
    url: String,
    work_dir_id: i64,
    status: TestStatus,
    end_time: Option<DateTime<FixedOffset>>,
}

/// First pass over one input: collect work directory ids and test result descriptors.
pub fn scan(
    source: &ReportSource,
    input: usize,
    cancel: &CancellationToken,
) -> MergeResult<ReportIndex> {
    let reader = open(&source.xml_path)?;
    scan_reader(reader, source, input, cancel)
}

pub(crate) fn scan_reader<R: BufRead>(
    mut reader: Reader<R>,
    source: &ReportSource,
    input: usize,
    cancel: &CancellationToken,
) -> MergeResult<ReportIndex> {
    let path = source.xml_path.as_path();
    let mut index = ReportIndex {
        input,
        source: source.clone(),
        root_attributes: Vec::new(),
        work_dirs: Vec::new(),
        results: Vec::new(),
    };
    let mut seen_work_dirs = HashSet::new();
    // local names of open elements
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut pending: Option<PendingResult> = None;
    let mut buf = Vec::new();

    loop {
        let step = match reader
            .read_event_into(&mut buf)
            .map_err(|err| MergeError::xml(path, err))?
        {
            Event::Start(e) => Step::Open(e.into_owned(), false),
            Event::Empty(e) => Step::Open(e.into_owned(), true),
            Event::End(_) => Step::Close,
            Event::Eof => break,
            _ => Step::Skip,
        };
        buf.clear();

        let (start, is_empty) = match step {
            Step::Open(start, is_empty) => (start, is_empty),
            Step::Close => {
                if let Some(name) = stack.pop()
                    && stack.len() == 2
                    && is_element(&name, scheme::TEST_RESULT)
                    && let Some(result) = pending.take()
                {
                    push_result(&mut index, result, input);
                }
                continue;
            }
            Step::Skip => continue,
        };

        let name = start.local_name().as_ref().to_vec();
        if !seen_root {
            if !is_element(&name, scheme::REPORT) {
                return Err(MergeError::NotAReport {
                    path: path.to_path_buf(),
                    reason: format!(
                        "root element is {:?}",
                        String::from_utf8_lossy(start.name().as_ref())
                    ),
                });
            }
            seen_root = true;
            for attr in start.attributes() {
                let attr = attr.map_err(|err| MergeError::xml(path, err))?;
                let value = attr
                    .unescape_value()
                    .map_err(|err| MergeError::xml(path, err))?;
                index.root_attributes.push((
                    String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                    value.into_owned(),
                ));
            }
        } else {
            // work directories and results are children of a top-level section
            let in_section = stack.len() == 2;
            let parent = stack.last().map(Vec::as_slice).unwrap_or_default();
            if in_section
                && is_element(&name, scheme::WORK_DIRECTORY)
                && is_element(parent, scheme::WORK_DIRECTORIES)
            {
                check_cancel(cancel)?;
                let id = integer_attribute(
                    &start,
                    scheme::WORK_DIRECTORY_ID,
                    scheme::WORK_DIRECTORY,
                    path,
                )?;
                if !seen_work_dirs.insert(id) {
                    return Err(MergeError::malformed(
                        path,
                        format!("work directory id {} declared twice", id),
                    ));
                }
                index.work_dirs.push(WorkDirDescr { input, id });
            } else if in_section
                && is_element(&name, scheme::TEST_RESULT)
                && is_element(parent, scheme::TEST_RESULTS)
            {
                check_cancel(cancel)?;
                let result = start_result(&start, path)?;
                if is_empty {
                    push_result(&mut index, result, input);
                } else {
                    pending = Some(result);
                }
            } else if is_element(&name, scheme::PROPERTY)
                && is_element(parent, scheme::RESULT_PROPERTIES)
                && let Some(result) = pending.as_mut()
                && attribute(&start, scheme::PROPERTY_NAME, path)?.as_deref()
                    == Some(scheme::END_TIME_PROPERTY)
            {
                let raw = attribute(&start, scheme::PROPERTY_VALUE, path)?.unwrap_or_default();
                result.end_time = parse_result_time(&raw);
                if result.end_time.is_none() {
                    tracing::debug!(url = %result.url, value = %raw, "unparseable end time");
                }
            }
        }

        if !is_empty {
            stack.push(name);
        }
    }

    if !seen_root {
        return Err(MergeError::NotAReport {
            path: path.to_path_buf(),
            reason: "document has no root element".to_string(),
        });
    }

    for result in &index.results {
        if !seen_work_dirs.contains(&result.work_dir_id) {
            return Err(MergeError::malformed(
                path,
                format!(
                    "test {} refers to undeclared work directory {}",
                    result.url, result.work_dir_id
                ),
            ));
        }
    }

    tracing::debug!(
        input,
        path = %path.display(),
        work_dirs = index.work_dirs.len(),
        results = index.results.len(),
        "scanned report"
    );

    Ok(index)
}

fn start_result(e: &BytesStart, path: &Path) -> MergeResult<PendingResult> {
    let url = attribute(e, scheme::TEST_RESULT_URL, path)?
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| MergeError::malformed(path, "TestResult without a url"))?;
    let work_dir_id = integer_attribute(
        e,
        scheme::TEST_RESULT_WORK_DIR_ID,
        scheme::TEST_RESULT,
        path,
    )?;
    let status = attribute(e, scheme::TEST_RESULT_STATUS, path)?
        .map(|raw| TestStatus::parse(&raw))
        .unwrap_or(TestStatus::NotRun);
    Ok(PendingResult {
        url,
        work_dir_id,
        status,
        end_time: None,
    })
}

fn push_result(index: &mut ReportIndex, result: PendingResult, input: usize) {
    let ordinal = index.results.len();
    index.results.push(TestResultDescr {
        input,
        ordinal,
        url: result.url,
        work_dir_id: result.work_dir_id,
        status: result.status,
        end_time: result.end_time,
    });
}

pub(crate) fn check_cancel(cancel: &CancellationToken) -> MergeResult<()> {
    if cancel.is_cancelled() {
        Err(MergeError::Cancelled)
    } else {
        Ok(())
    }
}
