//! Summary pages written next to the merged XML in a report directory.

use super::ReportDir;
use crate::error::{MergeError, MergeResult};
use crate::merge::plan::MergePlan;
use crate::model::{ReportIndex, TestStatus};
use crate::scheme::{REPORT_DIR_HTML, REPORT_DIR_INDEX, REPORT_DIR_SUMMARY, REPORT_DIR_XML};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Tera};

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Merged Test Report</title></head>
<body>
<h1>Merged Test Report</h1>
<p>Generated {{ generated }}</p>
<h2>Inputs</h2>
<ol>
{%- for input in inputs %}
<li>{{ input }}</li>
{%- endfor %}
</ol>
<h2>Results</h2>
<table border="1">
<tr><th>Status</th><th>Tests</th></tr>
{%- for row in totals %}
<tr><td>{% if row.page %}<a href="html/{{ row.page }}">{{ row.status }}</a>{% else %}{{ row.status }}{% endif %}</td><td>{{ row.count }}</td></tr>
{%- endfor %}
<tr><td>Total</td><td>{{ total }}</td></tr>
</table>
{%- if conflicts %}
<h2>Conflicts</h2>
<table border="1">
<tr><th>Test</th><th>Candidates</th><th>Kept</th></tr>
{%- for conflict in conflicts %}
<tr><td>{{ conflict.url }}</td><td>{{ conflict.candidates | join(sep=", ") }}</td><td>{{ conflict.winner }}</td></tr>
{%- endfor %}
</table>
{%- endif %}
<p><a href="{{ xml_report }}">XML report</a></p>
</body>
</html>
"#;

const STATUS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head><title>{{ status }} tests</title></head>
<body>
<h1>{{ status }} tests ({{ tests | length }})</h1>
<ul>
{%- for test in tests %}
<li>{{ test.url }}</li>
{%- endfor %}
</ul>
<p><a href="../index.html">Back</a></p>
</body>
</html>
"#;

const SUMMARY_TEMPLATE: &str = "{% for test in tests %}{{ test.url }} {{ test.status }}\n{% endfor %}";

#[derive(Debug, Serialize)]
struct TotalRow {
    status: String,
    page: Option<&'static str>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct TestRow {
    url: String,
    status: String,
}

/// Write `index.html`, `text/summary.txt` and the per-status pages.
pub fn write_summary(
    dir: &ReportDir,
    indexes: &[ReportIndex],
    plan: &MergePlan,
) -> MergeResult<Vec<PathBuf>> {
    let mut tests: Vec<TestRow> = plan
        .kept()
        .iter()
        .map(|r| TestRow {
            url: r.url.clone(),
            status: r.status.to_string(),
        })
        .collect();
    tests.sort_by(|a, b| a.url.cmp(&b.url));

    let counts = plan.status_counts();
    let totals: Vec<TotalRow> = counts
        .iter()
        .map(|(status, count)| TotalRow {
            status: status.clone(),
            page: TestStatus::parse(status).page_name(),
            count: *count,
        })
        .collect();

    let mut written = Vec::new();

    let mut context = Context::new();
    context.insert("generated", &Utc::now().to_rfc3339());
    context.insert(
        "inputs",
        &indexes
            .iter()
            .map(|index| index.source.display_name())
            .collect::<Vec<_>>(),
    );
    context.insert("totals", &totals);
    context.insert("total", &tests.len());
    context.insert("conflicts", plan.conflicts());
    context.insert("xml_report", REPORT_DIR_XML);
    written.push(render_to(dir, REPORT_DIR_INDEX, INDEX_TEMPLATE, &context, true)?);

    let mut context = Context::new();
    context.insert("tests", &tests);
    written.push(render_to(dir, REPORT_DIR_SUMMARY, SUMMARY_TEMPLATE, &context, false)?);

    for status in TestStatus::KNOWN.iter() {
        let Some(page) = status.page_name() else {
            continue;
        };
        let label = status.to_string();
        let matching: Vec<&TestRow> = tests.iter().filter(|t| t.status == label).collect();
        let mut context = Context::new();
        context.insert("status", &label);
        context.insert("tests", &matching);
        let relative = format!("{}/{}", REPORT_DIR_HTML, page);
        written.push(render_to(dir, &relative, STATUS_TEMPLATE, &context, true)?);
    }

    tracing::debug!(files = written.len(), "wrote summary pages");
    Ok(written)
}

fn render_to(
    dir: &ReportDir,
    relative: &str,
    template: &str,
    context: &Context,
    autoescape: bool,
) -> MergeResult<PathBuf> {
    let rendered =
        Tera::one_off(template, context, autoescape).map_err(|source| MergeError::Render {
            template: relative.to_string(),
            source,
        })?;
    let path = dir.path(relative);
    fs::write(&path, rendered).map_err(|e| MergeError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::resolver::MostRecentResolver;
    use crate::model::{ReportSource, TestResultDescr, WorkDirDescr};
    use tokio_util::sync::CancellationToken;

    fn index(input: usize, results: &[(&str, TestStatus)]) -> ReportIndex {
        let name = format!("run{}.xml", input);
        ReportIndex {
            input,
            source: ReportSource {
                requested: PathBuf::from(&name),
                xml_path: PathBuf::from(&name),
            },
            root_attributes: Vec::new(),
            work_dirs: vec![WorkDirDescr { input, id: 0 }],
            results: results
                .iter()
                .enumerate()
                .map(|(ordinal, (url, status))| TestResultDescr {
                    input,
                    ordinal,
                    url: url.to_string(),
                    work_dir_id: 0,
                    status: status.clone(),
                    end_time: None,
                })
                .collect(),
        }
    }

    #[test]
    fn writes_all_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ReportDir::create(&tmp.path().join("out")).unwrap();
        let indexes = vec![
            index(0, &[("api/b.html", TestStatus::Passed), ("api/a.html", TestStatus::Failed)]),
            index(1, &[("api/a.html", TestStatus::Passed)]),
        ];
        let plan =
            MergePlan::build(&indexes, &mut MostRecentResolver, &CancellationToken::new())
                .unwrap();

        let written = write_summary(&dir, &indexes, &plan).unwrap();
        assert_eq!(written.len(), 6);

        let summary = fs::read_to_string(dir.path(REPORT_DIR_SUMMARY)).unwrap();
        assert_eq!(summary, "api/a.html FAILED\napi/b.html PASSED\n");

        let index_html = fs::read_to_string(dir.path(REPORT_DIR_INDEX)).unwrap();
        assert!(index_html.contains("<li>run0.xml</li>"));
        assert!(index_html.contains("<a href=\"html/passed.html\">PASSED</a>"));
        assert!(index_html.contains("<h2>Conflicts</h2>"));

        let failed = fs::read_to_string(dir.path("html/failed.html")).unwrap();
        assert!(failed.contains("FAILED tests (1)"));
        // html pages escape the slash in urls
        assert!(failed.contains("<li>api&#x2F;a.html</li>"));
        let not_run = fs::read_to_string(dir.path("html/notRun.html")).unwrap();
        assert!(not_run.contains("NOT_RUN tests (0)"));
    }
}
