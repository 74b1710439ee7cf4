use super::types::RunReport;
use crate::runner::state::{TestResult, TestRun, TestStatus};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

fn seconds(ms: u64) -> String {
    (ms as f64 / 1000.0).to_string()
}

/// Generate JUnit XML: one `<testsuite>` per run, one `<testcase>` per result
pub fn generate_junit_xml(report: &RunReport) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &report.summary;
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "flowlab"));
    suites_start.push_attribute(("tests", summary.total_scenarios.to_string().as_str()));
    suites_start.push_attribute(("failures", summary.failed.to_string().as_str()));
    suites_start.push_attribute(("skipped", summary.skipped.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(summary.total_duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    for run in &report.runs {
        write_test_suite(&mut writer, run)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

fn write_test_suite<W: std::io::Write>(writer: &mut Writer<W>, run: &TestRun) -> Result<()> {
    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", run.suite_name.as_str()));
    suite_start.push_attribute(("id", run.id.as_str()));
    suite_start.push_attribute(("tests", run.total_scenarios.to_string().as_str()));
    suite_start.push_attribute(("failures", run.failed.to_string().as_str()));
    suite_start.push_attribute(("skipped", run.skipped.to_string().as_str()));
    suite_start.push_attribute(("time", seconds(run.duration_ms.unwrap_or(0)).as_str()));
    suite_start.push_attribute(("timestamp", run.started_at.to_rfc3339().as_str()));
    writer.write_event(Event::Start(suite_start))?;

    let mut props = BytesStart::new("properties");
    props.push_attribute(("count", "2"));
    writer.write_event(Event::Start(props))?;
    for (name, value) in [
        ("workflowId", run.workflow_id.as_str()),
        ("environment", run.environment.as_str()),
    ] {
        let mut prop = BytesStart::new("property");
        prop.push_attribute(("name", name));
        prop.push_attribute(("value", value));
        writer.write_event(Event::Empty(prop))?;
    }
    writer.write_event(Event::End(BytesEnd::new("properties")))?;

    for result in &run.results {
        write_test_case(writer, run, result)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    run: &TestRun,
    result: &TestResult,
) -> Result<()> {
    let classname = format!("{}.{}", run.workflow_id, run.suite_name.replace(' ', "_"));
    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", result.scenario_name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute(("time", seconds(result.duration_ms).as_str()));
    writer.write_event(Event::Start(case_start))?;

    match result.status {
        TestStatus::Failed => {
            let (message, kind) = match result.errors.first() {
                Some(err) => (err.message.clone(), format!("{:?}Error", err.kind)),
                None => {
                    let failed = result.failed_assertions();
                    (
                        format!("{} assertion(s) failed", failed),
                        "AssertionError".to_string(),
                    )
                }
            };
            let mut fail_start = BytesStart::new("failure");
            fail_start.push_attribute(("message", message.as_str()));
            fail_start.push_attribute(("type", kind.as_str()));
            writer.write_event(Event::Start(fail_start))?;

            let details: Vec<String> = result
                .errors
                .iter()
                .map(|e| e.message.clone())
                .chain(
                    result
                        .assertions
                        .iter()
                        .filter(|a| !a.passed)
                        .map(|a| a.message.clone()),
                )
                .collect();
            writer.write_event(Event::Text(BytesText::new(&details.join("\n"))))?;
            writer.write_event(Event::End(BytesEnd::new("failure")))?;
        }
        TestStatus::Skipped => {
            writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
        }
        _ => {}
    }

    if !result.logs.is_empty() {
        let logs: Vec<String> = result
            .logs
            .iter()
            .map(|l| format!("[{}] {:?} {}", l.timestamp.to_rfc3339(), l.level, l.message))
            .collect();
        writer.write_event(Event::Start(BytesStart::new("system-out")))?;
        writer.write_event(Event::Text(BytesText::new(&logs.join("\n"))))?;
        writer.write_event(Event::End(BytesEnd::new("system-out")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write report to file
pub fn write_report(report: &RunReport, output: &Path) -> Result<()> {
    let xml = generate_junit_xml(report)?;
    let path = if output.is_dir() {
        output.join("junit.xml")
    } else {
        output.to_path_buf()
    };
    std::fs::write(&path, xml)?;
    println!("    Generated JUnit report: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::{TestError, TestErrorKind, TestResult, TestRun};

    #[test]
    fn test_generate_junit_xml() {
        let mut run = TestRun::new("run-1".into(), "suite-1", "Lead intake", "wf-42", "staging", 3);

        let mut passed = TestResult::new("r1".into(), "s1", "hot lead", "wf-42");
        passed.finalize();
        let mut failed = TestResult::new("r2".into(), "s2", "engine down", "wf-42");
        failed.errors.push(TestError {
            kind: TestErrorKind::Timeout,
            message: "Execution timed out after 100ms".into(),
            node_id: None,
        });
        failed.finalize();
        let mut skipped = TestResult::new("r3".into(), "s3", "after <failure>", "wf-42");
        skipped.skip("a previous scenario failed");

        run.record(passed);
        run.record(failed);
        run.record(skipped);
        run.finish();

        let xml = generate_junit_xml(&RunReport::new(vec![run])).expect("Failed to generate XML");

        assert!(xml.contains(r#"<testsuites name="flowlab""#));
        assert!(xml.contains(r#"tests="3""#));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"<testcase name="hot lead""#));
        assert!(xml.contains(r#"message="Execution timed out after 100ms""#));
        assert!(xml.contains(r#"type="TimeoutError""#));
        assert!(xml.contains("<skipped/>"));
        assert!(xml.contains("after &lt;failure&gt;"));
        assert!(xml.contains(r#"<property name="environment" value="staging"/>"#));
    }
}
