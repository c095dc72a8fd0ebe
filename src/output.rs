use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunPhase, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Phase lines on stderr and a short summary on stdout.
pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", Self::summary(report))?;
        Ok(())
    }

    pub fn summary(report: &RunReport) -> String {
        let outcome = match report.phase {
            RunPhase::Done => "loaded",
            RunPhase::Failed => "not loaded",
            _ if report.fatal == 0 => "sanity check successful",
            _ => "sanity check failed",
        };
        let mut text = format!(
            "{} {} {}: {outcome}\n  lines read: {}\n  records accepted: {}\n  records rejected: {}\n  fatal: {}\n  warnings: {}",
            report.pipeline,
            report.mode,
            report.input,
            report.lines_read,
            report.records_accepted,
            report.records_rejected,
            report.fatal,
            report.warnings,
        );
        for (table, rows) in &report.rows {
            text.push_str(&format!("\n  {table}: {rows} rows"));
        }
        if report.update_statements > 0 {
            text.push_str(&format!("\n  update statements: {}", report.update_statements));
        }
        if let Some(path) = &report.error_file {
            text.push_str(&format!("\n  error file: {path}"));
        }
        text
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        eprintln!("[{:?}] {}", event.phase, event.message);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{LoadMode, Pipeline};
    use crate::rows::Table;

    fn report(phase: RunPhase, fatal: usize) -> RunReport {
        RunReport {
            pipeline: Pipeline::Create,
            mode: LoadMode::Load,
            phase,
            input: "strains.txt".to_string(),
            lines_read: 3,
            records_accepted: 2,
            records_rejected: fatal,
            fatal,
            warnings: 0,
            rows: BTreeMap::from([(Table::Strain, 2)]),
            loaded: BTreeMap::new(),
            update_statements: 0,
            committed: phase == RunPhase::Done,
            diagnostics_file: None,
            error_file: Some("strains.txt.error".to_string()),
        }
    }

    #[test]
    fn summary_names_the_outcome() {
        let text = TextOutput::summary(&report(RunPhase::Done, 0));
        assert!(text.starts_with("create load strains.txt: loaded"));
        assert!(text.contains("PRB_Strain: 2 rows"));
        assert!(text.contains("error file: strains.txt.error"));

        let text = TextOutput::summary(&report(RunPhase::Failed, 1));
        assert!(text.contains(": not loaded"));
    }

    #[test]
    fn report_serializes_tables_by_name() {
        let json = serde_json::to_value(report(RunPhase::Done, 0)).unwrap();
        assert_eq!(json["phase"], "done");
        assert_eq!(json["rows"]["PRB_Strain"], 2);
        assert_eq!(json["committed"], true);
    }
}
