use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bcp::{BulkLoader, RowStreams};
use crate::config::ResolvedConfig;
use crate::domain::{LoadMode, Pipeline};
use crate::emit::{Emitter, UpdateStatement};
use crate::error::LoadError;
use crate::journal::{Journal, JournaledStore};
use crate::keys::{Counter, KeyAllocator};
use crate::record::{ParsedLine, parse_line, read_input};
use crate::resolver::ReferenceResolver;
use crate::rows::Table;
use crate::state::RunState;
use crate::store::RegistryStore;
use crate::validate::{Field, ValidationFailure, Validator};

const DIAGNOSTIC_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub pipeline: Pipeline,
    pub mode: LoadMode,
    pub input: Utf8PathBuf,
    /// Creation and modification date stamped on every row.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    SanityCheck,
    Validating,
    Commit,
    Abort,
    BulkLoading,
    ResyncCounters,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: Pipeline,
    pub mode: LoadMode,
    pub phase: RunPhase,
    pub input: String,
    pub lines_read: usize,
    pub records_accepted: usize,
    pub records_rejected: usize,
    pub fatal: usize,
    pub warnings: usize,
    /// Rows written per table.
    pub rows: BTreeMap<Table, usize>,
    /// Rows the bulk loader accepted per table.
    pub loaded: BTreeMap<Table, usize>,
    pub update_statements: usize,
    pub committed: bool,
    pub diagnostics_file: Option<String>,
    pub error_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: RunPhase,
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Counters a pipeline draws keys from.
pub fn counters_for(pipeline: Pipeline) -> &'static [Counter] {
    match pipeline {
        Pipeline::Create => &[
            Counter::Strain,
            Counter::StrainMarker,
            Counter::Accession,
            Counter::MgiAccession,
            Counter::Annotation,
            Counter::Note,
        ],
        Pipeline::Update | Pipeline::Curator => &[Counter::StrainMarker, Counter::Synonym],
    }
}

/// Tables a pipeline writes bcp files for.
pub fn tables_for(pipeline: Pipeline) -> &'static [Table] {
    match pipeline {
        Pipeline::Create => &[
            Table::Strain,
            Table::StrainMarker,
            Table::Accession,
            Table::Annotation,
            Table::Note,
        ],
        Pipeline::Update | Pipeline::Curator => &[Table::StrainMarker, Table::Synonym],
    }
}

pub struct App<S> {
    store: S,
    config: ResolvedConfig,
}

impl<S: RegistryStore + BulkLoader> App<S> {
    pub fn new(store: S, config: ResolvedConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Runs one input file, writing the diagnostics and error streams to
    /// their configured locations.
    pub fn run(
        &mut self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, LoadError> {
        let input = read_input(&request.input)?;
        let (diag_path, error_path) = self.config.log_paths(&request.input, request.mode);
        let mut diagnostics = Journal::open(&diag_path, !request.mode.is_sanity_check())?;
        let mut errors = Journal::open(&error_path, false)?;

        let mut report = self.process(request, &input, &mut diagnostics, &mut errors, sink)?;
        report.diagnostics_file = Some(diag_path.to_string());
        report.error_file = Some(error_path.to_string());
        Ok(report)
    }

    /// Validates, emits and (in load mode, when nothing fatal was found)
    /// commits `input`.
    pub fn process(
        &mut self,
        request: &RunRequest,
        input: &str,
        diagnostics: &mut Journal,
        errors: &mut Journal,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, LoadError> {
        let pipeline = request.pipeline;
        let mode = request.mode;
        let constants = &self.config.constants;

        diagnostics.line(format!(
            "Start Date/Time: {}",
            Local::now().format(DIAGNOSTIC_TIME_FORMAT)
        ))?;
        diagnostics.line(format!("Server: {}", self.config.server))?;
        diagnostics.line(format!("Database: {}", self.config.database))?;
        diagnostics.line(format!("Pipeline: {pipeline}"))?;
        diagnostics.line(format!("Mode: {mode}"))?;
        diagnostics.line(format!("Input File: {}", request.input))?;
        diagnostics.line(format!("Output Directory: {}", self.config.output_dir))?;
        if let Some(command) = &self.config.bcp_command {
            diagnostics.line(format!("Bulk Loader: {command}"))?;
        }

        info!(%pipeline, %mode, input = %request.input, "run started");
        let start_phase = if mode.is_sanity_check() {
            RunPhase::SanityCheck
        } else {
            RunPhase::Validating
        };
        emit_phase(sink, start_phase, format!("{pipeline} {mode}: {}", request.input));

        let mut store = JournaledStore::new(&mut self.store, diagnostics);
        let resolver = ReferenceResolver::load(&mut store, constants)?;
        // Preview never reserves keys, so it leaves no trace on the counters.
        let keys = if mode.is_sanity_check() {
            None
        } else {
            Some(KeyAllocator::reserve(&mut store, counters_for(pipeline))?)
        };
        let mut streams = match keys {
            Some(_) => Some(RowStreams::create(
                &self.config.output_dir,
                tables_for(pipeline),
            )?),
            None => None,
        };
        let mut state = RunState::new(resolver, keys, request.date);
        let validator = Validator::new(pipeline, constants);
        let emitter = Emitter::new(constants, &state.date);

        let mut lines_read = 0;
        let mut accepted = 0;
        let mut rejected = 0;
        let mut statements: Vec<UpdateStatement> = Vec::new();

        for (idx, text) in input.lines().enumerate() {
            let line = idx + 1;
            lines_read = line;
            match parse_line(pipeline, line, text) {
                ParsedLine::Header | ParsedLine::Blank => {}
                ParsedLine::Malformed { line, text } => {
                    let failure =
                        ValidationFailure::fatal(line, Field::Line, "Invalid Line", &text);
                    record_failures(errors, &mut state, &[failure])?;
                    rejected += 1;
                }
                ParsedLine::Create(record) => {
                    match validator.create(&record, &mut store, &mut state)? {
                        Err(failures) => {
                            record_failures(errors, &mut state, &failures)?;
                            rejected += 1;
                        }
                        Ok(checked) => {
                            record_failures(errors, &mut state, &checked.failures)?;
                            if let (Some(keys), Some(streams)) =
                                (state.keys.as_mut(), streams.as_mut())
                            {
                                let set = emitter.emit_create(&checked.record, keys)?;
                                streams.append(&set)?;
                                debug!(line, strain_key = set.strain_key, rows = set.len(), "emitted");
                            }
                            accepted += 1;
                        }
                    }
                }
                ParsedLine::Update(record) => {
                    match validator.update(&record, &mut store, &mut state)? {
                        Err(failures) => {
                            record_failures(errors, &mut state, &failures)?;
                            rejected += 1;
                        }
                        Ok(checked) => {
                            record_failures(errors, &mut state, &checked.failures)?;
                            if let (Some(keys), Some(streams)) =
                                (state.keys.as_mut(), streams.as_mut())
                            {
                                let (set, updates) = emitter.emit_update(&checked.record, keys)?;
                                streams.append(&set)?;
                                statements.extend(updates);
                                debug!(line, strain_key = set.strain_key, rows = set.len(), "emitted");
                            }
                            accepted += 1;
                        }
                    }
                }
            }
        }

        let rows = streams
            .as_ref()
            .map(RowStreams::row_counts)
            .unwrap_or_default();
        let mut loaded = BTreeMap::new();
        let mut committed = false;

        let phase = if mode.is_sanity_check() {
            RunPhase::SanityCheck
        } else if state.has_fatal() {
            emit_phase(
                sink,
                RunPhase::Abort,
                format!("{} fatal errors, nothing loaded", state.fatal),
            );
            errors.line("Cannot process this file.  Sanity check failed")?;
            warn!(fatal = state.fatal, "sanity check failed, load aborted");
            RunPhase::Failed
        } else {
            emit_phase(sink, RunPhase::Commit, "no fatal errors".to_string());

            emit_phase(sink, RunPhase::BulkLoading, "loading bcp files".to_string());
            if let Some(streams) = streams.as_mut() {
                loaded = streams.load_into(&mut store, |table, path| {
                    info!(%table, %path, "bulk loading");
                })?;
            }
            if !statements.is_empty() {
                store.execute_updates(&statements)?;
            }

            emit_phase(sink, RunPhase::ResyncCounters, "advancing counters".to_string());
            if let Some(keys) = &state.keys {
                for counter in keys.counters() {
                    if let Some(last_used) = keys.last_used(counter) {
                        store.resync(counter, last_used)?;
                    }
                }
            }
            store.commit()?;
            committed = true;
            RunPhase::Done
        };

        errors.line("")?;
        if state.has_fatal() {
            errors.line("Sanity check : failed")?;
            errors.line("Errors must be fixed before file is published.")?;
        } else {
            errors.line("Sanity check : successful")?;
        }
        errors.flush()?;

        let diagnostics = store.journal();
        diagnostics.line(format!(
            "End Date/Time: {}",
            Local::now().format(DIAGNOSTIC_TIME_FORMAT)
        ))?;
        diagnostics.flush()?;

        emit_phase(
            sink,
            phase,
            format!("fatal={} warnings={}", state.fatal, state.warnings),
        );
        info!(
            ?phase,
            lines_read,
            accepted,
            rejected,
            fatal = state.fatal,
            warnings = state.warnings,
            "run finished"
        );

        Ok(RunReport {
            pipeline,
            mode,
            phase,
            input: request.input.to_string(),
            lines_read,
            records_accepted: accepted,
            records_rejected: rejected,
            fatal: state.fatal,
            warnings: state.warnings,
            rows,
            loaded,
            update_statements: statements.len(),
            committed,
            diagnostics_file: None,
            error_file: None,
        })
    }
}

fn emit_phase(sink: &dyn ProgressSink, phase: RunPhase, message: String) {
    sink.event(ProgressEvent { phase, message });
}

fn record_failures(
    errors: &mut Journal,
    state: &mut RunState,
    failures: &[ValidationFailure],
) -> Result<(), LoadError> {
    for failure in failures {
        if failure.is_fatal() {
            state.fatal += 1;
        } else {
            state.warnings += 1;
            warn!(line = failure.line, "{}", failure.message);
        }
        errors.line(failure.to_string())?;
    }
    Ok(())
}
