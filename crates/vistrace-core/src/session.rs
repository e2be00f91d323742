/*!
# Trace Sessions

A [`TraceSession`] runs one traced execution end to end:

1. stage the files into an isolated directory
2. parse and instrument every file, writing the instrumented copies
3. run the non-entry files as libraries, then the entry file, with a
   [`TraceContext`] appending to a JSON-lines log in the staged directory
4. read the log back, reconstruct it and assemble the artifact
5. tear the staged directory down

Parse, transform and staging failures are fatal and produce no artifact. A
fault raised by the target program is not: the partial log is reconstructed
and the fault is reported in [`Diagnostics`].
*/

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    artifact::{Assembler, TraceArtifact, TypeTable, VariableDescriptor},
    ast::Program,
    evaluator::{Evaluator, EvaluatorError},
    instrument::{FileInstrumenter, PassStats, TransformError, TransformationContext},
    parser::parse_program,
    reconstruct::{ReconstructStats, Reconstructor},
    stager::{Stager, TempDirStager},
    trace::{read_log, JsonLinesSink, TraceContext, TraceStats},
    TraceConfig, VistraceError,
};

/// What to trace: loaded from a JSON settings file or built by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSettings {
    pub root_dir: PathBuf,
    /// Files to stage and instrument, relative to `root_dir`
    #[serde(default)]
    pub files: Vec<PathBuf>,
    pub entry: PathBuf,
    #[serde(default)]
    pub watch: Vec<VariableDescriptor>,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl RunSettings {
    pub fn new(root_dir: impl Into<PathBuf>, entry: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            files: Vec::new(),
            entry: entry.into(),
            watch: Vec::new(),
            output: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn watching(mut self, descriptor: VariableDescriptor) -> Self {
        self.watch.push(descriptor);
        self
    }

    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.entry.as_os_str().is_empty() {
            return Err(VistraceError::Config("no entry file given".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for descriptor in &self.watch {
            if !seen.insert(descriptor.identifier.as_str()) {
                return Err(VistraceError::Config(format!(
                    "variable '{}' is watched twice",
                    descriptor.identifier
                )));
            }
        }
        Ok(())
    }

    /// Every staged file: the listed files plus the entry, without duplicates
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files = self.files.clone();
        if !files.contains(&self.entry) {
            files.push(self.entry.clone());
        }
        files
    }

    pub fn observed(&self) -> Vec<String> {
        self.watch.iter().map(|d| d.identifier.clone()).collect()
    }
}

/// A runtime fault raised by the target program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramFault {
    pub file: String,
    pub line: usize,
    pub message: String,
    /// The fault is a step or call-depth limit
    pub limit: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub trace: TraceStats,
    pub reconstruct: ReconstructStats,
    pub passes: Vec<PassStats>,
    pub program_fault: Option<ProgramFault>,
    pub log_malformed: usize,
    pub log_truncated: bool,
    /// Lines printed by the target program
    pub output: Vec<String>,
    pub steps: u64,
    /// Set when the staged directory was kept
    pub staged_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TraceOutcome {
    pub artifact: TraceArtifact,
    pub diagnostics: Diagnostics,
}

struct SourceFile {
    relative: PathBuf,
    label: String,
    original: String,
    program: Program,
}

pub struct TraceSession<St: Stager = TempDirStager> {
    config: TraceConfig,
    stager: St,
    types: TypeTable,
}

impl TraceSession<TempDirStager> {
    pub fn new(config: TraceConfig) -> Self {
        Self::with_stager(config, TempDirStager::new())
    }
}

impl Default for TraceSession<TempDirStager> {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

impl<St: Stager> TraceSession<St> {
    pub fn with_stager(config: TraceConfig, stager: St) -> Self {
        Self {
            config,
            stager,
            types: TypeTable::default(),
        }
    }

    pub fn with_type_table(mut self, types: TypeTable) -> Self {
        self.types = types;
        self
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub fn run(&self, settings: &RunSettings) -> crate::Result<TraceOutcome> {
        settings.validate()?;
        let files = settings.all_files();
        let staged = self.stager.stage(&settings.root_dir, &files)?;
        let mut diagnostics = Diagnostics::default();

        let sources = files
            .iter()
            .map(|relative| -> crate::Result<SourceFile> {
                let label = relative.display().to_string();
                let original = fs::read_to_string(staged.staged_path(relative))?;
                let program = parse_program(&original).map_err(|source| TransformError::Parse {
                    file: label.clone(),
                    source,
                })?;
                Ok(SourceFile {
                    relative: relative.clone(),
                    label,
                    original,
                    program,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let observed = settings.observed();
        let context = TransformationContext::for_programs(sources.iter().map(|s| &s.program))
            .with_observed(observed.iter().cloned());
        let mut instrumenter = FileInstrumenter::new(context);
        let mut instrumented = Vec::with_capacity(sources.len());
        for source in &sources {
            let program = instrumenter.instrument_program(source.program.clone(), &source.label)?;
            instrumenter.write_instrumented(&staged.staged_path(&source.relative), &program)?;
            instrumented.push(program);
        }
        diagnostics.passes = instrumenter.instrumenter().stats().values().cloned().collect();
        tracing::info!(files = sources.len(), "instrumentation complete");

        let log_path = staged.path().join(&self.config.log_file_name);
        let mut trace = TraceContext::new(observed.iter().cloned(), JsonLinesSink::create(&log_path)?);
        {
            let mut evaluator = Evaluator::new(&mut trace).with_limits(self.config.limits());
            // Libraries first, in the order given, then the entry point
            let order = (0..sources.len())
                .filter(|&i| sources[i].relative != settings.entry)
                .chain((0..sources.len()).filter(|&i| sources[i].relative == settings.entry));
            for i in order {
                if let Err(e) = evaluator.run(&instrumented[i]) {
                    let fault = ProgramFault {
                        file: sources[i].label.clone(),
                        line: evaluator.current_line(),
                        message: format!("{e:#}"),
                        limit: e
                            .downcast_ref::<EvaluatorError>()
                            .is_some_and(EvaluatorError::is_limit),
                    };
                    tracing::warn!(
                        file = %fault.file,
                        line = fault.line,
                        error = %fault.message,
                        "target program raised a fault; reconstructing partial trace"
                    );
                    diagnostics.program_fault = Some(fault);
                    break;
                }
            }
            diagnostics.output = evaluator.take_output();
            diagnostics.steps = evaluator.steps();
        }
        let (sink, trace_stats) = trace.finish();
        drop(sink);
        diagnostics.trace = trace_stats;

        let log = read_log(&log_path)?;
        diagnostics.log_malformed = log.malformed;
        diagnostics.log_truncated = log.truncated;

        let reconstruction = Reconstructor::new(observed).reconstruct(&log.records);
        diagnostics.reconstruct = reconstruction.stats;

        let embedded: Vec<(&str, &str)> = if self.config.embed_sources {
            sources
                .iter()
                .map(|s| (s.label.as_str(), s.original.as_str()))
                .collect()
        } else {
            Vec::new()
        };
        let artifact = Assembler::new(self.types.clone(), self.config.format_version).assemble(
            &settings.watch,
            embedded,
            reconstruction.entries,
        );

        if let Some(output) = &settings.output {
            artifact.write_to(output)?;
            tracing::info!(path = %output.display(), "artifact written");
        }

        if self.config.keep_environment {
            let path = staged.keep();
            tracing::info!(path = %path.display(), "staged environment kept");
            diagnostics.staged_dir = Some(path);
        } else {
            staged.teardown()?;
        }

        tracing::info!(
            entries = artifact.body.len(),
            records = diagnostics.trace.records,
            "trace complete"
        );
        Ok(TraceOutcome {
            artifact,
            diagnostics,
        })
    }
}
