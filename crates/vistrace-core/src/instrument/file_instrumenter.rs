/*!
# FileInstrumenter

Runs the instrumentation pipeline over parsed script files and writes the
instrumented source over their staged copies.
*/

use std::path::Path;

use super::{Instrumenter, TransformError, TransformResult, TransformationContext};
use crate::ast::{Program, ToSource};

pub struct FileInstrumenter {
    instrumenter: Instrumenter,
    context: TransformationContext,
}

impl FileInstrumenter {
    pub fn new(context: TransformationContext) -> Self {
        Self {
            instrumenter: Instrumenter::new(),
            context,
        }
    }

    /// Instrument an already parsed program
    pub fn instrument_program(&mut self, program: Program, file: &str) -> TransformResult<Program> {
        let context = self.context.clone().with_source_file(file);
        let program = self.instrumenter.instrument(program, &context)?;
        tracing::info!(file, "instrumented");
        Ok(program)
    }

    /// Replace the file at `path` with its instrumented rendering
    pub fn write_instrumented(&self, path: &Path, program: &Program) -> TransformResult<()> {
        std::fs::write(path, program.to_source()).map_err(|source| TransformError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn instrumenter(&self) -> &Instrumenter {
        &self.instrumenter
    }
}
