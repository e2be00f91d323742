/*!
# Instrumentation - Source Transformer

Rewrites parsed programs so that running them reports reads, writes and
call-boundary links to the tracer runtime.

## Passes

Three passes run in a fixed order over every file:

1. [`LinkPass`]: marks each function definition with a link point and wraps
   arguments of calls to program-defined functions in carry nodes.
2. [`WritePass`]: wraps single-target assignment values (and loop variables)
   in write nodes.
3. [`ReadPass`]: wraps identifiers and subscripts in read position in read
   nodes.

Generated nodes are `Expr::Trace` values and are never re-entered, which is
what makes running the pipeline twice a no-op.

## Example Usage

```rust
use vistrace_core::instrument::{Instrumenter, TransformationContext};
use vistrace_core::parser::parse_program;

let program = parse_program("a = 1;\na = a + 1;\n")?;
let context = TransformationContext::for_programs([&program]).with_observed(["a"]);
let instrumented = Instrumenter::new().instrument(program, &context)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::{collections::BTreeSet, path::PathBuf, time::Instant};

use indexmap::IndexMap;
use thiserror::Error;

use crate::{ast::Program, parser::ParseError, symbolic::Encoder};

pub mod file_instrumenter;
pub mod fold;
pub mod link;
pub mod read;
pub mod rules;
pub mod write;

pub use file_instrumenter::FileInstrumenter;
pub use link::LinkPass;
pub use read::ReadPass;
pub use rules::{InstrumentationPass, PassOutcome, PassStats};
pub use write::WritePass;


#[derive(Error, Debug)]
pub enum TransformError {
    #[error(
        "line {line}: multi-target assignment to observed variable '{identifier}' cannot be traced: {statement}"
    )]
    UnsupportedAssignment {
        line: usize,
        identifier: String,
        statement: String,
    },

    #[error("{file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },

    #[error("failed to write instrumented source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// Common result type for transformations
pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Debug, Clone, Default)]
pub struct TransformationContext {
    pub source_file: Option<String>,
    /// Identifiers the caller asked to watch
    pub observed: BTreeSet<String>,
    /// Functions defined anywhere in the instrumented file set
    pub functions: BTreeSet<String>,
    pub encoder: Encoder,
}

impl TransformationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a set of programs that will run together: their functions
    /// are linked, and names they bind shadow built-ins.
    pub fn for_programs<'a, I>(programs: I) -> Self
    where
        I: IntoIterator<Item = &'a Program>,
    {
        let mut functions = BTreeSet::new();
        let mut bound = BTreeSet::new();
        for program in programs {
            functions.extend(program.function_names());
            bound.extend(program.bound_names());
        }
        Self {
            functions,
            encoder: Encoder::new().shadowing(&bound),
            ..Self::default()
        }
    }

    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    pub fn with_observed<I, T>(mut self, observed: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.observed.extend(observed.into_iter().map(Into::into));
        self
    }

    pub fn is_observed(&self, name: &str) -> bool {
        self.observed.contains(name)
    }

    pub fn is_program_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }
}

/// Runs instrumentation passes in order and keeps per-pass statistics
pub struct Instrumenter {
    passes: Vec<Box<dyn InstrumentationPass>>,
    stats: IndexMap<String, PassStats>,
}

impl Instrumenter {
    /// The standard pipeline: link, write, read
    pub fn new() -> Self {
        let mut instrumenter = Self::empty();
        instrumenter.add_pass(Box::new(LinkPass));
        instrumenter.add_pass(Box::new(WritePass));
        instrumenter.add_pass(Box::new(ReadPass));
        instrumenter
    }

    /// An instrumenter with no passes
    pub fn empty() -> Self {
        Self {
            passes: Vec::new(),
            stats: IndexMap::new(),
        }
    }

    pub fn add_pass(&mut self, pass: Box<dyn InstrumentationPass>) {
        self.stats
            .insert(pass.name().to_string(), PassStats::new(pass.name()));
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn instrument(
        &mut self,
        mut program: Program,
        context: &TransformationContext,
    ) -> TransformResult<Program> {
        for pass in &self.passes {
            let start_time = Instant::now();
            let stats = self
                .stats
                .entry(pass.name().to_string())
                .or_insert_with(|| PassStats::new(pass.name()));
            stats.runs += 1;

            match pass.instrument(program, context) {
                Ok(outcome) => {
                    stats.rewrites += outcome.rewritten as u64;
                    stats.total_time_ms += start_time.elapsed().as_millis() as u64;
                    tracing::debug!(
                        pass = pass.name(),
                        file = context.source_file.as_deref().unwrap_or("<memory>"),
                        rewritten = outcome.rewritten,
                        "instrumentation pass finished"
                    );
                    program = outcome.program;
                }
                Err(e) => {
                    stats.errors += 1;
                    return Err(e);
                }
            }
        }
        Ok(program)
    }

    pub fn stats(&self) -> &IndexMap<String, PassStats> {
        &self.stats
    }
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new()
    }
}
