//! # Vistrace Core
//!
//! Program instrumentation for visualization tooling:
//! - Script language AST, parser and source generator
//! - Expression encoder and the three-pass source transformer
//! - Tracer runtime that records reads, writes and call-boundary links
//! - Trace reconstruction and output assembly
//!
//! A run stages the target files, instruments them, executes the entry point
//! with a [`TraceContext`], then reconstructs the raw log into a
//! [`TraceArtifact`]. [`TraceSession`] drives the whole sequence.

#![warn(clippy::all)]

pub mod artifact;
pub mod ast;
pub mod evaluator;
pub mod instrument;
pub mod parser;
pub mod reconstruct;
pub mod session;
pub mod stager;
pub mod symbolic;
pub mod trace;

// Re-export commonly used types
pub use artifact::{Assembler, TraceArtifact, TypeTable, VariableDescriptor, FORMAT_VERSION};
pub use ast::{Expr, Program, Stmt, ToSource};
pub use evaluator::{Evaluator, EvaluatorError, Limits, Value};
pub use instrument::{FileInstrumenter, Instrumenter, TransformError, TransformationContext};
pub use parser::{parse_program, ParseError, Parser, ScriptParser};
pub use reconstruct::{EntryKind, ReconstructError, Reconstructor, TraceEntry};
pub use session::{Diagnostics, RunSettings, TraceOutcome, TraceSession};
pub use stager::{EnvironmentError, Stager, TempDirStager};
pub use symbolic::{Encoder, SymbolicExpr};
pub use trace::{OperationRecord, TraceContext, TraceError, TraceHooks};

/// Vistrace version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for Vistrace core components
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "vistrace_core=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    // A subscriber may already be installed by an embedding application
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run configuration shared by every session
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Version number written to the artifact header
    pub format_version: u32,
    /// Statement budget for the target program
    pub max_steps: u64,
    /// Maximum nesting of program-defined function calls
    pub max_call_depth: usize,
    /// Embed the original source lines in the artifact header
    pub embed_sources: bool,
    /// Raw log file name inside the staged directory
    pub log_file_name: String,
    /// Leave the staged directory on disk after the run
    pub keep_environment: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            format_version: FORMAT_VERSION,
            max_steps: limits.max_steps,
            max_call_depth: limits.max_call_depth,
            embed_sources: true,
            log_file_name: "trace.jsonl".to_string(),
            keep_environment: false,
        }
    }
}

impl TraceConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_call_depth: self.max_call_depth,
        }
    }
}

/// Error types for Vistrace operations
#[derive(thiserror::Error, Debug)]
pub enum VistraceError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for Vistrace operations
pub type Result<T> = std::result::Result<T, VistraceError>;
