/*!
# Instrumentation Passes

Core trait for the passes that inject tracer nodes, plus per-pass statistics.
*/

use serde::Serialize;

use super::{TransformResult, TransformationContext};
use crate::ast::Program;

/// A rewrite over a whole program.
///
/// Passes build new trees rather than mutating in place, and must leave
/// `Expr::Trace` nodes and already linked functions as they are so that
/// running a pass over its own output changes nothing.
pub trait InstrumentationPass {
    /// Human-readable name for this pass
    fn name(&self) -> &'static str;

    /// Detailed description of what this pass does
    fn description(&self) -> &'static str;

    fn instrument(
        &self,
        program: Program,
        context: &TransformationContext,
    ) -> TransformResult<PassOutcome>;
}

/// Result of running one pass
#[derive(Debug)]
pub struct PassOutcome {
    pub program: Program,
    /// Number of nodes the pass wrapped or marked
    pub rewritten: usize,
}

/// Pass execution statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassStats {
    pub pass_name: String,
    pub runs: u64,
    pub rewrites: u64,
    pub errors: u64,
    pub total_time_ms: u64,
}

impl PassStats {
    pub fn new(pass_name: &str) -> Self {
        Self {
            pass_name: pass_name.to_string(),
            ..Self::default()
        }
    }

    pub fn average_rewrites(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            (self.rewrites as f64) / (self.runs as f64)
        }
    }
}
