// Read pass: identifiers and index chains in read position are wrapped in a
// read node. The pass never enters generated nodes, so reads on the right of
// an assignment are represented by that write's source.

use super::{
    fold::{walk_expr, Fold},
    rules::{InstrumentationPass, PassOutcome},
    TransformResult, TransformationContext,
};
use crate::ast::{Expr, LineSpan, Program, TraceNode};

#[derive(Debug, Default, Clone, Copy)]
pub struct ReadPass;

impl InstrumentationPass for ReadPass {
    fn name(&self) -> &'static str {
        "read"
    }

    fn description(&self) -> &'static str {
        "Wrap identifiers and subscripts in read position in read tracers"
    }

    fn instrument(
        &self,
        program: Program,
        context: &TransformationContext,
    ) -> TransformResult<PassOutcome> {
        let mut folder = ReadFolder {
            context,
            rewritten: 0,
        };
        let program = folder.fold_program(program)?;
        Ok(PassOutcome {
            program,
            rewritten: folder.rewritten,
        })
    }
}

struct ReadFolder<'c> {
    context: &'c TransformationContext,
    rewritten: usize,
}

impl ReadFolder<'_> {
    fn wrap(&mut self, expr: Expr, span: LineSpan) -> Expr {
        self.rewritten += 1;
        Expr::Trace(TraceNode::Read {
            symbol: self.context.encoder.load(&expr),
            value: Box::new(expr),
            span,
        })
    }
}

impl Fold for ReadFolder<'_> {
    fn fold_expr(&mut self, expr: Expr, span: LineSpan) -> TransformResult<Expr> {
        match expr {
            Expr::Identifier(name) => {
                if self.context.encoder.is_passthrough(&name) {
                    Ok(Expr::Identifier(name))
                } else {
                    Ok(self.wrap(Expr::Identifier(name), span))
                }
            }
            // A whole chain is one read; indexing a call result is not
            Expr::Index { .. } if self.context.encoder.load(&expr).is_location() => {
                Ok(self.wrap(expr, span))
            }
            expr => walk_expr(self, expr, span),
        }
    }
}
