// Boundary pass: functions get an interception point, and arguments of calls
// to program-defined functions carry their encoded shape.

use super::{
    fold::{walk_expr, walk_function, Fold},
    rules::{InstrumentationPass, PassOutcome},
    TransformResult, TransformationContext,
};
use crate::ast::{Expr, FunctionDef, LineSpan, LinkPoint, Program, TraceNode};

#[derive(Debug, Default, Clone, Copy)]
pub struct LinkPass;

impl InstrumentationPass for LinkPass {
    fn name(&self) -> &'static str {
        "link"
    }

    fn description(&self) -> &'static str {
        "Attach link points to function definitions and carry argument shapes across calls"
    }

    fn instrument(
        &self,
        program: Program,
        context: &TransformationContext,
    ) -> TransformResult<PassOutcome> {
        let mut folder = LinkFolder {
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

struct LinkFolder<'c> {
    context: &'c TransformationContext,
    rewritten: usize,
}

impl Fold for LinkFolder<'_> {
    fn fold_function(&mut self, mut def: FunctionDef) -> TransformResult<FunctionDef> {
        if def.link.is_none() {
            def.link = Some(LinkPoint { span: def.span });
            self.rewritten += 1;
        }
        walk_function(self, def)
    }

    fn fold_expr(&mut self, expr: Expr, span: LineSpan) -> TransformResult<Expr> {
        match expr {
            Expr::Call { function, args } if self.context.is_program_function(&function) => {
                let mut carried = Vec::with_capacity(args.len());
                for arg in args {
                    let arg = self.fold_expr(arg, span)?;
                    if matches!(arg, Expr::Trace(TraceNode::Carry { .. })) {
                        carried.push(arg);
                        continue;
                    }
                    self.rewritten += 1;
                    carried.push(Expr::Trace(TraceNode::Carry {
                        symbol: self.context.encoder.load(&arg),
                        value: Box::new(arg),
                    }));
                }
                Ok(Expr::Call {
                    function,
                    args: carried,
                })
            }
            expr => walk_expr(self, expr, span),
        }
    }
}
