// Write pass: single-target assignment values are wrapped in a write node
// carrying the encoded source and destination.

use super::{
    fold::{walk_stmt, Fold},
    rules::{InstrumentationPass, PassOutcome},
    TransformError, TransformResult, TransformationContext,
};
use crate::ast::{Expr, LineSpan, Program, Stmt, ToSource, TraceNode};

#[derive(Debug, Default, Clone, Copy)]
pub struct WritePass;

impl InstrumentationPass for WritePass {
    fn name(&self) -> &'static str {
        "write"
    }

    fn description(&self) -> &'static str {
        "Wrap assignment values and loop variables in write tracers"
    }

    fn instrument(
        &self,
        program: Program,
        context: &TransformationContext,
    ) -> TransformResult<PassOutcome> {
        let mut folder = WriteFolder {
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

struct WriteFolder<'c> {
    context: &'c TransformationContext,
    rewritten: usize,
}

impl WriteFolder<'_> {
    fn write_node(&self, target: &Expr, value: Expr, span: LineSpan) -> Expr {
        Expr::Trace(TraceNode::Write {
            source: self.context.encoder.load(&value),
            target: self.context.encoder.store(target),
            value: Box::new(value),
            span,
        })
    }

    /// `var = __trace_write(load(var), store(var), var)` as the first statement
    fn is_loop_variable_write(stmt: &Stmt, variable: &str) -> bool {
        matches!(
            stmt,
            Stmt::Assign {
                target: Expr::Identifier(name),
                value: Expr::Trace(TraceNode::Write { value, .. }),
                ..
            } if name == variable && matches!(value.as_ref(), Expr::Identifier(v) if v == variable)
        )
    }
}

impl Fold for WriteFolder<'_> {
    fn fold_stmt(&mut self, stmt: Stmt) -> TransformResult<Stmt> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                span,
            } => {
                if value.is_trace() {
                    return Ok(Stmt::Assign {
                        target,
                        value,
                        span,
                    });
                }
                self.rewritten += 1;
                let value = self.write_node(&target, value, span);
                Ok(Stmt::Assign {
                    target,
                    value,
                    span,
                })
            }
            stmt @ (Stmt::MultiAssign { .. } | Stmt::Destructure { .. }) => {
                let span = stmt.span();
                let observed = assignment_targets(&stmt)
                    .iter()
                    .filter_map(Expr::root_identifier)
                    .find(|root| self.context.is_observed(root))
                    .map(str::to_string);
                match observed {
                    Some(identifier) => Err(TransformError::UnsupportedAssignment {
                        line: span.begin,
                        identifier,
                        statement: stmt.to_source().trim().to_string(),
                    }),
                    None => {
                        tracing::debug!(line = span.begin, "leaving multi-target assignment untraced");
                        Ok(stmt)
                    }
                }
            }
            Stmt::For {
                variable,
                iterable,
                body,
                span,
            } => {
                let mut body = self.fold_block(body)?;
                let tracked = body
                    .first()
                    .is_some_and(|first| Self::is_loop_variable_write(first, &variable));
                if !tracked {
                    self.rewritten += 1;
                    let target = Expr::Identifier(variable.clone());
                    let value = self.write_node(&target, target.clone(), span);
                    body.insert(
                        0,
                        Stmt::Assign {
                            target,
                            value,
                            span,
                        },
                    );
                }
                Ok(Stmt::For {
                    variable,
                    iterable,
                    body,
                    span,
                })
            }
            other => walk_stmt(self, other),
        }
    }
}

fn assignment_targets(stmt: &Stmt) -> &[Expr] {
    match stmt {
        Stmt::MultiAssign { targets, .. } | Stmt::Destructure { targets, .. } => targets,
        Stmt::Assign { target, .. } => std::slice::from_ref(target),
        _ => &[],
    }
}
