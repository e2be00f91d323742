// Tree folding: every pass consumes a node and returns a rebuilt one.
// Default methods rebuild the node from folded children and never enter
// generated `Expr::Trace` nodes.

use super::TransformResult;
use crate::ast::{Expr, FunctionDef, LineSpan, Program, Stmt};

pub trait Fold {
    fn fold_program(&mut self, program: Program) -> TransformResult<Program> {
        Ok(Program::new(self.fold_block(program.body)?))
    }

    fn fold_block(&mut self, stmts: Vec<Stmt>) -> TransformResult<Vec<Stmt>> {
        stmts.into_iter().map(|stmt| self.fold_stmt(stmt)).collect()
    }

    fn fold_stmt(&mut self, stmt: Stmt) -> TransformResult<Stmt> {
        walk_stmt(self, stmt)
    }

    fn fold_function(&mut self, def: FunctionDef) -> TransformResult<FunctionDef> {
        walk_function(self, def)
    }

    /// `span` is the enclosing statement's line span
    fn fold_expr(&mut self, expr: Expr, span: LineSpan) -> TransformResult<Expr> {
        walk_expr(self, expr, span)
    }
}

/// Rebuild a statement from folded children. Assignment targets are left
/// alone; they are never in read position.
pub fn walk_stmt<F: Fold + ?Sized>(folder: &mut F, stmt: Stmt) -> TransformResult<Stmt> {
    let stmt = match stmt {
        Stmt::Assign {
            target,
            value,
            span,
        } => Stmt::Assign {
            target,
            value: folder.fold_expr(value, span)?,
            span,
        },
        Stmt::MultiAssign {
            targets,
            value,
            span,
        } => Stmt::MultiAssign {
            targets,
            value: folder.fold_expr(value, span)?,
            span,
        },
        Stmt::Destructure {
            targets,
            value,
            span,
        } => Stmt::Destructure {
            targets,
            value: folder.fold_expr(value, span)?,
            span,
        },
        Stmt::Expression { expr, span } => Stmt::Expression {
            expr: folder.fold_expr(expr, span)?,
            span,
        },
        Stmt::If {
            condition,
            then_branch,
            else_branch,
            span,
        } => Stmt::If {
            condition: folder.fold_expr(condition, span)?,
            then_branch: folder.fold_block(then_branch)?,
            else_branch: else_branch
                .map(|branch| folder.fold_block(branch))
                .transpose()?,
            span,
        },
        Stmt::While {
            condition,
            body,
            span,
        } => Stmt::While {
            condition: folder.fold_expr(condition, span)?,
            body: folder.fold_block(body)?,
            span,
        },
        Stmt::For {
            variable,
            iterable,
            body,
            span,
        } => Stmt::For {
            variable,
            iterable: folder.fold_expr(iterable, span)?,
            body: folder.fold_block(body)?,
            span,
        },
        Stmt::FunctionDef(def) => Stmt::FunctionDef(folder.fold_function(def)?),
        Stmt::Return { value, span } => Stmt::Return {
            value: value.map(|v| folder.fold_expr(v, span)).transpose()?,
            span,
        },
        stmt @ (Stmt::Break { .. } | Stmt::Continue { .. }) => stmt,
    };
    Ok(stmt)
}

pub fn walk_function<F: Fold + ?Sized>(
    folder: &mut F,
    def: FunctionDef,
) -> TransformResult<FunctionDef> {
    Ok(FunctionDef {
        body: folder.fold_block(def.body)?,
        ..def
    })
}

pub fn walk_expr<F: Fold + ?Sized>(
    folder: &mut F,
    expr: Expr,
    span: LineSpan,
) -> TransformResult<Expr> {
    let expr = match expr {
        Expr::List { elements } => Expr::List {
            elements: elements
                .into_iter()
                .map(|element| folder.fold_expr(element, span))
                .collect::<TransformResult<_>>()?,
        },
        Expr::Index { object, index } => Expr::Index {
            object: Box::new(folder.fold_expr(*object, span)?),
            index: Box::new(folder.fold_expr(*index, span)?),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(folder.fold_expr(*left, span)?),
            right: Box::new(folder.fold_expr(*right, span)?),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(folder.fold_expr(*operand, span)?),
        },
        Expr::Call { function, args } => Expr::Call {
            function,
            args: args
                .into_iter()
                .map(|arg| folder.fold_expr(arg, span))
                .collect::<TransformResult<_>>()?,
        },
        expr @ (Expr::Literal(_) | Expr::Identifier(_) | Expr::Trace(_)) => expr,
    };
    Ok(expr)
}
