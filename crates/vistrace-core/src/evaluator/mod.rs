// Tree-walking evaluator that executes (instrumented) programs.
// Tracer nodes are evaluated like any other expression: the wrapped value is
// computed once and handed to the `TraceHooks`, whose return value is used.

use std::{collections::HashMap, rc::Rc};

use anyhow::Result;

use crate::{
    ast::{BinaryOp, Expr, LineSpan, Program, Stmt, TraceNode, UnaryOp},
    symbolic::{encode_load, SymbolicExpr},
    trace::{LinkCall, Scope, TraceHooks},
};

pub mod builtins;
pub mod errors;
pub mod ops;
mod value;

pub use builtins::{Builtin, BUILTIN_NAMES};
pub use errors::EvaluatorError;
pub use value::Value;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

/// Control flow result for handling break/continue/return
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Resource limits that stand in for a wall-clock timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 100,
        }
    }
}

/// Name resolution view handed to the tracer: innermost frame, then globals,
/// then built-ins.
struct FrameScope<'a> {
    globals: &'a Environment,
    local: Option<&'a Environment>,
}

impl Scope for FrameScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.local
            .and_then(|frame| frame.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
            .or_else(|| Builtin::from_name(name).map(Value::Builtin))
    }
}

pub struct Evaluator<'h> {
    globals: Environment,
    frames: Vec<Environment>,
    hooks: &'h mut dyn TraceHooks,
    limits: Limits,
    steps: u64,
    current_span: LineSpan,
    output: Vec<String>,
}

impl<'h> Evaluator<'h> {
    pub fn new(hooks: &'h mut dyn TraceHooks) -> Self {
        Self {
            globals: Environment::new(),
            frames: Vec::new(),
            hooks,
            limits: Limits::default(),
            steps: 0,
            current_span: LineSpan::default(),
            output: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Execute a program's top-level statements in the global scope.
    ///
    /// Globals persist between calls, so several files can be run into the
    /// same namespace.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        match self.exec_block(&program.body)? {
            ControlFlow::Normal | ControlFlow::Return(_) => Ok(()),
            ControlFlow::Break | ControlFlow::Continue => {
                Err(EvaluatorError::Runtime("break or continue outside of a loop".into()).into())
            }
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Lines written by `print`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// First line of the statement executing most recently
    pub fn current_line(&self) -> usize {
        self.current_span.begin
    }

    fn scope(&self) -> FrameScope<'_> {
        FrameScope {
            globals: &self.globals,
            local: self.frames.last(),
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(EvaluatorError::StepLimitExceeded {
                limit: self.limits.max_steps,
            }
            .into());
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => frame.set(name, value),
            None => self.globals.set(name, value),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.scope()
            .lookup(name)
            .ok_or_else(|| EvaluatorError::variable_not_found(name).into())
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<ControlFlow> {
        for stmt in stmts {
            let flow = self.exec_stmt(stmt)?;
            if flow != ControlFlow::Normal {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow> {
        self.tick()?;
        self.current_span = stmt.span();

        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Stmt::MultiAssign { targets, value, .. } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            Stmt::Destructure { targets, value, .. } => {
                let value = self.eval(value)?;
                let items = match &value {
                    Value::List(items) => items.borrow().clone(),
                    other => {
                        return Err(EvaluatorError::unary_type_error(
                            "destructuring",
                            "list",
                            other.type_name(),
                        )
                        .into())
                    }
                };
                if items.len() != targets.len() {
                    return Err(EvaluatorError::invalid_operation(format!(
                        "cannot unpack {} values into {} targets",
                        items.len(),
                        targets.len()
                    ))
                    .into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
            Stmt::Expression { expr, .. } => {
                self.eval(expr)?;
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(condition)?.is_truthy() {
                    return self.exec_block(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.exec_block(else_branch);
                }
            }
            Stmt::While {
                condition, body, ..
            } => {
                while self.eval(condition)?.is_truthy() {
                    self.tick()?;
                    match self.exec_block(body)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                    }
                }
            }
            Stmt::For {
                variable,
                iterable,
                body,
                ..
            } => {
                // Iterates over a snapshot taken when the loop starts
                let items = match self.eval(iterable)? {
                    Value::List(items) => items.borrow().clone(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    other => {
                        return Err(EvaluatorError::unary_type_error(
                            "for loop",
                            "list or string",
                            other.type_name(),
                        )
                        .into())
                    }
                };
                for item in items {
                    self.tick()?;
                    self.bind(variable, item);
                    match self.exec_block(body)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                    }
                }
            }
            Stmt::FunctionDef(def) => {
                self.bind(&def.name, Value::Function(Rc::new(def.clone())));
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(ControlFlow::Return(value));
            }
            Stmt::Break { .. } => return Ok(ControlFlow::Break),
            Stmt::Continue { .. } => return Ok(ControlFlow::Continue),
        }
        Ok(ControlFlow::Normal)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<()> {
        match target {
            Expr::Identifier(name) => {
                self.bind(name, value);
                Ok(())
            }
            Expr::Index { object, index } => {
                let container = self.eval(object)?;
                let index = self.eval(index)?;
                let Value::Integer(i) = index else {
                    return Err(EvaluatorError::unary_type_error(
                        "index assignment",
                        "integer index",
                        index.type_name(),
                    )
                    .into());
                };
                match container {
                    Value::List(items) => {
                        let mut items = items.borrow_mut();
                        let pos = ops::checked_position(i, items.len())?;
                        items[pos] = value;
                        Ok(())
                    }
                    other => Err(EvaluatorError::unary_type_error(
                        "index assignment",
                        "list",
                        other.type_name(),
                    )
                    .into()),
                }
            }
            other => Err(EvaluatorError::invalid_operation(format!(
                "cannot assign to {other}"
            ))
            .into()),
        }
    }

    /// Evaluate an expression in the current scope
    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(Value::from(literal)),
            Expr::Identifier(name) => self.lookup(name),
            Expr::List { elements } => {
                let items = elements
                    .iter()
                    .map(|element| self.eval(element))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                Ok(ops::index(&object, &index)?)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(Value::Boolean(false)),
                    BinaryOp::Or if left.is_truthy() => Ok(Value::Boolean(true)),
                    _ => {
                        let right = self.eval(right)?;
                        Ok(ops::binary(*op, &left, &right)?)
                    }
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match op {
                    UnaryOp::Negate => Ok(ops::negate(&operand)?),
                    UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
                }
            }
            Expr::Call { function, args } => self.call(function, args),
            Expr::Trace(node) => self.eval_trace(node),
        }
    }

    fn eval_trace(&mut self, node: &TraceNode) -> Result<Value> {
        match node {
            TraceNode::Read {
                symbol,
                value,
                span,
            } => {
                let value = self.eval(value)?;
                let scope = FrameScope {
                    globals: &self.globals,
                    local: self.frames.last(),
                };
                Ok(self.hooks.read(symbol, value, *span, &scope))
            }
            TraceNode::Write {
                source,
                target,
                value,
                span,
            } => {
                let value = self.eval(value)?;
                let scope = FrameScope {
                    globals: &self.globals,
                    local: self.frames.last(),
                };
                Ok(self.hooks.write(source, target, value, *span, &scope))
            }
            TraceNode::Carry { value, .. } => self.eval(value),
        }
    }

    /// A built-in changed `list` in place: report it as a write of the
    /// argument expression. Arguments inside a write node were never
    /// read-wrapped, so they are encoded here.
    fn report_mutation(&mut self, arg: &Expr, list: Value) {
        let (symbol, span) = match arg {
            Expr::Trace(TraceNode::Read { symbol, span, .. }) => (symbol.clone(), *span),
            other => (encode_load(other), self.current_span),
        };
        let scope = FrameScope {
            globals: &self.globals,
            local: self.frames.last(),
        };
        self.hooks
            .write(&SymbolicExpr::Undefined, &symbol, list, span, &scope);
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value> {
        match self.lookup(name)? {
            Value::Builtin(builtin) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                let mutated = values.first().cloned().filter(|_| builtin.mutates_argument());
                let result = builtins::call(builtin, values, &mut self.output)?;
                if let (Some(list), Some(arg)) = (mutated, args.first()) {
                    self.report_mutation(arg, list);
                }
                Ok(result)
            }
            Value::Function(def) => {
                let mut carried = Vec::with_capacity(args.len());
                for arg in args {
                    carried.push(match arg {
                        Expr::Trace(TraceNode::Carry { symbol, value }) => {
                            (symbol.clone(), self.eval(value)?)
                        }
                        other => (SymbolicExpr::Undefined, self.eval(other)?),
                    });
                }
                if carried.len() != def.params.len() {
                    return Err(EvaluatorError::arity(
                        &def.name,
                        def.params.len().to_string(),
                        carried.len(),
                    )
                    .into());
                }
                if self.frames.len() >= self.limits.max_call_depth {
                    return Err(EvaluatorError::CallDepthExceeded {
                        limit: self.limits.max_call_depth,
                    }
                    .into());
                }

                if let Some(link) = &def.link {
                    let call = LinkCall {
                        function: &def.name,
                        params: &def.params,
                        args: &carried,
                        span: link.span,
                    };
                    let scope = FrameScope {
                        globals: &self.globals,
                        local: self.frames.last(),
                    };
                    self.hooks.link(&call, &scope);
                }

                let mut frame = Environment::new();
                for (param, (_, value)) in def.params.iter().zip(carried) {
                    frame.set(param, value);
                }
                self.frames.push(frame);
                let result = self.exec_block(&def.body);
                self.frames.pop();

                match result? {
                    ControlFlow::Return(value) => Ok(value),
                    ControlFlow::Normal => Ok(Value::Null),
                    ControlFlow::Break | ControlFlow::Continue => Err(EvaluatorError::Runtime(
                        format!("break or continue outside of a loop in {}", def.name),
                    )
                    .into()),
                }
            }
            _ => Err(EvaluatorError::NotCallable {
                name: name.to_string(),
            }
            .into()),
        }
    }
}
