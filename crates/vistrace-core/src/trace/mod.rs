/*!
# Tracer Runtime

The runtime half of instrumentation. The evaluator calls into a
[`TraceHooks`] implementation whenever it evaluates a generated tracer node;
[`TraceContext`] is the implementation that records operations.

## Contract

- `read` and `write` receive the value the program already computed and
  return it unchanged, so instrumentation never alters what the program sees.
- Records are appended in execution order, one complete unit per append.
- A write whose source is computed first records a read of each observed
  operand other than the written location.
- Nothing here fails outward. Unresolvable locations and unserializable
  values drop the record, bump a counter in [`TraceStats`] and log a warning.
- The observed set starts as the caller's watch list and grows only through
  `link`, when an observed argument is passed to an unobserved parameter.
*/

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    ast::LineSpan,
    evaluator::{ops, Value},
    symbolic::SymbolicExpr,
};

pub mod errors;
pub mod live;
pub mod record;
pub mod sink;

pub use errors::TraceError;
pub use live::{ChannelLiveStream, LiveStream, LiveStreamError};
pub use record::{snapshot, Location, OperationKind, OperationRecord};
pub use sink::{parse_log, read_log, JsonLinesSink, MemorySink, ParsedLog, TraceSink};


/// Read-only view of the bindings visible at a tracer call
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// A call to a linked function, as seen just before its frame is pushed
#[derive(Debug)]
pub struct LinkCall<'a> {
    pub function: &'a str,
    pub params: &'a [String],
    /// Encoded argument and its evaluated value, one per parameter
    pub args: &'a [(SymbolicExpr, Value)],
    pub span: LineSpan,
}

/// Evaluator-facing tracer interface
pub trait TraceHooks {
    fn read(&mut self, symbol: &SymbolicExpr, value: Value, span: LineSpan, scope: &dyn Scope)
        -> Value;

    fn write(
        &mut self,
        source: &SymbolicExpr,
        target: &SymbolicExpr,
        value: Value,
        span: LineSpan,
        scope: &dyn Scope,
    ) -> Value;

    fn link(&mut self, call: &LinkCall<'_>, scope: &dyn Scope);
}

/// Hooks that record nothing, for running programs without tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl TraceHooks for NoTrace {
    fn read(&mut self, _: &SymbolicExpr, value: Value, _: LineSpan, _: &dyn Scope) -> Value {
        value
    }

    fn write(
        &mut self,
        _: &SymbolicExpr,
        _: &SymbolicExpr,
        value: Value,
        _: LineSpan,
        _: &dyn Scope,
    ) -> Value {
        value
    }

    fn link(&mut self, _: &LinkCall<'_>, _: &dyn Scope) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    pub records: usize,
    pub unresolved: usize,
    pub serialization_failures: usize,
    pub sink_failures: usize,
    pub live_failures: usize,
}

/// Evaluate a symbolic expression against the live scope
pub fn evaluate(symbol: &SymbolicExpr, scope: &dyn Scope) -> Result<Value, TraceError> {
    match symbol {
        SymbolicExpr::Variable { name, .. } => {
            scope.lookup(name).ok_or_else(|| TraceError::unresolved(name))
        }
        SymbolicExpr::Literal(literal) => Ok(Value::from(literal)),
        SymbolicExpr::BinaryOp { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            ops::binary(*op, &left, &right).map_err(|e| TraceError::Unresolvable(e.to_string()))
        }
        SymbolicExpr::Subscript { base, indices } => {
            let mut current = evaluate(base, scope)?;
            for index in indices {
                let index = evaluate(index, scope)?;
                current = ops::index(&current, &index)
                    .map_err(|e| TraceError::Unresolvable(e.to_string()))?;
            }
            Ok(current)
        }
        SymbolicExpr::Undefined => Err(TraceError::Unresolvable(
            "expression is not traceable".to_string(),
        )),
    }
}

/// Resolve a symbolic expression to a concrete location.
///
/// `Ok(None)` means the expression does not name storage at all (a literal,
/// an arithmetic result, an untraceable expression).
pub fn resolve_location(
    symbol: &SymbolicExpr,
    scope: &dyn Scope,
) -> Result<Option<Location>, TraceError> {
    match symbol {
        SymbolicExpr::Variable { name, .. } => Ok(Some(Location::variable(name))),
        SymbolicExpr::Subscript { base, indices } => {
            let Some(root) = base.root_identifier() else {
                return Ok(None);
            };
            let mut path = Vec::with_capacity(indices.len());
            for index in indices {
                match evaluate(index, scope)? {
                    Value::Integer(i) => path.push(i),
                    other => {
                        return Err(TraceError::Unresolvable(format!(
                            "index of type {} on '{root}'",
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Some(Location::indexed(root, path)))
        }
        _ => Ok(None),
    }
}

/// Records reads, writes and call-boundary links for one program run
pub struct TraceContext<S: TraceSink> {
    observed: BTreeSet<String>,
    sink: S,
    live: Option<Box<dyn LiveStream>>,
    stats: TraceStats,
}

impl<S: TraceSink> TraceContext<S> {
    pub fn new<I, T>(observed: I, sink: S) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            observed: observed.into_iter().map(Into::into).collect(),
            sink,
            live: None,
            stats: TraceStats::default(),
        }
    }

    pub fn with_live_stream(mut self, live: Box<dyn LiveStream>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn is_observed(&self, name: &str) -> bool {
        self.observed.contains(name)
    }

    /// Current observed set, including parameters added through links
    pub fn observed(&self) -> &BTreeSet<String> {
        &self.observed
    }

    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Flush the sink and hand it back with the final counters
    pub fn finish(mut self) -> (S, TraceStats) {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(error = %e, "failed to flush trace sink");
            self.stats.sink_failures += 1;
        }
        (self.sink, self.stats)
    }

    fn root_observed(&self, symbol: &SymbolicExpr) -> bool {
        symbol
            .root_identifier()
            .is_some_and(|root| self.observed.contains(root))
    }

    /// Record a read of one operand of a computed write source. Reading the
    /// written location itself is part of the write, as in `a = a + 1`.
    fn operand_read(
        &mut self,
        operand: &SymbolicExpr,
        target: Option<&Location>,
        span: LineSpan,
        scope: &dyn Scope,
    ) {
        let read = resolve_location(operand, scope)
            .and_then(|location| Ok((location, evaluate(operand, scope)?)));
        match read {
            Ok((Some(location), _)) if Some(&location) == target => {}
            Ok((Some(location), value)) => {
                self.append(OperationKind::Read, Some(location), None, &value, span)
            }
            Ok((None, _)) => {}
            Err(e) => self.unresolved("read", e),
        }
    }

    fn unresolved(&mut self, what: &str, error: TraceError) {
        tracing::warn!(error = %error, "skipping {} record", what);
        self.stats.unresolved += 1;
    }

    fn append(
        &mut self,
        kind: OperationKind,
        source: Option<Location>,
        target: Option<Location>,
        value: &Value,
        span: LineSpan,
    ) {
        let value = match snapshot(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, ?kind, "skipping record with unserializable value");
                self.stats.serialization_failures += 1;
                return;
            }
        };
        let record = OperationRecord::new(kind, source, target, value, span);

        if let Err(e) = self.sink.append(&record) {
            tracing::warn!(error = %e, "trace sink rejected record");
            self.stats.sink_failures += 1;
            return;
        }
        self.stats.records += 1;

        if let Some(live) = self.live.as_mut() {
            let sent = serde_json::to_string(&record)
                .map_err(|e| LiveStreamError::Other(e.to_string()))
                .and_then(|payload| live.send(&payload));
            if let Err(e) = sent {
                tracing::debug!(error = %e, "live stream send failed");
                self.stats.live_failures += 1;
            }
        }
    }
}

impl<S: TraceSink> TraceHooks for TraceContext<S> {
    fn read(
        &mut self,
        symbol: &SymbolicExpr,
        value: Value,
        span: LineSpan,
        scope: &dyn Scope,
    ) -> Value {
        if !self.root_observed(symbol) {
            return value;
        }
        match resolve_location(symbol, scope) {
            Ok(Some(location)) => {
                self.append(OperationKind::Read, Some(location), None, &value, span)
            }
            Ok(None) => {}
            Err(e) => self.unresolved("read", e),
        }
        value
    }

    fn write(
        &mut self,
        source: &SymbolicExpr,
        target: &SymbolicExpr,
        value: Value,
        span: LineSpan,
        scope: &dyn Scope,
    ) -> Value {
        let records_write = self.root_observed(target) || self.root_observed(source);
        // A computed source names no storage; its observed operands are reads
        let operands: Vec<&SymbolicExpr> = if source.is_location() {
            Vec::new()
        } else {
            source
                .variables()
                .into_iter()
                .filter(|operand| self.root_observed(operand))
                .collect()
        };
        if !records_write && operands.is_empty() {
            return value;
        }
        let target_location = match resolve_location(target, scope) {
            Ok(location) => location,
            Err(e) => {
                self.unresolved("write", e);
                None
            }
        };
        for operand in operands {
            self.operand_read(operand, target_location.as_ref(), span, scope);
        }

        let Some(target_location) = target_location.filter(|_| records_write) else {
            return value;
        };
        // An unresolvable source only loses the provenance, not the write
        let source_location = match resolve_location(source, scope) {
            Ok(location) => location,
            Err(e) => {
                tracing::debug!(error = %e, "write source left undefined");
                None
            }
        };
        self.append(
            OperationKind::Write,
            source_location,
            Some(target_location),
            &value,
            span,
        );
        value
    }

    fn link(&mut self, call: &LinkCall<'_>, scope: &dyn Scope) {
        for (param, (symbol, value)) in call.params.iter().zip(call.args) {
            if symbol.is_variable_named(param) {
                continue;
            }
            let argument_observed = self.root_observed(symbol);
            let param_observed = self.observed.contains(param);
            if !argument_observed && !param_observed {
                continue;
            }
            if argument_observed && !param_observed {
                tracing::debug!(function = call.function, param = %param, "parameter joins observed set");
                self.observed.insert(param.clone());
            }

            let source = match resolve_location(symbol, scope) {
                Ok(location) => location,
                Err(e) => {
                    self.unresolved("link", e);
                    None
                }
            };
            self.append(
                OperationKind::Link,
                source,
                Some(Location::variable(param)),
                value,
                call.span,
            );
        }
    }
}
