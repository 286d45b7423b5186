//! Non-fatal compiler feedback (`spec.md` §6 "DiagnosticSink"): things
//! worth telling an embedder about that don't rise to a `CompileError` —
//! an inlining decision, a fallback lowering chosen over a preferred one.
//!
//! Mirrors `cranelift-codegen`'s `log`-based pass tracing, but as a typed
//! sink an embedder can capture rather than a process-wide log stream,
//! since a JIT compiling many kernels usually wants diagnostics attributed
//! to the one compilation that produced them.

use std::sync::Mutex;

/// How serious a [`Diagnostic`] is. Never fatal — anything that should
/// stop compilation is a `CompileError`, not a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Receives diagnostics as `Context::compile` emits them. Implementations
/// must tolerate being called from within a single-threaded compile (no
/// concurrency requirement is placed on this trait; `&self` rather than
/// `&mut self` only so a sink can be shared across several compiles
/// without the caller threading `&mut` through `Context::compile`).
pub trait DiagnosticSink {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Discards every diagnostic. The default for callers that only care
/// about the `Result`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnosticSink;

impl DiagnosticSink for NullDiagnosticSink {
    fn emit(&self, _diagnostic: Diagnostic) {}
}

/// Records every diagnostic in memory, in emission order. Exposed
/// unconditionally (not behind `#[cfg(test)]`) so integration tests in
/// `tests/`, which compile as a separate crate and cannot see this
/// library's test-only items, can still assert on what `Context::compile`
/// reported.
#[derive(Debug, Default)]
pub struct TestDiagnosticSink {
    recorded: Mutex<Vec<Diagnostic>>,
}

impl TestDiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every diagnostic recorded so far, in emission order.
    pub fn recorded(&self) -> Vec<Diagnostic> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.recorded.lock().unwrap().iter().map(|d| d.message.clone()).collect()
    }
}

impl DiagnosticSink for TestDiagnosticSink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.recorded.lock().unwrap().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_records_in_order() {
        let sink = TestDiagnosticSink::new();
        sink.emit(Diagnostic::info("first"));
        sink.emit(Diagnostic::warning("second"));
        assert_eq!(sink.messages(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullDiagnosticSink;
        sink.emit(Diagnostic::info("ignored"));
    }
}
