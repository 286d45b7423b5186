//! `Context`: the single entry point an embedder drives to go from a
//! declared [`MethodRef`] to a [`CompiledKernel`] (`spec.md` §5, §6).
//!
//! Modeled on `cranelift-codegen`'s `Context`, which owns one `Function`
//! through decode → optimize → emit and exposes a single `compile`
//! method; the wasmtime-specific glue crate (`crates/cranelift`) plays
//! the same role this crate does, translating a source-language frontend
//! into calls against that `Context`.

use std::collections::HashMap as StdHashMap;

use rustc_hash::FxHashMap;

use nimbus_codegen::ir::{ArithmeticFlags, Function, Opcode, TypeSystem};
use nimbus_codegen::isa::{ptx, BackendKind, CompiledKernel};
use nimbus_codegen::opt::inline::{self, CalleeResolver};
use nimbus_codegen::opt::pipeline::{self, CancellationToken, OptimizationLevel};
use nimbus_codegen::result::{CodegenResult, CompileError};
use nimbus_codegen::CapabilityContext;
use nimbus_frontend::{decode_method, MethodRef};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::options::CompileOptions;

/// Resolves inlining callees against a fixed set of sibling functions,
/// decoded once up front. Missing or undecodable siblings are simply
/// absent from the map — `inline::run` treats an unresolved callee the
/// same as an external one and leaves the call alone, so a sibling that
/// fails to decode just forgoes being inlined rather than failing the
/// whole compile.
struct DeclaredMethodResolver {
    siblings: FxHashMap<String, Function>,
}

impl CalleeResolver for DeclaredMethodResolver {
    fn resolve(&self, name: &str) -> Option<&Function> {
        self.siblings.get(name)
    }
}

/// A [`CalleeResolver`] with nothing to resolve, for compiling a
/// standalone [`Function`] built directly with `FunctionBuilder` (no
/// sibling [`MethodRef`]s declared through a [`Context`] at all —
/// `spec.md` §6's inline-assembly escape hatch is the motivating case,
/// since there's no bytecode to `decode_method` in the first place).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallees;

impl CalleeResolver for NoCallees {
    fn resolve(&self, _name: &str) -> Option<&Function> {
        None
    }
}

/// Walks every value in `func` and sets each arithmetic opcode's
/// `fast_math` flag, the post-decode counterpart of `CompileOptions::
/// enable_fast_math` (the decoder itself has no fast-math parameter to
/// thread through — `nimbus_codegen::opt::fold`'s algebraic identities
/// already key off this per-value flag, so this pass is the only piece
/// needed to wire the embedder-facing switch to them).
fn apply_fast_math(func: &mut Function) {
    let values: Vec<_> = func.dfg.values().collect();
    for v in values {
        let mut opcode = func.dfg.value(v).opcode.clone();
        let flags: &mut ArithmeticFlags = match &mut opcode {
            Opcode::Unary { flags, .. } | Opcode::Binary { flags, .. } | Opcode::Ternary { flags, .. } | Opcode::Convert { flags, .. } => flags,
            _ => continue,
        };
        if flags.fast_math() {
            continue;
        }
        flags.set_fast_math();
        func.dfg.replace_opcode(v, opcode);
    }
}

/// Owns the methods declared for one compilation unit and drives each
/// one through decoding, cross-method inlining, optimization and backend
/// lowering (`spec.md` §5 "Context"). `nimbus-intrinsics` resolution
/// already happens transparently inside `decode_method`; the only
/// cross-function concern left for this type is inlining, since
/// `nimbus_codegen::opt::pipeline::run` only ever sees one `Function` at
/// a time.
pub struct Context<'t> {
    types: &'t TypeSystem,
    methods: StdHashMap<String, MethodRef>,
}

impl<'t> Context<'t> {
    pub fn new(types: &'t TypeSystem) -> Self {
        Self {
            types,
            methods: StdHashMap::new(),
        }
    }

    /// Declares a method available for this context to compile and, once
    /// optimization runs, to inline into other declared methods that
    /// call it by name.
    pub fn declare_method(&mut self, method: MethodRef) {
        self.methods.insert(method.name.clone(), method);
    }

    /// Decodes, optimizes and lowers the declared method named
    /// `method_name` to a `CompiledKernel` for `backend`.
    pub fn compile(
        &self,
        method_name: &str,
        backend: BackendKind,
        capabilities: &CapabilityContext,
        options: &CompileOptions,
        diagnostics: &dyn DiagnosticSink,
        token: &CancellationToken,
    ) -> CodegenResult<CompiledKernel> {
        let method = self.methods.get(method_name).ok_or_else(|| CompileError::UnsupportedOperation {
            message: format!("unknown method `{method_name}`"),
            loc: nimbus_codegen::ir::SourceLoc::unknown(),
        })?;

        let mut func = decode_method(method, self.types, capabilities)?;

        let resolver = if matches!(options.optimization_level, OptimizationLevel::None) {
            None
        } else {
            let mut siblings = FxHashMap::default();
            for (name, sibling) in self.methods.iter() {
                if name == method_name {
                    continue;
                }
                match decode_method(sibling, self.types, capabilities) {
                    Ok(sibling_func) => {
                        siblings.insert(name.clone(), sibling_func);
                    }
                    Err(err) => {
                        diagnostics.emit(Diagnostic::warning(format!(
                            "skipping `{name}` as an inlining candidate: {err}"
                        )));
                    }
                }
            }
            Some(DeclaredMethodResolver { siblings })
        };

        match &resolver {
            Some(resolver) => {
                if inline::run(&mut func, resolver, options.inlining_threshold) {
                    diagnostics.emit(Diagnostic::info(format!("inlined one or more callees into `{method_name}`")));
                }
            }
            None => {}
        }

        compile_function(&mut func, self.types, backend, capabilities, options, &NoCallees, diagnostics, token)
    }
}

/// Compiles a standalone [`MethodRef`] with no sibling methods to
/// consider for inlining — the free-function shape `spec.md` §6
/// describes for a one-off compile, with `types` added since every
/// `TypeRef` a caller passes in must have come from the same interner
/// the backend later queries for size/alignment.
pub fn compile(
    method: &MethodRef,
    types: &TypeSystem,
    backend: BackendKind,
    capabilities: &CapabilityContext,
    options: &CompileOptions,
) -> CodegenResult<CompiledKernel> {
    let mut ctx = Context::new(types);
    ctx.declare_method(method.clone());
    ctx.compile(
        &method.name,
        backend,
        capabilities,
        options,
        &crate::diagnostics::NullDiagnosticSink,
        &CancellationToken::new(),
    )
}

/// Runs the optimizer and backend over an already-built [`Function`],
/// skipping decode entirely. The entry point prebuilt-IR callers need —
/// an inline-PTX kernel assembled directly with `FunctionBuilder` has no
/// bytecode for `decode_method` to read in the first place.
pub fn compile_function(
    func: &mut Function,
    types: &TypeSystem,
    backend: BackendKind,
    capabilities: &CapabilityContext,
    options: &CompileOptions,
    resolver: &dyn CalleeResolver,
    diagnostics: &dyn DiagnosticSink,
    token: &CancellationToken,
) -> CodegenResult<CompiledKernel> {
    for cap in func.required_capabilities.iter().copied() {
        if !capabilities.supports(cap) {
            return Err(CompileError::CapabilityNotSupported {
                feature: cap.to_string(),
                min_arch: CapabilityContext::min_arch_for(cap).to_string(),
            });
        }
    }

    if options.enable_fast_math {
        apply_fast_math(func);
    }

    if !matches!(options.optimization_level, OptimizationLevel::None) {
        if inline::run(func, resolver, options.inlining_threshold) {
            diagnostics.emit(Diagnostic::info(format!("inlined one or more callees into `{}`", func.name)));
        }
    }

    pipeline::run(func, options.optimization_level, options.inlining_threshold, token)?;

    match backend {
        BackendKind::Ptx => ptx::compile(
            func,
            types,
            capabilities,
            &ptx::PtxOptions {
                enable_debug_info: options.enable_debug_info,
            },
            options.debug_information.as_ref(),
        ),
    }
}
