use nimbus_codegen::opt::pipeline::OptimizationLevel;
use nimbus_codegen::DebugInformation;

/// Embedder-facing compilation knobs (`spec.md` §6 "CompileOptions").
///
/// Target architecture and capability gating live on `CapabilityContext`
/// instead, since that type is already threaded separately through every
/// call that needs it (`nimbus-codegen/src/capability.rs`); duplicating
/// `target_architecture`/`allowed_capabilities` here would just be a
/// second source of truth for the same decision.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub optimization_level: OptimizationLevel,
    /// Forwarded to `nimbus_codegen::opt::inline::run`'s `threshold`
    /// parameter, measured in the same units: the callee's value count.
    pub inlining_threshold: usize,
    pub enable_debug_info: bool,
    /// Relaxes floating-point folding to treat NaN/Inf as unreachable,
    /// the embedder-facing switch for the per-value `ArithmeticFlags`
    /// `nimbus_codegen::opt::fold` already consults.
    pub enable_fast_math: bool,
    /// Sequence points loaded from the embedder's debug-symbol provider
    /// (`spec.md` §6 "Debug-symbol provider"), consulted by the backend
    /// only when `enable_debug_info` is set. Loading these from the raw
    /// provider bytes is the embedder's job — `DebugInformation::load`
    /// — since only it knows which assembly a method came from; this
    /// type just carries the already-loaded result the rest of the way
    /// to the backend.
    pub debug_information: Option<DebugInformation>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::default(),
            inlining_threshold: 40,
            enable_debug_info: false,
            enable_fast_math: false,
            debug_information: None,
        }
    }
}
