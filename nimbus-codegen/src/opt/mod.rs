//! The optimization pipeline (`spec.md` §4.5).
//!
//! Each submodule is one closed pass; [`pipeline::run`] drives the
//! intra-function passes (folding, DCE, CFG simplification, LICM,
//! address-mode lowering) in the order `spec.md` specifies. Inlining
//! (`inline.rs`) needs visibility across every function in a
//! compilation unit, so `nimbus-jit::Context` drives it directly rather
//! than folding it into this per-function pipeline. SSA destruction
//! (`ssa_destruct.rs`) is backend-specific and invoked by `isa::ptx`
//! lowering, not by the generic pipeline.

pub mod address_mode;
pub mod cfg_simplify;
pub mod dce;
pub mod fold;
pub mod inline;
pub mod licm;
pub mod pipeline;
pub mod ssa_destruct;

pub use pipeline::{CancellationToken, OptimizationLevel};
