//! The ordered optimization pipeline driver (`spec.md` §4.5, §5, §6
//! `optimization_level`).
//!
//! Mirrors `cranelift-codegen`'s top-level `compile` loop: a fixed
//! ordered list of closed IR→IR passes, gated by an optimization level,
//! with a cancellation check between each one (`spec.md` §5).

use crate::ir::Function;
use crate::opt::{address_mode, cfg_simplify, dce, fold, licm};
use crate::result::{CodegenResult, CompileError};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// How much of the pipeline runs, per `spec.md` §6 `optimization_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    /// No optimization passes run at all; only address-mode lowering
    /// and (per-backend) SSA destruction run, since those are not
    /// optional rewrites but lowering steps the backend requires.
    None,
    /// Folding, DCE, and CFG simplification.
    #[default]
    Basic,
    /// Every pass in `spec.md` §4.5 rules 1-6, iterated until no pass
    /// makes further progress.
    Full,
}

/// Polled between passes; set by the embedder to abort a compilation in
/// flight. Cheap to clone and share across worker threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(std::sync::Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run the pipeline appropriate to `level` over `func`, checking `token`
/// between every pass and bailing out with [`CompileError::Cancelled`]
/// (never a partially-optimized function handed back as if complete).
pub fn run(func: &mut Function, level: OptimizationLevel, inlining_threshold: usize, token: &CancellationToken) -> CodegenResult<()> {
    let _ = inlining_threshold; // consulted by the inliner once a caller resolver is wired in by `nimbus-jit`
    check(token)?;
    match level {
        OptimizationLevel::None => {}
        OptimizationLevel::Basic => run_basic(func, token)?,
        OptimizationLevel::Full => run_full(func, token)?,
    }
    check(token)?;
    address_mode::run(func);
    Ok(())
}

fn run_basic(func: &mut Function, token: &CancellationToken) -> CodegenResult<()> {
    debug!("opt pipeline: basic ({})", func.name);
    fold::run(func);
    check(token)?;
    dce::run(func);
    check(token)?;
    cfg_simplify::run(func);
    Ok(())
}

fn run_full(func: &mut Function, token: &CancellationToken) -> CodegenResult<()> {
    debug!("opt pipeline: full ({})", func.name);
    loop {
        fold::run(func);
        check(token)?;
        dce::run(func);
        check(token)?;
        cfg_simplify::run(func);
        check(token)?;
        licm::run(func);
        check(token)?;

        // Re-run fold/DCE after LICM moves values, and again after any
        // CFG change, until nothing in this round changed the printed
        // IR. Cheap for the method sizes this compiler targets (device
        // kernels, not whole programs).
        let before = format!("{func}");
        fold::run(func);
        dce::run(func);
        let after = format!("{func}");
        if before == after {
            break;
        }
    }
    Ok(())
}

fn check(token: &CancellationToken) -> CodegenResult<()> {
    if token.is_cancelled() {
        return Err(CompileError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    fn build_foldable_fn() -> Function {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: i32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(3)).unwrap();
            let sum = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            let unused = b.create_binary(BinaryOp::Mul, a, c, ArithmeticFlags::new()).unwrap();
            let _ = unused;
            b.create_return(&[sum]).unwrap();
        }
        f
    }

    #[test]
    fn basic_level_folds_and_eliminates_dead_values() {
        let mut f = build_foldable_fn();
        let token = CancellationToken::new();
        run(&mut f, OptimizationLevel::Basic, 0, &token).unwrap();
        let entry = f.entry_block.expand().unwrap();
        assert_eq!(f.layout.block_values(entry).count(), 2); // folded const + return
    }

    #[test]
    fn none_level_still_runs_address_mode_lowering() {
        let mut f = build_foldable_fn();
        let token = CancellationToken::new();
        run(&mut f, OptimizationLevel::None, 0, &token).unwrap();
        // nothing folded: both consts, both arithmetic ops, and the
        // return all remain.
        let entry = f.entry_block.expand().unwrap();
        assert_eq!(f.layout.block_values(entry).count(), 5);
    }

    #[test]
    fn cancellation_between_passes_short_circuits_with_no_mutation() {
        let mut f = build_foldable_fn();
        let before = format!("{f}");
        let token = CancellationToken::new();
        token.cancel();
        let err = run(&mut f, OptimizationLevel::Full, 0, &token).unwrap_err();
        assert_eq!(err, CompileError::Cancelled);
        assert_eq!(format!("{f}"), before);
    }
}
