//! Per-backend feature gating (`spec.md` §4.6 "CapabilityContext").
//!
//! Modeled on `cranelift-codegen::isa::TargetIsa`'s `Builder`/`lookup`
//! pattern, but flattened per the design note in `spec.md` §9: "Replace
//! virtual-dispatch capability hierarchies with a flat record of
//! booleans + small integers, passed by value into passes."

use std::collections::HashSet;

/// A named capability a lowering may require (`Group.Barrier`'s `.sync`
/// variant, 64-bit floating-point atomics, subgroup shuffle, ...).
/// Kept as a string tag, matched against `CapabilityContext::supports`
/// and the embedder-controlled `allowed_capabilities` allow-list
/// (`spec.md` §6).
pub type Capability = &'static str;

pub mod capabilities {
    use super::Capability;

    pub const SUBGROUP_SHUFFLE: Capability = "subgroup.shuffle";
    pub const FP16: Capability = "fp16";
    pub const FP64: Capability = "fp64";
    pub const TENSOR_CORE: Capability = "tensor_core";
    pub const ATOMIC_FP32_ADD: Capability = "atomic.fp32.add";
    pub const ATOMIC_FP64_ADD: Capability = "atomic.fp64.add";
    pub const ATOMIC_64BIT: Capability = "atomic.64bit";
    pub const BARRIER_SYNC: Capability = "barrier.sync";
}

/// Feature flags and small integer limits a target architecture reports,
/// consulted by pass guards (`spec.md` §4.5) and the PTX backend
/// (`spec.md` §4.6). Immutable once constructed — process-wide tables
/// built once, per the teacher's `TargetIsa` construction idiom.
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    /// Opaque target descriptor, e.g. a PTX SM level like `"sm_70"`.
    pub target_architecture: String,
    supported: HashSet<Capability>,
    /// Capabilities the embedder's `allowed_capabilities` configuration
    /// (`spec.md` §6) permits this compilation to use, even if the
    /// target reports them supported. `None` means "no restriction
    /// beyond what the target itself supports".
    allowed: Option<HashSet<Capability>>,
    pub max_registers_per_thread: u32,
    pub warp_size: u32,
}

impl CapabilityContext {
    pub fn new(target_architecture: impl Into<String>) -> Self {
        Self {
            target_architecture: target_architecture.into(),
            supported: HashSet::new(),
            allowed: None,
            max_registers_per_thread: 255,
            warp_size: 32,
        }
    }

    /// Construct the capability set for a given PTX SM level, mirroring
    /// the architecture-gated feature table the PTX backend design
    /// note calls for (`spec.md` §4.6 "Warp/group primitives").
    pub fn for_ptx_sm(sm: u32) -> Self {
        let mut ctx = Self::new(format!("sm_{sm}"));
        ctx.supported.insert(capabilities::BARRIER_SYNC);
        ctx.supported.insert(capabilities::ATOMIC_FP32_ADD);
        if sm >= 53 {
            ctx.supported.insert(capabilities::FP16);
        }
        if sm >= 60 {
            ctx.supported.insert(capabilities::ATOMIC_FP64_ADD);
            // Real `atom.f64.add` predates `.sync`-qualified forms; kept
            // here so sm_60's "should this be a hard failure or a
            // silent fallback" question (spec.md §9 Open Question 1)
            // never arises for this feature specifically.
        }
        if sm >= 60 {
            ctx.supported.insert(capabilities::FP64);
            ctx.supported.insert(capabilities::ATOMIC_64BIT);
        }
        if sm >= 70 {
            ctx.supported.insert(capabilities::SUBGROUP_SHUFFLE);
        }
        if sm >= 70 {
            // sm_70 requires `.sync` qualified barriers/shuffles; a
            // separate tag so the backend can pick the instruction
            // *form*, not just whether the feature exists at all.
            ctx.supported.insert("barrier.sync.qualified");
        }
        if sm >= 80 {
            ctx.supported.insert(capabilities::TENSOR_CORE);
        }
        ctx
    }

    pub fn allow_only(mut self, allowed: impl IntoIterator<Item = Capability>) -> Self {
        self.allowed = Some(allowed.into_iter().collect());
        self
    }

    /// Does the target report `cap` as present, and does the embedder's
    /// `allowed_capabilities` configuration (if restricted) permit it?
    pub fn supports(&self, cap: Capability) -> bool {
        let target_ok = self.supported.contains(cap);
        let policy_ok = self.allowed.as_ref().map(|a| a.contains(cap)).unwrap_or(true);
        target_ok && policy_ok
    }

    /// The lowest sm_NN-style architecture string that would make `cap`
    /// supported, for `CapabilityNotSupported` error messages
    /// (`spec.md` §7). Only meaningful for capabilities this context
    /// knows the introduction point of.
    pub fn min_arch_for(cap: Capability) -> &'static str {
        match cap {
            capabilities::FP64 | capabilities::ATOMIC_FP64_ADD | capabilities::ATOMIC_64BIT => "sm_60",
            capabilities::SUBGROUP_SHUFFLE => "sm_70",
            capabilities::TENSOR_CORE => "sm_80",
            capabilities::FP16 => "sm_53",
            _ => "sm_70",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sm_60_lacks_subgroup_shuffle() {
        let ctx = CapabilityContext::for_ptx_sm(60);
        assert!(!ctx.supports(capabilities::SUBGROUP_SHUFFLE));
        assert!(ctx.supports(capabilities::FP64));
    }

    #[test]
    fn sm_70_has_subgroup_shuffle() {
        let ctx = CapabilityContext::for_ptx_sm(70);
        assert!(ctx.supports(capabilities::SUBGROUP_SHUFFLE));
    }

    #[test]
    fn allow_list_further_restricts_target_support() {
        let ctx = CapabilityContext::for_ptx_sm(80).allow_only([capabilities::FP64]);
        assert!(ctx.supports(capabilities::FP64));
        assert!(!ctx.supports(capabilities::TENSOR_CORE));
    }
}
