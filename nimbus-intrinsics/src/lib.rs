//! Remapping and intrinsic dispatch tables (`spec.md` §4.4).
//!
//! Two process-wide, read-only tables, each built once behind a
//! [`once_cell::sync::Lazy`] in a fixed registration order so iteration
//! (and therefore any diagnostic that enumerates registered intrinsics)
//! is deterministic:
//!
//! - [`remap::remap`]: source-method name -> device-safe target name.
//! - [`dispatch::lookup`]: target-method name -> [`dispatch::Handler`],
//!   which rewrites a resolved call's own opcode in place.
//!
//! `nimbus-frontend` is the only caller: on every `Call` it decodes, it
//! first runs the callee through [`remap`], then checks [`resolve`] — a
//! hit means "emit this call's lowering right here", a miss means "leave
//! it as an ordinary call for the optimizer's inliner to resolve".

pub mod dispatch;
pub mod remap;

pub use dispatch::{Handler, IntrinsicCtx};
pub use remap::MethodKey;

/// Remap `key`, then look up a dispatch handler for the remapped name.
/// `None` means `key` (after remapping) is an ordinary callable method,
/// not an intrinsic.
pub fn resolve(key: MethodKey) -> Option<Handler> {
    dispatch::lookup(remap::remap(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remapped_math_sqrt_resolves_to_a_handler() {
        assert!(resolve(("System.Math", "Sqrt")).is_some());
    }

    #[test]
    fn unremapped_unknown_method_does_not_resolve() {
        assert!(resolve(("My.Namespace", "Helper")).is_none());
    }

    #[test]
    fn remapped_interlocked_exchange_resolves_to_a_handler() {
        assert!(resolve(("System.Threading.Interlocked", "Exchange")).is_some());
    }
}
