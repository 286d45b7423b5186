//! Source-method -> target-method remapping (`spec.md` §4.4
//! "RemappedIntrinsics").
//!
//! A frontend decodes calls exactly as the source language wrote them —
//! `System.Math::Sqrt`, `System.Threading.Interlocked::Add` — but only
//! the `Nimbus.*` target names below have dispatch handlers registered.
//! This table bridges the two, so decoding never has to know about the
//! device-safe renaming and dispatch never has to know about every
//! possible alias a source method might arrive under.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// `(declaring_type, method_name)`, matched exactly — no overload
/// resolution by argument type, since every alias registered here maps
/// one-to-one onto a single target method.
pub type MethodKey = (&'static str, &'static str);

const REMAPPED: &[(MethodKey, MethodKey)] = &[
    (("System.Math", "Sqrt"), ("Nimbus.Math", "Sqrt")),
    (("System.MathF", "Sqrt"), ("Nimbus.Math", "Sqrt")),
    (("System.Math", "Sin"), ("Nimbus.Math", "Sin")),
    (("System.MathF", "Sin"), ("Nimbus.Math", "Sin")),
    (("System.Math", "Cos"), ("Nimbus.Math", "Cos")),
    (("System.MathF", "Cos"), ("Nimbus.Math", "Cos")),
    (("System.Math", "Abs"), ("Nimbus.Math", "Abs")),
    (("System.MathF", "Abs"), ("Nimbus.Math", "Abs")),
    (("System.Math", "Floor"), ("Nimbus.Math", "Floor")),
    (("System.MathF", "Floor"), ("Nimbus.Math", "Floor")),
    (("System.Math", "Ceiling"), ("Nimbus.Math", "Ceiling")),
    (("System.MathF", "Ceiling"), ("Nimbus.Math", "Ceiling")),
    (("System.Math", "Pow"), ("Nimbus.Math", "Pow")),
    (("System.MathF", "Pow"), ("Nimbus.Math", "Pow")),
    (("System.Math", "Atan2"), ("Nimbus.Math", "Atan2")),
    (("System.Math", "Min"), ("Nimbus.Math", "Min")),
    (("System.Math", "Max"), ("Nimbus.Math", "Max")),
    (("System.Double", "IsNaN"), ("Nimbus.Math", "IsNaN")),
    (("System.Single", "IsNaN"), ("Nimbus.Math", "IsNaN")),
    (("System.Double", "IsInfinity"), ("Nimbus.Math", "IsInfinity")),
    (("System.Single", "IsInfinity"), ("Nimbus.Math", "IsInfinity")),
    (("System.Threading.Interlocked", "Add"), ("Nimbus.Atomic", "Add")),
    (("System.Threading.Interlocked", "Exchange"), ("Nimbus.Atomic", "Exchange")),
];

static TABLE: Lazy<FxHashMap<MethodKey, MethodKey>> = Lazy::new(|| REMAPPED.iter().copied().collect());

/// Resolve `key` to its device-safe target name, if one is registered.
/// A method with no registered remapping is returned unchanged — it is
/// either already a `Nimbus.*` intrinsic name or an ordinary call the
/// optimizer's inliner is left to resolve.
pub fn remap(key: MethodKey) -> MethodKey {
    TABLE.get(&key).copied().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaps_system_math_sqrt() {
        assert_eq!(remap(("System.Math", "Sqrt")), ("Nimbus.Math", "Sqrt"));
    }

    #[test]
    fn leaves_unregistered_methods_unchanged() {
        assert_eq!(remap(("My.Namespace", "Helper")), ("My.Namespace", "Helper"));
    }
}
