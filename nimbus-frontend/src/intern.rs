//! A process-wide string interner for method names.
//!
//! `nimbus-intrinsics`'s dispatch and remapping tables are keyed by
//! `(&'static str, &'static str)` (`spec.md` §4.4: tables "built at
//! startup in a fixed order" and never mutated again). A decoder reading
//! a method's declaring type and name out of a loaded assembly's
//! metadata only has them as owned, assembly-lifetime strings; interning
//! once per unique string gives back the `'static` handle the dispatch
//! tables expect, at the cost of never reclaiming the text — acceptable
//! for a long-lived JIT process, the same tradeoff `cranelift-codegen`'s
//! own external-name interning makes.

use std::sync::Mutex;

static POOL: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

/// Return the canonical `'static` handle for `s`, leaking a fresh
/// allocation the first time this exact string is seen.
pub fn intern(s: &str) -> &'static str {
    let mut pool = POOL.lock().unwrap();
    if let Some(existing) = pool.iter().find(|p| **p == s) {
        return existing;
    }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    pool.push(leaked);
    leaked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_interning_returns_the_same_text() {
        let a = intern("System.Math");
        let b = intern("System.Math");
        assert_eq!(a, b);
    }
}
