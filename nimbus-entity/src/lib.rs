//! Densely numbered entity references.
//!
//! This crate gives every arena-allocated object in the compiler (SSA
//! values, basic blocks, methods, PTX virtual registers) a small `Copy`
//! handle that indexes into a `PrimaryMap`/`SecondaryMap` rather than a
//! pointer. Cross-references inside a `Method` are always one of these
//! handles, never a raw reference, which is what makes cloning a method
//! for inlining and freezing it before optimization cheap and safe.

mod keys;
mod list;
mod map;
mod packed_option;
mod primary_map;

pub use keys::Keys;
pub use list::{EntityList, ListPool};
pub use map::SecondaryMap;
pub use packed_option::{PackedOption, ReservedValue};
pub use primary_map::PrimaryMap;

/// A type that can be used as a key in a dense entity map.
///
/// Implementors are required to be a thin, `Copy` wrapper around a `u32`
/// index with no gaps below `self.index()`. The `entity_impl!` macro
/// generates a conforming implementation along with `Debug`/`Display`.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a linear index.
    fn new(index: usize) -> Self;

    /// Get the index of this reference.
    fn index(self) -> usize;
}

/// Generate an `EntityRef` implementation, plus `Debug`/`Display`, for a
/// newtype struct wrapping a `u32`.
///
/// ```ignore
/// pub struct Value(u32);
/// entity_impl!(Value, "v");
/// ```
#[macro_export]
macro_rules! entity_impl {
    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $entity(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $crate::ReservedValue for $entity {
            #[inline]
            fn reserved_value() -> Self {
                $entity(u32::MAX)
            }

            #[inline]
            fn is_reserved_value(&self) -> bool {
                self.0 == u32::MAX
            }
        }

        impl ::core::fmt::Debug for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                write!(f, "{}{}", stringify!($entity), self.0)
            }
        }
    };

    ($entity:ident, $display_prefix:expr) => {
        $crate::entity_impl!($entity);

        impl ::core::fmt::Display for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq)]
    struct E(u32);
    entity_impl!(E, "e");

    #[test]
    fn round_trips() {
        let e = E::new(12);
        assert_eq!(e.index(), 12);
        assert_eq!(format!("{}", e), "e12");
    }

    #[test]
    fn reserved_value_is_distinct() {
        let e = E::new(3);
        assert!(!e.is_reserved_value());
        assert!(E::reserved_value().is_reserved_value());
    }
}
