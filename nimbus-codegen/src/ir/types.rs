//! The canonical type system (`spec.md` §3, §4.1).
//!
//! Types are hash-consed: two structurally identical `TypeKind`s always
//! resolve to the same `TypeRef`, so type equality anywhere else in the
//! compiler is just `TypeRef` equality. This mirrors the numeric `Type`
//! values `cranelift-codegen::ir::types` hands out, generalized from a
//! fixed lane-type enum to the spec's open `Structure`/`View`/`Function`
//! shapes.

use crate::result::{CodegenResult, CompileError};
use nimbus_entity::{entity_impl, PrimaryMap};
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// A canonical handle to an interned [`TypeKind`]. Reference equality of
/// `TypeRef`s *is* type equality, per the invariant in `spec.md` §3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(u32);
entity_impl!(TypeRef, "t");

/// A disjoint device memory region. Pointer and view types carry the
/// space as part of their identity, so `Pointer{Global}` and
/// `Pointer{Shared}` never intern to the same `TypeRef`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum AddressSpace {
    Generic,
    Global,
    Shared,
    Local,
    Constant,
}

impl AddressSpace {
    const ALL: [AddressSpace; 5] = [
        AddressSpace::Generic,
        AddressSpace::Global,
        AddressSpace::Shared,
        AddressSpace::Local,
        AddressSpace::Constant,
    ];

    fn index(self) -> usize {
        AddressSpace::ALL.iter().position(|s| *s == self).unwrap()
    }
}

/// The structural description of a type. Two equal `TypeKind`s always
/// intern to the same `TypeRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    Pointer { element: TypeRef, space: AddressSpace },
    View { element: TypeRef, space: AddressSpace },
    Structure { fields: Vec<TypeRef> },
    Function { ret: TypeRef, params: Vec<TypeRef> },
    Handle,
}

/// Backend-supplied pointer widths per address space (`spec.md` §4.1:
/// "pointer size per address space is backend-driven"). The PTX backend
/// constructs this with 64-bit pointers everywhere except `.local`
/// addressing on pre-Volta targets, where 32-bit offsets are legal.
#[derive(Debug, Clone, Copy)]
pub struct DataLayout {
    pointer_bits: [u8; 5],
}

impl DataLayout {
    /// 64-bit pointers in every address space — the common case for
    /// sm_70 and later.
    pub fn lp64() -> Self {
        Self {
            pointer_bits: [64; 5],
        }
    }

    /// Build a layout with an explicit width per space.
    pub fn with_widths(generic: u8, global: u8, shared: u8, local: u8, constant: u8) -> Self {
        Self {
            pointer_bits: [generic, global, shared, local, constant],
        }
    }

    pub fn pointer_bits(&self, space: AddressSpace) -> u8 {
        self.pointer_bits[space.index()]
    }
}

/// The type interning context. Shared across compilation workers behind
/// a reader-writer lock (`spec.md` §5): many concurrent lookups, an
/// exclusive writer only on first insertion of a novel `TypeKind`.
pub struct TypeSystem {
    inner: RwLock<Inner>,
    layout: DataLayout,
}

struct Inner {
    arena: PrimaryMap<TypeRef, TypeKind>,
    table: FxHashMap<TypeKind, TypeRef>,
}

impl TypeSystem {
    pub fn new(layout: DataLayout) -> Self {
        Self {
            inner: RwLock::new(Inner {
                arena: PrimaryMap::new(),
                table: FxHashMap::default(),
            }),
            layout,
        }
    }

    /// Intern `kind`, returning the canonical handle. A second call with
    /// an equal `kind` returns the same `TypeRef`.
    pub fn intern(&self, kind: TypeKind) -> TypeRef {
        if let Some(existing) = self.inner.read().unwrap().table.get(&kind) {
            return *existing;
        }
        let mut inner = self.inner.write().unwrap();
        // Re-check: another writer may have interned `kind` between the
        // read-lock release above and taking the write lock.
        if let Some(existing) = inner.table.get(&kind) {
            return *existing;
        }
        let r = inner.arena.push(kind.clone());
        inner.table.insert(kind, r);
        r
    }

    /// Recover the structural description of a previously interned type.
    pub fn kind(&self, t: TypeRef) -> TypeKind {
        self.inner.read().unwrap().arena[t].clone()
    }

    pub fn void(&self) -> TypeRef {
        self.intern(TypeKind::Void)
    }

    pub fn bool_(&self) -> TypeRef {
        self.intern(TypeKind::Bool)
    }

    pub fn int(&self, bits: u8, signed: bool) -> TypeRef {
        self.intern(TypeKind::Int { bits, signed })
    }

    pub fn float(&self, bits: u8) -> TypeRef {
        self.intern(TypeKind::Float { bits })
    }

    pub fn handle(&self) -> TypeRef {
        self.intern(TypeKind::Handle)
    }

    pub fn pointer_to(&self, element: TypeRef, space: AddressSpace) -> TypeRef {
        self.intern(TypeKind::Pointer { element, space })
    }

    pub fn view_of(&self, element: TypeRef, space: AddressSpace) -> TypeRef {
        self.intern(TypeKind::View { element, space })
    }

    pub fn structure_of(&self, fields: Vec<TypeRef>) -> TypeRef {
        self.intern(TypeKind::Structure { fields })
    }

    pub fn function_of(&self, ret: TypeRef, params: Vec<TypeRef>) -> TypeRef {
        self.intern(TypeKind::Function { ret, params })
    }

    /// Size in bytes. `Void` and `Function` have no size (`InvalidType`).
    pub fn size(&self, t: TypeRef) -> CodegenResult<u64> {
        match self.kind(t) {
            TypeKind::Void => Err(CompileError::InvalidType {
                reason: "Void has no size".into(),
            }),
            TypeKind::Function { .. } => Err(CompileError::InvalidType {
                reason: "Function types have no size".into(),
            }),
            TypeKind::Bool => Ok(1),
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } => Ok(u64::from(bits) / 8),
            TypeKind::Handle => Ok(8),
            TypeKind::Pointer { space, .. } => Ok(u64::from(self.layout.pointer_bits(space)) / 8),
            TypeKind::View { space, .. } => {
                // {pointer, length} pair.
                Ok(u64::from(self.layout.pointer_bits(space)) / 8 + 8)
            }
            TypeKind::Structure { fields } => {
                let mut offset = 0u64;
                let mut max_align = 1u64;
                for f in &fields {
                    let a = self.align(*f)?;
                    let s = self.size(*f)?;
                    offset = align_up(offset, a);
                    offset += s;
                    max_align = max_align.max(a);
                }
                Ok(align_up(offset, max_align))
            }
        }
    }

    /// Natural alignment in bytes. Same edge cases as [`TypeSystem::size`].
    pub fn align(&self, t: TypeRef) -> CodegenResult<u64> {
        match self.kind(t) {
            TypeKind::Void => Err(CompileError::InvalidType {
                reason: "Void has no alignment".into(),
            }),
            TypeKind::Function { .. } => Err(CompileError::InvalidType {
                reason: "Function types have no alignment".into(),
            }),
            TypeKind::Structure { fields } => {
                let mut max_align = 1u64;
                for f in &fields {
                    max_align = max_align.max(self.align(*f)?);
                }
                Ok(max_align)
            }
            // Every other variant is laid out with self-alignment equal
            // to its size (power-of-two scalar, pointer or view).
            _ => self.size(t),
        }
    }

    /// Byte offset of `fields[index]` within a `Structure` type, laid out
    /// with natural alignment.
    pub fn field_offset(&self, t: TypeRef, index: usize) -> CodegenResult<u64> {
        let fields = match self.kind(t) {
            TypeKind::Structure { fields } => fields,
            _ => {
                return Err(CompileError::InvalidType {
                    reason: "field_offset requires a Structure type".into(),
                })
            }
        };
        let mut offset = 0u64;
        for (i, f) in fields.iter().enumerate() {
            let a = self.align(*f)?;
            offset = align_up(offset, a);
            if i == index {
                return Ok(offset);
            }
            offset += self.size(*f)?;
        }
        Err(CompileError::InvalidType {
            reason: format!("structure has no field at index {index}"),
        })
    }
}

fn align_up(offset: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_kinds_intern_to_the_same_ref() {
        let ts = TypeSystem::new(DataLayout::lp64());
        let a = ts.int(32, true);
        let b = ts.int(32, true);
        assert_eq!(a, b);
        let c = ts.int(32, false);
        assert_ne!(a, c);
    }

    #[test]
    fn round_trip_preserves_identity() {
        let ts = TypeSystem::new(DataLayout::lp64());
        let f32_ty = ts.float(32);
        let view = ts.view_of(f32_ty, AddressSpace::Global);
        let decomposed = ts.kind(view);
        let reinterned = ts.intern(decomposed);
        assert_eq!(view, reinterned);
    }

    #[test]
    fn pointer_and_view_size_follow_layout() {
        let ts = TypeSystem::new(DataLayout::lp64());
        let f32_ty = ts.float(32);
        let ptr = ts.pointer_to(f32_ty, AddressSpace::Global);
        assert_eq!(ts.size(ptr).unwrap(), 8);
        let view = ts.view_of(f32_ty, AddressSpace::Global);
        assert_eq!(ts.size(view).unwrap(), 16); // pointer + i64 length
    }

    #[test]
    fn struct_layout_respects_alignment() {
        let ts = TypeSystem::new(DataLayout::lp64());
        let i8_ty = ts.int(8, false);
        let i32_ty = ts.int(32, true);
        // { i8, i32 } should pad the i8 field to 4-byte alignment.
        let st = ts.structure_of(vec![i8_ty, i32_ty]);
        assert_eq!(ts.field_offset(st, 0).unwrap(), 0);
        assert_eq!(ts.field_offset(st, 1).unwrap(), 4);
        assert_eq!(ts.size(st).unwrap(), 8);
    }

    #[test]
    fn void_and_function_reject_size_queries() {
        let ts = TypeSystem::new(DataLayout::lp64());
        assert!(ts.size(ts.void()).is_err());
        let f = ts.function_of(ts.void(), vec![]);
        assert!(ts.size(f).is_err());
    }
}
