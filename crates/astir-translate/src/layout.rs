//! `TypeLayout`, the parallel structural shadow of an `AstType` built by C4
//! (`spec.md` §3). Owned as a tree rooted at the type being translated;
//! released when that root falls out of scope. Traversal for designator
//! resolution (C6's "base slot" computation) walks top-down from the root,
//! so nodes do not carry an explicit parent back-pointer -- the caller
//! already holds the path it walked to get here.

use astir_ast::AstTypeRef;
use astir_ir::TypeEntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitfieldPlacementProps {
    pub offset: u32,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub struct StructMember {
    pub identifier: Option<String>,
    pub layout: Box<TypeLayout>,
    pub relative_offset: u64,
    pub bitfield: bool,
    pub bitfield_props: Option<BitfieldPlacementProps>,
}

#[derive(Debug, Clone)]
pub enum TypeLayoutVariant {
    Scalar,
    Array {
        element: Box<TypeLayout>,
    },
    Structure {
        members: Vec<StructMember>,
    },
    /// Runtime-allocated `(pointer, length)` pair representing a VLA.
    VlArray {
        array_ptr_field_index: u32,
        array_size_field_index: u32,
    },
}

#[derive(Debug, Clone)]
pub struct TypeLayout {
    pub ty: AstTypeRef,
    pub alignment: u32,
    pub size: u64,
    /// Index into the IR module's flat typeentry list for this node's root
    /// entry.
    pub value: TypeEntryId,
    pub variant: TypeLayoutVariant,
}

impl TypeLayout {
    pub fn scalar(ty: AstTypeRef, alignment: u32, size: u64, value: TypeEntryId) -> Self {
        TypeLayout {
            ty,
            alignment,
            size,
            value,
            variant: TypeLayoutVariant::Scalar,
        }
    }

    /// Resolves a designator path (member names / array indices) to a byte
    /// offset from this layout's root, matching `offsetof`'s walk and C6's
    /// "base slot" computation.
    pub fn resolve_member_offset(&self, member: &str) -> Option<u64> {
        match &self.variant {
            TypeLayoutVariant::Structure { members } => members
                .iter()
                .find(|m| m.identifier.as_deref() == Some(member))
                .map(|m| m.relative_offset),
            _ => None,
        }
    }

    pub fn element_layout(&self) -> Option<&TypeLayout> {
        match &self.variant {
            TypeLayoutVariant::Array { element } => Some(element),
            _ => None,
        }
    }

    pub fn is_vla(&self) -> bool {
        matches!(self.variant, TypeLayoutVariant::VlArray { .. })
    }
}
