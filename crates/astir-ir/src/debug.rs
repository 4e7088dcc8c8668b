//! DWARF-shaped debug-entry tree (`spec.md` §4.5, component C5).

use serde::{Deserialize, Serialize};

use crate::id::{DebugEntryId, SymbolId, TypeEntryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugEntryKind {
    TypeVoid,
    TypeBoolean,
    TypeSignedCharacter,
    TypeUnsignedCharacter,
    TypeSignedInt,
    TypeUnsignedInt,
    TypeSignedBitPrecise,
    TypeUnsignedBitPrecise,
    TypeFloat,
    TypeComplexFloat,
    TypePointer,
    TypeArray,
    TypeStructure,
    TypeUnion,
    TypeEnumeration,
    TypeFunction,
    TypeConst,
    TypeVolatile,
    TypeRestrict,
    TypeAtomic,

    StructureMember,
    ArraySubrange,
    Enumerator,
    FunctionParameter,
    FunctionVararg,
    Variable,
    LexicalBlock,
}

impl DebugEntryKind {
    pub fn is_type(self) -> bool {
        !matches!(
            self,
            DebugEntryKind::StructureMember
                | DebugEntryKind::ArraySubrange
                | DebugEntryKind::Enumerator
                | DebugEntryKind::FunctionParameter
                | DebugEntryKind::FunctionVararg
                | DebugEntryKind::Variable
                | DebugEntryKind::LexicalBlock
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugAttribute {
    Name(String),
    Size(u64),
    Alignment(u32),
    BitSize(u64),
    Bitwidth(u32),
    Bitoffset(u32),
    Offset(u64),
    TypeRef(DebugEntryId),
    Length(u64),
    ConstantUint(u64),
    CodeBegin(u32),
    CodeEnd(u32),
    GlobalVariable(SymbolId),
    ThreadLocalVariable(SymbolId),
    LocalVariable {
        composite_id: u32,
        type_ref: TypeEntryId,
        local_offset: i64,
    },
    External(bool),
    Declaration(bool),
    SourceLocation { file: String, position: SourcePosition },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub id: DebugEntryId,
    pub kind: DebugEntryKind,
    pub attributes: Vec<DebugAttribute>,
    pub children: Vec<DebugEntryId>,
}

impl DebugEntry {
    pub fn new(id: DebugEntryId, kind: DebugEntryKind) -> Self {
        DebugEntry {
            id,
            kind,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn push_attribute(&mut self, attribute: DebugAttribute) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    pub fn push_child(&mut self, child: DebugEntryId) -> &mut Self {
        self.children.push(child);
        self
    }
}

/// The arena of debug entries, addressed by `DebugEntryId`. Hash-consing of
/// unqualified AST types lives in `astir-translate` (it needs `AstType`
/// identity, which this crate does not depend on); this arena only stores
/// the resulting tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    entries: Vec<DebugEntry>,
}

impl DebugInfo {
    pub fn push(&mut self, kind: DebugEntryKind) -> DebugEntryId {
        let id = DebugEntryId(self.entries.len() as u32);
        self.entries.push(DebugEntry::new(id, kind));
        id
    }

    pub fn get(&self, id: DebugEntryId) -> Option<&DebugEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: DebugEntryId) -> Option<&mut DebugEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_monotonic_ids() {
        let mut info = DebugInfo::default();
        let a = info.push(DebugEntryKind::TypeVoid);
        let b = info.push(DebugEntryKind::TypeBoolean);
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
    }

    #[test]
    fn structure_member_is_not_a_type_kind() {
        assert!(!DebugEntryKind::StructureMember.is_type());
        assert!(DebugEntryKind::TypeStructure.is_type());
    }

    #[test]
    fn entry_accumulates_attributes_and_children() {
        let mut info = DebugInfo::default();
        let child = info.push(DebugEntryKind::TypeSignedInt);
        let parent = info.push(DebugEntryKind::TypeStructure);
        {
            let entry = info.get_mut(parent).unwrap();
            entry.push_attribute(DebugAttribute::Name("S".into()));
            entry.push_child(child);
        }
        let entry = info.get(parent).unwrap();
        assert_eq!(entry.children, vec![child]);
        assert_eq!(entry.attributes.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let mut info = DebugInfo::default();
        info.push(DebugEntryKind::TypeVoid);
        let json = serde_json::to_string(&info).unwrap();
        let back: DebugInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
    }
}
