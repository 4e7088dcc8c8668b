//! `IrModule`, the produced artifact (`spec.md` §3, §6).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constval::ConstValue;
use crate::debug::DebugInfo;
use crate::id::{DebugEntryId, FunctionIndex, InlineAsmId, StringLiteralId, SymbolId, TypeEntryId};
use crate::opcode::IrInstruction;
use crate::typeentry::TypeEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierKind {
    GlobalData,
    ThreadLocalData,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrScope {
    Local,
    Import,
    Export,
    ExportWeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Default,
    Hidden,
    Internal,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonProps {
    pub size: u64,
    pub alignment: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrIdentifier {
    pub symbol: SymbolId,
    pub kind: IdentifierKind,
    pub scope: IrScope,
    pub visibility: Visibility,
    pub alias: Option<SymbolId>,
    pub common: bool,
    pub common_props: Option<CommonProps>,
    pub debug_entry: Option<DebugEntryId>,
}

impl IrIdentifier {
    pub fn new(symbol: SymbolId, kind: IdentifierKind, scope: IrScope) -> Self {
        IrIdentifier {
            symbol,
            kind,
            scope,
            visibility: Visibility::Default,
            alias: None,
            common: false,
            common_props: None,
            debug_entry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    pub declaration_id: FunctionIndex,
    pub body: Vec<IrInstruction>,
    /// Opaque handle into `astir-translate`'s per-function `TypeLayout`
    /// arena; this crate only stores the index, never the layout itself.
    pub local_type_layout_id: Option<u32>,
}

impl IrFunction {
    pub fn new(declaration_id: FunctionIndex) -> Self {
        IrFunction {
            declaration_id,
            body: Vec::new(),
            local_type_layout_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    GlobalStorage,
    GlobalReadOnlyStorage,
    ThreadLocalStorage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedData {
    pub storage: StorageKind,
    pub type_id: TypeEntryId,
    pub initializer_values: Vec<ConstValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsmIoKind {
    LoadStore,
    Store,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsmLocationClass {
    RegisterMemory,
    Register,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsmParameter {
    pub id: u32,
    pub alias: Option<String>,
    pub io_kind: AsmIoKind,
    pub location: AsmLocationClass,
    pub stack_slot: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineAsmDescriptor {
    pub template: String,
    pub outputs: Vec<AsmParameter>,
    pub inputs: Vec<AsmParameter>,
    pub clobbers: Vec<String>,
    pub jump_labels: Vec<String>,
}

/// Interning table for symbol names, addressed by `SymbolId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    names: Vec<String>,
    by_name: IndexMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn resolve(&self, id: SymbolId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrModule {
    pub types: Vec<TypeEntry>,
    pub functions: Vec<IrFunction>,
    pub identifiers: IndexMap<String, IrIdentifier>,
    pub named_data: IndexMap<String, NamedData>,
    pub string_literals: Vec<Vec<u8>>,
    pub inline_assemblies: Vec<InlineAsmDescriptor>,
    pub debug_info: DebugInfo,
    pub symbols: SymbolTable,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_type(&mut self, entry: TypeEntry) -> TypeEntryId {
        let id = TypeEntryId(self.types.len() as u32);
        self.types.push(entry);
        id
    }

    pub fn type_entry(&self, id: TypeEntryId) -> Option<&TypeEntry> {
        self.types.get(id.0 as usize)
    }

    pub fn push_function(&mut self, function: IrFunction) -> FunctionIndex {
        let id = FunctionIndex(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn push_string_literal(&mut self, bytes: Vec<u8>) -> StringLiteralId {
        let id = StringLiteralId(self.string_literals.len() as u32);
        self.string_literals.push(bytes);
        id
    }

    pub fn push_inline_asm(&mut self, descriptor: InlineAsmDescriptor) -> InlineAsmId {
        let id = InlineAsmId(self.inline_assemblies.len() as u32);
        self.inline_assemblies.push(descriptor);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeentry::Typecode;

    #[test]
    fn symbol_table_interns_idempotently() {
        let mut table = SymbolTable::default();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
        assert_eq!(table.resolve(a), Some("foo"));
    }

    #[test]
    fn push_type_and_function_assign_monotonic_ids() {
        let mut module = IrModule::new();
        let t = module.push_type(TypeEntry::new(Typecode::Int, 4, 0));
        assert_eq!(t.0, 0);
        let f = module.push_function(IrFunction::new(FunctionIndex(0)));
        assert_eq!(f.0, 0);
    }

    #[test]
    fn seed_scenario_one_single_exported_function() {
        // int sum(int a, int b) { return a + b; }
        let mut module = IrModule::new();
        let int_ty = module.push_type(TypeEntry::new(Typecode::Int, 4, 0));
        let symbol = module.symbols.intern("sum");
        let mut identifier = IrIdentifier::new(symbol, IdentifierKind::Function, IrScope::Export);
        identifier.visibility = Visibility::Default;
        module.identifiers.insert("sum".into(), identifier);
        let func_idx = module.push_function(IrFunction::new(FunctionIndex(0)));
        assert_eq!(module.functions[func_idx.0 as usize].body.len(), 0);
        assert_eq!(module.type_entry(int_ty).unwrap().typecode, Typecode::Int);
        assert_eq!(module.identifiers["sum"].scope, IrScope::Export);
    }

    #[test]
    fn serde_roundtrip_empty_module() {
        let module = IrModule::new();
        let json = serde_json::to_string(&module).unwrap();
        let back: IrModule = serde_json::from_str(&json).unwrap();
        assert_eq!(back.types.len(), 0);
    }
}
