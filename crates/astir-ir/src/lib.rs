//! The produced IR data model: typeentries, bigints, constant values,
//! opcodes, debug entries, the flow-control tree, the module container, and
//! the crate's error type. No translation logic lives here -- this crate is
//! the typed output contract `astir-translate` builds.

pub mod bigint;
pub mod constval;
pub mod debug;
pub mod error;
pub mod flow;
pub mod id;
pub mod module;
pub mod opcode;
pub mod typeentry;

pub use bigint::Bigint;
pub use constval::{AddressBase, ConstInitializer, ConstValue, NodeRef, ScopeRef, StringLiteralKind};
pub use debug::{DebugAttribute, DebugEntry, DebugEntryKind, DebugInfo, SourcePosition};
pub use error::{Result, TranslateError};
pub use flow::{FlowControlEntry, FlowControlNode, FlowControlTree, PatchList, VlaElement};
pub use id::{
    DebugEntryId, FlowControlId, FunctionIndex, InlineAsmId, InstructionIndex, StringLiteralId,
    SymbolId, TypeEntryId,
};
pub use module::{
    AsmIoKind, AsmLocationClass, AsmParameter, CommonProps, IdentifierKind, InlineAsmDescriptor,
    IrFunction, IrIdentifier, IrModule, IrScope, NamedData, StorageKind, SymbolTable, Visibility,
};
pub use opcode::{
    ArithKind, BoolOp, CompareKind, IntWidth, IrInstruction, LoadFlags, Opcode, Operand,
    Signedness, PLACEHOLDER_INDEX,
};
pub use typeentry::{Builtin, TypeEntry, Typecode};
