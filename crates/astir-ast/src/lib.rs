//! The consumed AST contract: types, nodes, and scope entries as produced by
//! an external, already-run semantic analyzer. This crate holds no
//! translation logic -- it is the typed boundary `astir-translate` matches
//! against.

pub mod node;
pub mod scope;
pub mod types;

pub use node::{
    AsmOperand, AstNode, AstNodeKind, BinaryOp, BitfieldProps, BlockItem, BuiltinCall,
    ConstantLiteral, Declaration, DeclaratorAttributes, Designator, ExpressionCategory,
    ExpressionKind, ExpressionProps, FlowControlRef, FloatKind, GenericAssociation, IncDecOp,
    InitDeclaratorNode, Initializer, InitializerListEntry, InlineAssemblyNode, NodeProperties,
    NodeRef, ScopedId, SourceLocation, StatementKind, StatementProps, StorageClass,
    StringLiteralKind, TypeProps, UnaryOp, VisibilityAttr,
};
pub use scope::{GlobalScopePass, Linkage, ScopedIdentifier};
pub use types::{
    ArrayBoundary, AstType, AstTypeRef, EnumType, Field, FunctionMode, FunctionType, Qualifiers,
    RecordType, VlaSize,
};
