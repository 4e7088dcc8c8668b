//! AST-to-IR translation: constant-expression evaluation, type and debug-info
//! construction, and scope/statement/expression lowering into the stack-
//! machine IR `astir-ir` defines. No AST or IR data model lives here -- this
//! crate is the translation logic sitting between the two.

pub mod config;
pub mod constexpr;
pub mod debugbuilder;
pub mod exprlower;
pub mod function;
pub mod inlineasm;
pub mod layout;
pub mod scopetranslate;
pub mod stmtlower;
pub mod target;
pub mod typetranslate;

pub use config::TranslationConfig;
pub use constexpr::{cast, compare, evaluate, EvalContext};
pub use debugbuilder::DebugEntryBuilder;
pub use exprlower::{lower_expression, ExprLowerCtx, LocalBinding, LocalScope};
pub use function::{translate_function, FunctionDefinition};
pub use layout::{BitfieldPlacementProps, StructMember, TypeLayout, TypeLayoutVariant};
pub use scopetranslate::translate_global_scope;
pub use stmtlower::{lower_block_items, lower_function_body, lower_statement, LabelTable};
pub use target::{
    bit_precise_layout, object_info_unsupported, BitFieldAllocator, BitFieldPlacement,
    BitFieldResult, DefaultTargetEnvironment, ObjectInfo, OracleResult, ScalarKind,
    TargetEnvironment,
};
pub use typetranslate::translate_object_type;
