//! AST node shapes, grouped by the categories named in `spec.md` §6:
//! `Expression`, `Statement`, `Declaration`, `InitDeclarator`, `InlineAssembly`,
//! `Type`. Every node carries a `NodeProperties` block -- the annotations the
//! (external, unimplemented) semantic analyzer has already attached.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::types::AstTypeRef;

pub type NodeRef = Rc<AstNode>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Whether an expression designates an object (lvalue) or a transient value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionCategory {
    Lvalue,
    Rvalue,
}

/// Opaque link to a scope entry, resolved by the external semantic analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedId(pub u32);

/// Opaque link into the flow-control tree the semantic analyzer built while
/// walking statement structure; the translator keys its own per-function
/// flow-control tree off these same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowControlRef(pub u32);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BitfieldProps {
    pub offset: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpressionProps {
    pub constant_expression: bool,
    /// Pre-folded value supplied by the semantic analyzer, when it already
    /// determined the expression is constant. Absent does not imply
    /// non-constant -- the translator still asks the evaluator.
    pub constant_expression_value: Option<astir_ir::constval::ConstValue>,
    pub identifier: Option<String>,
    pub scoped_id: Option<ScopedId>,
    pub temporary_identifier: Option<String>,
    pub bitfield_props: Option<BitfieldProps>,
    pub flow_control_statement: Option<FlowControlRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementProps {
    pub flow_control_statement: Option<FlowControlRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeProps {
    pub resolved_type: Option<AstTypeRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeProperties {
    pub category: Option<ExpressionCategory>,
    pub ty: Option<AstTypeRef>,
    pub expression_props: Option<ExpressionProps>,
    pub statement_props: Option<StatementProps>,
    pub type_props: Option<TypeProps>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: AstNodeKind,
    pub properties: NodeProperties,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Negate,
    BitwiseNot,
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ShiftLeft,
    ShiftRight,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LogicalAnd,
    LogicalOr,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

/// A single `.member`/`->member`/`[index]` step in a designator chain, as
/// used by `offsetof` and by designated initializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Designator {
    Member(String),
    Index(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuiltinCall {
    Offsetof {
        type_name: AstTypeRef,
        designator: Vec<Designator>,
    },
    TypesCompatibleP {
        a: AstTypeRef,
        b: AstTypeRef,
    },
    ChooseExpr {
        condition: NodeRef,
        if_true: NodeRef,
        if_false: NodeRef,
    },
    ConstantP(NodeRef),
    ClassifyType(AstTypeRef),
    Inf(FloatKind),
    Nan(FloatKind, String),
    Ffs { operand: NodeRef, generic: bool },
    Clz { operand: NodeRef, generic: bool },
    Ctz { operand: NodeRef, generic: bool },
    Clrsb { operand: NodeRef, generic: bool },
    Popcount { operand: NodeRef, generic: bool },
    Parity { operand: NodeRef, generic: bool },
    Overflow { lhs: NodeRef, rhs: NodeRef, result: NodeRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstantLiteral {
    Int(i64),
    UInt(u64),
    Float(FloatKind, f64),
    Char(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringLiteralKind {
    Narrow,
    Wide,
    Utf8,
    Utf16,
    Utf32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericAssociation {
    /// `None` selects the `default` association.
    pub ty: Option<AstTypeRef>,
    pub value: NodeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpressionKind {
    Constant(ConstantLiteral),
    Identifier(String),
    StringLiteral {
        kind: StringLiteralKind,
        bytes: Vec<u8>,
    },
    StructMember {
        base: NodeRef,
        member: String,
        indirect: bool,
    },
    ArraySubscript {
        base: NodeRef,
        index: NodeRef,
    },
    CompoundLiteral {
        type_name: AstTypeRef,
        initializer: Initializer,
    },
    LabelAddress(String),
    GenericSelection {
        controlling: NodeRef,
        associations: Vec<GenericAssociation>,
    },
    Unary {
        op: UnaryOp,
        operand: NodeRef,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
    },
    Assignment {
        compound_op: Option<BinaryOp>,
        lhs: NodeRef,
        rhs: NodeRef,
    },
    Conditional {
        condition: NodeRef,
        /// `None` for the GNU `a ?: c` elision.
        then_branch: Option<NodeRef>,
        else_branch: NodeRef,
    },
    Cast {
        target_type: AstTypeRef,
        operand: NodeRef,
    },
    Builtin(BuiltinCall),
    Comma {
        lhs: NodeRef,
        rhs: NodeRef,
    },
    Call {
        callee: NodeRef,
        arguments: Vec<NodeRef>,
    },
    StatementExpression(Vec<BlockItem>),
    IncDec {
        op: IncDecOp,
        prefix: bool,
        operand: NodeRef,
    },
    Indirection(NodeRef),
    AddressOf(NodeRef),
    VaStart {
        va_list: NodeRef,
        last_named_param: String,
    },
    VaArg {
        va_list: NodeRef,
        arg_type: AstTypeRef,
    },
    VaEnd(NodeRef),
    VaCopy {
        dest: NodeRef,
        src: NodeRef,
    },
    Alloca {
        size: NodeRef,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Initializer {
    Expression(NodeRef),
    List(Vec<InitializerListEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializerListEntry {
    pub designation: Vec<Designator>,
    pub value: Box<Initializer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsmOperand {
    pub alias: Option<String>,
    pub constraint: String,
    pub operand: NodeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineAssemblyNode {
    pub template: String,
    pub outputs: Vec<AsmOperand>,
    pub inputs: Vec<AsmOperand>,
    pub clobbers: Vec<String>,
    pub jump_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    Compound(Vec<BlockItem>),
    Expression(Option<NodeRef>),
    If {
        condition: NodeRef,
        then_branch: Box<AstNode>,
        else_branch: Option<Box<AstNode>>,
    },
    Switch {
        discriminant: NodeRef,
        body: Box<AstNode>,
    },
    Case {
        value: NodeRef,
        body: Box<AstNode>,
    },
    Default(Box<AstNode>),
    While {
        condition: NodeRef,
        body: Box<AstNode>,
    },
    DoWhile {
        body: Box<AstNode>,
        condition: NodeRef,
    },
    For {
        init: Option<Box<BlockItem>>,
        condition: Option<NodeRef>,
        step: Option<NodeRef>,
        body: Box<AstNode>,
    },
    Goto(String),
    IndirectGoto(NodeRef),
    Break,
    Continue,
    Return(Option<NodeRef>),
    Labeled {
        label: String,
        body: Box<AstNode>,
    },
    InlineAsm(InlineAssemblyNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    None,
    Extern,
    Static,
    ThreadLocal,
    ExternThreadLocal,
    StaticThreadLocal,
    Typedef,
    Auto,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityAttr {
    Default,
    Hidden,
    Internal,
    Protected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclaratorAttributes {
    pub asm_label: Option<String>,
    pub alias_target: Option<String>,
    pub weak: bool,
    pub common: bool,
    pub visibility: Option<VisibilityAttr>,
    pub gnu_inline: bool,
    pub extern_inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub identifier: String,
    pub ty: AstTypeRef,
    pub storage_class: StorageClass,
    pub attributes: DeclaratorAttributes,
    pub initializer: Option<Initializer>,
    pub is_definition: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitDeclaratorNode {
    pub declaration: Declaration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockItem {
    Statement(AstNode),
    Declaration(Declaration),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AstNodeKind {
    Expression(ExpressionKind),
    Statement(StatementKind),
    Declaration(Declaration),
    InitDeclarator(InitDeclaratorNode),
    InlineAssembly(InlineAssemblyNode),
    Type(AstTypeRef),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AstType;

    fn leaf(kind: ExpressionKind) -> NodeRef {
        Rc::new(AstNode {
            kind: AstNodeKind::Expression(kind),
            properties: NodeProperties::default(),
            location: SourceLocation::default(),
        })
    }

    #[test]
    fn binary_add_shape() {
        let a = leaf(ExpressionKind::Constant(ConstantLiteral::Int(1)));
        let b = leaf(ExpressionKind::Constant(ConstantLiteral::Int(2)));
        let add = ExpressionKind::Binary {
            op: BinaryOp::Add,
            lhs: a,
            rhs: b,
        };
        let node = leaf(add);
        match &node.kind {
            AstNodeKind::Expression(ExpressionKind::Binary { op, .. }) => {
                assert_eq!(*op, BinaryOp::Add)
            }
            _ => panic!("expected binary expression"),
        }
    }

    #[test]
    fn type_node_wraps_ast_type() {
        let node = AstNode {
            kind: AstNodeKind::Type(Rc::new(AstType::Void)),
            properties: NodeProperties::default(),
            location: SourceLocation { line: 4, column: 1 },
        };
        assert!(matches!(node.kind, AstNodeKind::Type(_)));
    }

    #[test]
    fn serde_roundtrip_designator_chain() {
        let chain = vec![Designator::Member("a".into()), Designator::Index(3)];
        let json = serde_json::to_string(&chain).unwrap();
        let back: Vec<Designator> = serde_json::from_str(&json).unwrap();
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }
}
