//! Constant-expression evaluator (`spec.md` §4.3, component C3).
//!
//! `evaluate` walks an already-analyzed expression tree and folds it to a
//! `ConstValue`, or reports `NotConstant` for any subtree the grammar
//! excludes. It trusts two things the semantic analyzer already did: usual
//! arithmetic conversions are explicit `Cast` nodes in the tree (no implicit
//! promotion happens here), and every node it is asked to fold carries a
//! resolved `ty`. Arithmetic always runs through `Bigint` at the operand's
//! actual bit width, so the same wrap semantics apply whether the width is
//! 32 bits or a `_BitInt(200)`.

use std::cmp::Ordering;
use std::rc::Rc;

use astir_ast::{
    ArrayBoundary, AstNode, AstNodeKind, AstType, AstTypeRef, BinaryOp, BuiltinCall,
    ConstantLiteral, Designator, ExpressionKind, UnaryOp,
};
use astir_ir::bigint::Bigint;
use astir_ir::constval::{AddressBase, ConstValue};
use astir_ir::error::{Result, SourceLocation, TranslateError};

use crate::config::TranslationConfig;
use crate::target::{BitFieldAllocator, BitFieldResult, ScalarKind, TargetEnvironment};
use crate::typetranslate::{alignment_hint, round_up, scalar_kind_for};

pub struct EvalContext<'a> {
    pub target: &'a dyn TargetEnvironment,
    pub config: &'a TranslationConfig,
}

fn loc(node: &AstNode) -> SourceLocation {
    SourceLocation {
        line: node.location.line,
        column: node.location.column,
    }
}

fn not_constant(node: &AstNode) -> TranslateError {
    TranslateError::NotConstant { location: loc(node) }
}

/// Entry point. Returns the analyzer's pre-folded value when one is already
/// attached -- its absence never implies the node isn't constant, only that
/// nobody has asked yet.
pub fn evaluate(node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    if let Some(value) = node
        .properties
        .expression_props
        .as_ref()
        .and_then(|props| props.constant_expression_value.as_ref())
    {
        return Ok(value.clone());
    }
    match &node.kind {
        AstNodeKind::Expression(expr) => evaluate_expression(expr, node, ctx),
        _ => Err(not_constant(node)),
    }
}

fn evaluate_expression(expr: &ExpressionKind, node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    match expr {
        ExpressionKind::Constant(lit) => Ok(fold_literal(lit, node, ctx)),
        ExpressionKind::StringLiteral { kind, bytes } => Ok(ConstValue::Address {
            base: AddressBase::StringLiteral {
                kind: string_kind(*kind),
                bytes: bytes.clone(),
                length: bytes.len(),
            },
            offset: 0,
            pointer_node_ref: None,
            scoped_id: None,
        }),
        ExpressionKind::Unary { op, operand } => evaluate_unary(*op, operand, node, ctx),
        ExpressionKind::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, node, ctx),
        ExpressionKind::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let cond = evaluate(condition, ctx)?;
            let truthy = cond.to_boolean().ok_or_else(|| not_constant(node))?;
            match then_branch {
                Some(then_node) => {
                    if truthy {
                        evaluate(then_node, ctx)
                    } else {
                        evaluate(else_branch, ctx)
                    }
                }
                // GNU `a ?: c`: the condition's own value doubles as the true branch.
                None => {
                    if truthy {
                        Ok(cond)
                    } else {
                        evaluate(else_branch, ctx)
                    }
                }
            }
        }
        ExpressionKind::Cast { target_type, operand } => {
            let value = evaluate(operand, ctx)?;
            cast(&value, operand.properties.ty.as_deref(), target_type, node.location.into(), ctx)
        }
        ExpressionKind::Builtin(builtin) => evaluate_builtin(builtin, node, ctx),
        ExpressionKind::AddressOf(operand) => evaluate_address(operand, ctx),
        // Every other operator is outside the constant-expression grammar:
        // reads of an object (Identifier/StructMember/ArraySubscript/bare
        // Indirection -- `&*p` is handled above, before the load happens),
        // side effects (Assignment/IncDec), sequencing (Comma), calls and
        // statement expressions, `va_*`/`alloca`, the two node kinds
        // (CompoundLiteral, GenericSelection) whose constant folding would
        // need a live IR module rather than this pure tree walk, and
        // `&&label`, which lowers through its own indirect-jump sequence in
        // `exprlower`/`stmtlower` rather than through this fold -- the
        // symbol it resolves to is declared with a per-function mangled
        // name that this tree walk has no function context to reproduce.
        ExpressionKind::Identifier(_)
        | ExpressionKind::StructMember { .. }
        | ExpressionKind::ArraySubscript { .. }
        | ExpressionKind::CompoundLiteral { .. }
        | ExpressionKind::GenericSelection { .. }
        | ExpressionKind::Assignment { .. }
        | ExpressionKind::Comma { .. }
        | ExpressionKind::Call { .. }
        | ExpressionKind::StatementExpression(_)
        | ExpressionKind::IncDec { .. }
        | ExpressionKind::Indirection(_)
        | ExpressionKind::VaStart { .. }
        | ExpressionKind::VaArg { .. }
        | ExpressionKind::VaEnd(_)
        | ExpressionKind::VaCopy { .. }
        | ExpressionKind::Alloca { .. }
        | ExpressionKind::LabelAddress(_) => Err(not_constant(node)),
    }
}

impl From<astir_ast::SourceLocation> for SourceLocation {
    fn from(value: astir_ast::SourceLocation) -> Self {
        SourceLocation {
            line: value.line,
            column: value.column,
        }
    }
}

fn string_kind(kind: astir_ast::StringLiteralKind) -> astir_ir::constval::StringLiteralKind {
    use astir_ast::StringLiteralKind as A;
    use astir_ir::constval::StringLiteralKind as I;
    match kind {
        A::Narrow => I::Narrow,
        A::Wide => I::Wide,
        A::Utf8 => I::Utf8,
        A::Utf16 => I::Utf16,
        A::Utf32 => I::Utf32,
    }
}

/// Bit width and signedness this value's own resolved type carries.
pub(crate) fn int_shape(ty: &AstType, ctx: &EvalContext) -> (u32, bool) {
    match ty {
        AstType::Bool => (ctx.target.scalar_layout(ScalarKind::Bool).0 as u32 * 8, false),
        AstType::SignedChar => (8, true),
        AstType::UnsignedChar => (8, false),
        AstType::Char => (8, ctx.config.char_is_signed),
        AstType::Short { signed } => (ctx.target.scalar_layout(ScalarKind::Short).0 as u32 * 8, *signed),
        AstType::Int { signed } => (ctx.target.scalar_layout(ScalarKind::Int).0 as u32 * 8, *signed),
        AstType::Long { signed } => (ctx.target.scalar_layout(ScalarKind::Long).0 as u32 * 8, *signed),
        AstType::LongLong { signed } => (ctx.target.scalar_layout(ScalarKind::LongLong).0 as u32 * 8, *signed),
        AstType::BitPrecise { signed, width } => (*width, *signed),
        AstType::Enumeration(enum_ty) => int_shape(&enum_ty.underlying, ctx),
        AstType::Pointer(_) | AstType::NullPointer => (ctx.target.scalar_layout(ScalarKind::Pointer).0 as u32 * 8, false),
        AstType::Qualified { ty, .. } => int_shape(ty, ctx),
        _ => (ctx.target.scalar_layout(ScalarKind::Int).0 as u32 * 8, true),
    }
}

fn node_int_shape(node: &AstNode, ctx: &EvalContext) -> (u32, bool) {
    match node.properties.ty.as_deref() {
        Some(ty) => int_shape(ty, ctx),
        None => (ctx.target.scalar_layout(ScalarKind::Int).0 as u32 * 8, true),
    }
}

fn fold_literal(lit: &ConstantLiteral, node: &AstNode, ctx: &EvalContext) -> ConstValue {
    match lit {
        ConstantLiteral::Int(v) => wrap_from_shape(node_int_shape(node, ctx), *v as i128),
        ConstantLiteral::UInt(v) => wrap_from_shape(node_int_shape(node, ctx), *v as i128),
        ConstantLiteral::Char(v) => wrap_from_shape(node_int_shape(node, ctx), *v as i128),
        ConstantLiteral::Float(_kind, v) => ConstValue::Float(*v),
    }
}

fn wrap_from_shape((bits, signed): (u32, bool), value: i128) -> ConstValue {
    if bits == 0 {
        return ConstValue::integer(0, 0);
    }
    if bits > 64 {
        let base = Bigint::from_i64(64, signed, value as i64);
        let widened = if signed { base.resize_cast_signed(bits) } else { base.resize_cast_unsigned(bits) };
        return ConstValue::bitprecise(widened);
    }
    let mask: u128 = if bits >= 128 { u128::MAX } else { (1u128 << bits) - 1 };
    let bits_value = (value as u128) & mask;
    let unsigned = bits_value as u64;
    let signed_value = if signed && bits_value & (1u128 << (bits - 1)) != 0 {
        (bits_value as i128 - (1i128 << bits)) as i64
    } else {
        unsigned as i64
    };
    ConstValue::integer(signed_value, unsigned)
}

/// Reinterprets a previously-folded integer at a new width/signedness,
/// matching the conversion the analyzer's inserted `Cast` node describes.
fn to_bigint(value: &ConstValue, bits: u32, signed: bool) -> Result<Bigint> {
    match value {
        ConstValue::Integer { signed: s, bitprecise, .. } => {
            let base = match bitprecise {
                Some(b) => b.clone(),
                None => Bigint::from_i64(64, signed, *s),
            };
            Ok(if signed { base.resize_cast_signed(bits) } else { base.resize_cast_unsigned(bits) })
        }
        _ => Err(TranslateError::invalid_state("expected an integer constant")),
    }
}

fn from_bigint(big: Bigint) -> ConstValue {
    if big.width > 64 {
        ConstValue::bitprecise(big)
    } else {
        ConstValue::integer(big.get_signed(), big.get_unsigned())
    }
}

fn evaluate_unary(op: UnaryOp, operand: &AstNode, node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    let value = evaluate(operand, ctx)?;
    match op {
        UnaryOp::Plus => Ok(value),
        UnaryOp::LogicalNot => {
            let truthy = value.to_boolean().ok_or_else(|| not_constant(node))?;
            Ok(ConstValue::integer((!truthy) as i64, (!truthy) as u64))
        }
        UnaryOp::Negate => match &value {
            ConstValue::Float(f) => Ok(ConstValue::Float(-f)),
            ConstValue::ComplexFloat { re, im } => Ok(ConstValue::ComplexFloat { re: -re, im: -im }),
            ConstValue::Integer { .. } => {
                let (bits, signed) = node_int_shape(node, ctx);
                let mut big = to_bigint(&value, bits, signed)?;
                big.negate();
                Ok(from_bigint(big))
            }
            _ => Err(not_constant(node)),
        },
        UnaryOp::BitwiseNot => match &value {
            ConstValue::Integer { .. } => {
                let (bits, signed) = node_int_shape(node, ctx);
                let mut big = to_bigint(&value, bits, signed)?;
                big.invert();
                Ok(from_bigint(big))
            }
            _ => Err(not_constant(node)),
        },
    }
}

fn is_ptr(ty: Option<&AstType>) -> bool {
    ty.map(|t| match t {
        AstType::Qualified { ty, .. } => ty.is_pointer(),
        other => other.is_pointer(),
    })
    .unwrap_or(false)
}

fn is_float_ish(ty: Option<&AstType>) -> bool {
    ty.map(|t| match t {
        AstType::Qualified { ty, .. } => ty.is_floating(),
        other => other.is_floating(),
    })
    .unwrap_or(false)
}

fn pointee(ty: Option<&AstTypeRef>) -> Option<AstTypeRef> {
    match ty?.unqualified().as_ref() {
        AstType::Pointer(inner) => Some(Rc::clone(inner)),
        _ => None,
    }
}

pub(crate) fn element_of(ty: Option<&AstTypeRef>) -> Option<AstTypeRef> {
    match ty?.unqualified().as_ref() {
        AstType::Array { element, .. } => Some(Rc::clone(element)),
        _ => None,
    }
}

fn is_incomplete(ty: &AstTypeRef) -> bool {
    match ty.unqualified().as_ref() {
        AstType::Void | AstType::Function(_) => true,
        AstType::Structure(record) | AstType::Union(record) => !record.complete,
        AstType::Array { boundary: ArrayBoundary::Unbounded, .. } => true,
        _ => false,
    }
}

fn evaluate_binary(op: BinaryOp, lhs_node: &AstNode, rhs_node: &AstNode, node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    match op {
        BinaryOp::LogicalAnd => {
            let lhs = evaluate(lhs_node, ctx)?;
            if !lhs.to_boolean().ok_or_else(|| not_constant(node))? {
                return Ok(ConstValue::integer(0, 0));
            }
            let rhs = evaluate(rhs_node, ctx)?;
            let truthy = rhs.to_boolean().ok_or_else(|| not_constant(node))?;
            Ok(ConstValue::integer(truthy as i64, truthy as u64))
        }
        BinaryOp::LogicalOr => {
            let lhs = evaluate(lhs_node, ctx)?;
            if lhs.to_boolean().ok_or_else(|| not_constant(node))? {
                return Ok(ConstValue::integer(1, 1));
            }
            let rhs = evaluate(rhs_node, ctx)?;
            let truthy = rhs.to_boolean().ok_or_else(|| not_constant(node))?;
            Ok(ConstValue::integer(truthy as i64, truthy as u64))
        }
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual | BinaryOp::Equal | BinaryOp::NotEqual => {
            evaluate_comparison(op, lhs_node, rhs_node, ctx)
        }
        _ => {
            if is_ptr(lhs_node.properties.ty.as_deref()) || is_ptr(rhs_node.properties.ty.as_deref()) {
                return evaluate_pointer_arith(op, lhs_node, rhs_node, ctx);
            }
            if is_float_ish(node.properties.ty.as_deref()) {
                return evaluate_float_binary(op, lhs_node, rhs_node, node, ctx);
            }
            let lhs = evaluate(lhs_node, ctx)?;
            let rhs = evaluate(rhs_node, ctx)?;
            let (bits, signed) = node_int_shape(node, ctx);
            let a = to_bigint(&lhs, bits, signed)?;
            let b = to_bigint(&rhs, bits, signed)?;
            eval_bigint_binary(op, &a, &b, signed, node)
        }
    }
}

fn eval_bigint_binary(op: BinaryOp, a: &Bigint, b: &Bigint, signed: bool, node: &AstNode) -> Result<ConstValue> {
    let result = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Subtract => a.wrapping_sub(b),
        BinaryOp::Multiply => a.wrapping_mul(b),
        BinaryOp::Divide => {
            if b.is_zero() {
                return Err(TranslateError::invalid_parameter("division by zero in constant expression"));
            }
            if signed { a.signed_div_rem(b).0 } else { a.unsigned_div_rem(b).0 }
        }
        BinaryOp::Modulo => {
            if b.is_zero() {
                return Err(TranslateError::invalid_parameter("modulo by zero in constant expression"));
            }
            if signed { a.signed_div_rem(b).1 } else { a.unsigned_div_rem(b).1 }
        }
        BinaryOp::ShiftLeft => a.shift_left_wrapping(b.get_unsigned() as u32),
        BinaryOp::ShiftRight => a.shift_right(b.get_unsigned() as u32, signed),
        BinaryOp::BitwiseAnd => a.bitand(b),
        BinaryOp::BitwiseOr => a.bitor(b),
        BinaryOp::BitwiseXor => a.bitxor(b),
        _ => return Err(not_constant(node)),
    };
    Ok(from_bigint(result))
}

fn as_float(value: &ConstValue) -> f64 {
    match value {
        ConstValue::Float(f) => *f,
        ConstValue::Integer { signed, unsigned, bitprecise } => match bitprecise {
            Some(b) if b.signed => b.signed_to_long_double(),
            Some(b) => b.unsigned_to_long_double(),
            None => {
                let _ = unsigned;
                *signed as f64
            }
        },
        ConstValue::ComplexFloat { re, .. } => *re,
        _ => 0.0,
    }
}

fn as_complex(value: &ConstValue) -> (f64, f64) {
    match value {
        ConstValue::ComplexFloat { re, im } => (*re, *im),
        other => (as_float(other), 0.0),
    }
}

fn evaluate_float_binary(op: BinaryOp, lhs_node: &AstNode, rhs_node: &AstNode, node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    let lhs = evaluate(lhs_node, ctx)?;
    let rhs = evaluate(rhs_node, ctx)?;
    let complex = matches!(lhs, ConstValue::ComplexFloat { .. }) || matches!(rhs, ConstValue::ComplexFloat { .. });
    if complex {
        let (ar, ai) = as_complex(&lhs);
        let (br, bi) = as_complex(&rhs);
        let (re, im) = match op {
            BinaryOp::Add => (ar + br, ai + bi),
            BinaryOp::Subtract => (ar - br, ai - bi),
            BinaryOp::Multiply => (ar * br - ai * bi, ar * bi + ai * br),
            BinaryOp::Divide => {
                let denom = br * br + bi * bi;
                if denom == 0.0 {
                    return Err(TranslateError::invalid_parameter("complex division by zero"));
                }
                ((ar * br + ai * bi) / denom, (ai * br - ar * bi) / denom)
            }
            _ => return Err(not_constant(node)),
        };
        return Ok(ConstValue::ComplexFloat { re, im });
    }
    let a = as_float(&lhs);
    let b = as_float(&rhs);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        _ => return Err(not_constant(node)),
    };
    Ok(ConstValue::Float(result))
}

fn compare_ordering(op: BinaryOp, ord: Option<Ordering>) -> bool {
    match (op, ord) {
        (BinaryOp::NotEqual, None) => true,
        (_, None) => false,
        (BinaryOp::Less, Some(o)) => o == Ordering::Less,
        (BinaryOp::LessEqual, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Greater, Some(o)) => o == Ordering::Greater,
        (BinaryOp::GreaterEqual, Some(o)) => o != Ordering::Less,
        (BinaryOp::Equal, Some(o)) => o == Ordering::Equal,
        (BinaryOp::NotEqual, Some(o)) => o != Ordering::Equal,
        _ => false,
    }
}

fn evaluate_comparison(op: BinaryOp, lhs_node: &AstNode, rhs_node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    let lhs = evaluate(lhs_node, ctx)?;
    let rhs = evaluate(rhs_node, ctx)?;
    let boolean = match (&lhs, &rhs) {
        (ConstValue::ComplexFloat { .. }, ConstValue::ComplexFloat { .. }) => match op {
            BinaryOp::Equal => lhs.value_equal(&rhs),
            BinaryOp::NotEqual => !lhs.value_equal(&rhs),
            _ => return Err(not_constant(lhs_node)),
        },
        (ConstValue::Float(a), ConstValue::Float(b)) => compare_ordering(op, a.partial_cmp(b)),
        (ConstValue::Address { .. }, ConstValue::Address { .. }) => match op {
            BinaryOp::Equal => lhs.value_equal(&rhs),
            BinaryOp::NotEqual => !lhs.value_equal(&rhs),
            _ => return Err(not_constant(lhs_node)),
        },
        _ => {
            let (bits, signed) = node_int_shape(lhs_node, ctx);
            let a = to_bigint(&lhs, bits, signed)?;
            let b = to_bigint(&rhs, bits, signed)?;
            let ord = if signed { a.signed_compare(&b) } else { a.unsigned_compare(&b) };
            compare_ordering(op, Some(ord))
        }
    };
    Ok(ConstValue::integer(boolean as i64, boolean as u64))
}

fn int_as_i64(value: &ConstValue) -> Result<i64> {
    match value {
        ConstValue::Integer { signed, bitprecise, .. } => Ok(match bitprecise {
            Some(b) => b.get_signed(),
            None => *signed,
        }),
        _ => Err(TranslateError::invalid_state("expected an integer constant")),
    }
}

fn evaluate_pointer_arith(op: BinaryOp, lhs_node: &AstNode, rhs_node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    let lhs_ptr = is_ptr(lhs_node.properties.ty.as_deref());
    let rhs_ptr = is_ptr(rhs_node.properties.ty.as_deref());
    let lhs = evaluate(lhs_node, ctx)?;
    let rhs = evaluate(rhs_node, ctx)?;

    if lhs_ptr && rhs_ptr {
        if !matches!(op, BinaryOp::Subtract) {
            return Err(not_constant(lhs_node));
        }
        let (ConstValue::Address { base: ba, offset: oa, .. }, ConstValue::Address { base: bb, offset: ob, .. }) = (&lhs, &rhs) else {
            return Err(not_constant(lhs_node));
        };
        if !matches!(ba, AddressBase::Integral(_)) || !matches!(bb, AddressBase::Integral(_)) {
            return Err(not_constant(lhs_node));
        }
        if ba != bb {
            return Err(not_constant(lhs_node));
        }
        let element = pointee(lhs_node.properties.ty.as_ref()).ok_or_else(|| not_constant(lhs_node))?;
        let elem_size = size_of(&element, ctx).max(1) as i64;
        let diff = oa - ob;
        if diff % elem_size != 0 {
            return Err(TranslateError::invalid_parameter("pointer difference is not a multiple of the element size"));
        }
        let result = diff / elem_size;
        return Ok(ConstValue::integer(result, result as u64));
    }

    if matches!(op, BinaryOp::Subtract) && !lhs_ptr {
        return Err(TranslateError::invalid_parameter("integer minus pointer is not a valid operation"));
    }

    let sign: i64 = if matches!(op, BinaryOp::Subtract) { -1 } else { 1 };
    let (ptr_node, ptr_value, int_node) = if lhs_ptr { (lhs_node, lhs, rhs_node) } else { (rhs_node, rhs, lhs_node) };

    let element = pointee(ptr_node.properties.ty.as_ref()).ok_or_else(|| not_constant(ptr_node))?;
    let elem_size = if is_incomplete(&element) {
        if ctx.config.gnu_extensions {
            ctx.target.incomplete_type_substitute_size()
        } else {
            return Err(TranslateError::invalid_parameter("pointer arithmetic on an incomplete type requires GNU extensions"));
        }
    } else {
        size_of(&element, ctx)
    };
    let index_value = evaluate(int_node, ctx)?;
    let index = int_as_i64(&index_value)?;
    let delta = ctx.target.object_offset(elem_size, index) * sign;

    match ptr_value {
        ConstValue::Address { base, offset, pointer_node_ref, scoped_id } => Ok(ConstValue::Address {
            base,
            offset: offset + delta,
            pointer_node_ref,
            scoped_id,
        }),
        _ => Err(not_constant(ptr_node)),
    }
}

/// `int`/`bool`/float/address-to-int conversions. Address-to-pointer and
/// float-to-pointer casts are never constant -- only integer-to-pointer via
/// an already-integral address (`spec.md` §4.3's `AddressBase::Integral`)
/// preserves a value here.
pub fn cast(value: &ConstValue, source_ty: Option<&AstType>, target_ty: &AstTypeRef, location: SourceLocation, ctx: &EvalContext) -> Result<ConstValue> {
    let target = target_ty.unqualified();
    match target.as_ref() {
        AstType::Bool => {
            let truthy = value.to_boolean().ok_or(TranslateError::NotConstant { location })?;
            Ok(ConstValue::integer(truthy as i64, truthy as u64))
        }
        _ if target.is_integer() => {
            let (bits, signed) = int_shape(&target, ctx);
            match value {
                ConstValue::Integer { .. } => Ok(from_bigint(to_bigint(value, bits, signed)?)),
                ConstValue::Float(f) => {
                    let big = if signed {
                        Bigint::signed_from_long_double(bits, signed, *f)
                    } else {
                        Bigint::unsigned_from_long_double(bits, signed, *f)
                    };
                    Ok(from_bigint(big))
                }
                ConstValue::Address {
                    base: AddressBase::Integral(base),
                    offset,
                    ..
                } => Ok(from_bigint(Bigint::from_i64(bits, signed, base + offset))),
                _ => Err(TranslateError::NotConstant { location }),
            }
        }
        _ if target.is_floating() && !target.is_complex() => match value {
            ConstValue::Integer { .. } => {
                let source_signed = source_ty.map(|t| int_shape(t, ctx).1).unwrap_or(true);
                let big = to_bigint(value, node_bit_width(value), source_signed)?;
                Ok(ConstValue::Float(if source_signed { big.signed_to_long_double() } else { big.unsigned_to_long_double() }))
            }
            ConstValue::Float(f) => Ok(ConstValue::Float(*f)),
            ConstValue::ComplexFloat { re, .. } => Ok(ConstValue::Float(*re)),
            _ => Err(TranslateError::NotConstant { location }),
        },
        _ if target.is_complex() => match value {
            ConstValue::ComplexFloat { .. } => Ok(value.clone()),
            other => Ok(ConstValue::ComplexFloat { re: as_float(other), im: 0.0 }),
        },
        // float -> pointer is never constant; integer -> pointer only when
        // the source value is already an integral address.
        _ if target.is_pointer() => match value {
            ConstValue::Address { .. } => Ok(value.clone()),
            ConstValue::Integer { signed, .. } => Ok(ConstValue::Address {
                base: AddressBase::Integral(*signed),
                offset: 0,
                pointer_node_ref: None,
                scoped_id: None,
            }),
            _ => Err(TranslateError::NotConstant { location }),
        },
        _ => Err(TranslateError::NotConstant { location }),
    }
}

fn node_bit_width(value: &ConstValue) -> u32 {
    match value {
        ConstValue::Integer { bitprecise: Some(b), .. } => b.width,
        _ => 64,
    }
}

fn evaluate_address(node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    match &node.kind {
        AstNodeKind::Expression(ExpressionKind::Identifier(name)) => {
            let scoped = node
                .properties
                .expression_props
                .as_ref()
                .and_then(|p| p.scoped_id)
                .map(|id| astir_ir::constval::ScopeRef(id.0));
            Ok(ConstValue::Address {
                base: AddressBase::Identifier(name.clone()),
                offset: 0,
                pointer_node_ref: None,
                scoped_id: scoped,
            })
        }
        // `&*p` collapses: the dereference never happens.
        AstNodeKind::Expression(ExpressionKind::Indirection(inner)) => evaluate(inner, ctx),
        AstNodeKind::Expression(ExpressionKind::StructMember { base, member, indirect }) => {
            let base_addr = if *indirect { evaluate(base, ctx)? } else { evaluate_address(base, ctx)? };
            let ConstValue::Address { base: addr_base, offset, pointer_node_ref, scoped_id } = base_addr else {
                return Err(not_constant(node));
            };
            let base_ty = if *indirect {
                pointee(base.properties.ty.as_ref()).ok_or_else(|| not_constant(node))?
            } else {
                base.properties.ty.clone().ok_or_else(|| not_constant(node))?
            };
            let member_offset = member_offset_in(&base_ty, member, ctx)?;
            Ok(ConstValue::Address {
                base: addr_base,
                offset: offset + member_offset as i64,
                pointer_node_ref,
                scoped_id,
            })
        }
        AstNodeKind::Expression(ExpressionKind::ArraySubscript { base, index }) => {
            let base_addr = match evaluate_address(base, ctx) {
                Ok(addr) => addr,
                Err(_) => evaluate(base, ctx)?,
            };
            let ConstValue::Address { base: addr_base, offset, pointer_node_ref, scoped_id } = base_addr else {
                return Err(not_constant(node));
            };
            let element_ty = element_of(base.properties.ty.as_ref())
                .or_else(|| pointee(base.properties.ty.as_ref()))
                .ok_or_else(|| not_constant(node))?;
            let index_value = evaluate(index, ctx)?;
            let index = int_as_i64(&index_value)?;
            let elem_size = size_of(&element_ty, ctx) as i64;
            Ok(ConstValue::Address {
                base: addr_base,
                offset: offset + index * elem_size,
                pointer_node_ref,
                scoped_id,
            })
        }
        _ => Err(not_constant(node)),
    }
}

pub(crate) fn member_type_in(ty: &AstTypeRef, name: &str) -> Result<AstTypeRef> {
    let unqualified = ty.unqualified();
    let record = match unqualified.as_ref() {
        AstType::Structure(record) | AstType::Union(record) => record,
        _ => return Err(TranslateError::invalid_parameter("member access on a non-aggregate type")),
    };
    record
        .fields
        .iter()
        .find(|field| field.identifier.as_deref() == Some(name))
        .map(|field| Rc::clone(&field.ty))
        .ok_or_else(|| TranslateError::invalid_parameter(format!("no member named `{name}`")))
}

pub(crate) fn member_offset_in(ty: &AstTypeRef, name: &str, ctx: &EvalContext) -> Result<u64> {
    let unqualified = ty.unqualified();
    match unqualified.as_ref() {
        AstType::Structure(record) => {
            let (_, _, members) = record_layout(record, false, ctx);
            members
                .into_iter()
                .find(|(field_name, _, _)| field_name.as_deref() == Some(name))
                .map(|(_, offset, _)| offset)
                .ok_or_else(|| TranslateError::invalid_parameter(format!("no member named `{name}`")))
        }
        AstType::Union(record) => {
            if record.fields.iter().any(|field| field.identifier.as_deref() == Some(name)) {
                Ok(0)
            } else {
                Err(TranslateError::invalid_parameter(format!("no member named `{name}`")))
            }
        }
        _ => Err(TranslateError::invalid_parameter("member access on a non-aggregate type")),
    }
}

/// `offsetof`: walks a designator chain from a root type, summing byte
/// offsets. A designator onto a bit-field reports its storage unit's byte
/// offset rather than a (meaningless, in bytes) bit position -- the same
/// simplification common implementations make for this corner of the
/// extension.
pub(crate) fn offsetof(ty: &AstTypeRef, designators: &[Designator], ctx: &EvalContext) -> Result<u64> {
    let mut current = Rc::clone(ty);
    let mut offset = 0u64;
    for designator in designators {
        match designator {
            Designator::Member(name) => {
                offset += member_offset_in(&current, name, ctx)?;
                current = member_type_in(&current, name)?;
            }
            Designator::Index(index) => {
                let element = element_of(Some(&current)).ok_or_else(|| TranslateError::invalid_parameter("index designator on a non-array type"))?;
                offset += size_of(&element, ctx) * index;
                current = element;
            }
        }
    }
    Ok(offset)
}

fn types_compatible(a: &AstTypeRef, b: &AstTypeRef) -> bool {
    *a.unqualified() == *b.unqualified()
}

fn classify_type(ty: &AstTypeRef) -> i64 {
    match ty.unqualified().as_ref() {
        AstType::Void => 0,
        AstType::Short { .. } | AstType::Int { .. } | AstType::Long { .. } | AstType::LongLong { .. } | AstType::BitPrecise { .. } => 1,
        AstType::SignedChar | AstType::UnsignedChar | AstType::Char => 2,
        AstType::Enumeration(_) => 3,
        AstType::Bool => 4,
        AstType::Pointer(_) | AstType::NullPointer => 5,
        AstType::Float | AstType::Double | AstType::LongDouble => 8,
        AstType::ComplexFloat | AstType::ComplexDouble | AstType::ComplexLongDouble => 9,
        AstType::Function(_) => 10,
        AstType::Structure(_) => 12,
        AstType::Union(_) => 13,
        AstType::Array { .. } => 14,
        AstType::VaList | AstType::Auto | AstType::Qualified { .. } => 1,
    }
}

fn bit_builtin(operand: &AstNode, ctx: &EvalContext, f: impl Fn(&Bigint) -> i64) -> Result<ConstValue> {
    let value = evaluate(operand, ctx)?;
    let (bits, signed) = node_int_shape(operand, ctx);
    let big = to_bigint(&value, bits.max(1), signed)?;
    let result = f(&big);
    Ok(ConstValue::integer(result, result as u64))
}

fn evaluate_builtin(builtin: &BuiltinCall, node: &AstNode, ctx: &EvalContext) -> Result<ConstValue> {
    match builtin {
        BuiltinCall::Offsetof { type_name, designator } => {
            let offset = offsetof(type_name, designator, ctx)?;
            Ok(ConstValue::integer(offset as i64, offset))
        }
        BuiltinCall::TypesCompatibleP { a, b } => {
            let compatible = types_compatible(a, b);
            Ok(ConstValue::integer(compatible as i64, compatible as u64))
        }
        BuiltinCall::ChooseExpr { condition, if_true, if_false } => {
            let cond = evaluate(condition, ctx)?;
            let truthy = cond.to_boolean().ok_or_else(|| not_constant(node))?;
            if truthy { evaluate(if_true, ctx) } else { evaluate(if_false, ctx) }
        }
        BuiltinCall::ConstantP(operand) => {
            let known = evaluate(operand, ctx).map(|v| v.is_statically_known()).unwrap_or(false);
            Ok(ConstValue::integer(known as i64, known as u64))
        }
        BuiltinCall::ClassifyType(ty) => {
            let code = classify_type(ty);
            Ok(ConstValue::integer(code, code as u64))
        }
        BuiltinCall::Inf(_) => Ok(ConstValue::Float(f64::INFINITY)),
        BuiltinCall::Nan(_, _payload) => Ok(ConstValue::Float(f64::NAN)),
        BuiltinCall::Ffs { operand, .. } => bit_builtin(operand, ctx, |b| b.least_significant_nonzero().map(|n| n as i64 + 1).unwrap_or(0)),
        BuiltinCall::Clz { operand, .. } => bit_builtin(operand, ctx, |b| b.leading_zeros(None) as i64),
        BuiltinCall::Ctz { operand, .. } => bit_builtin(operand, ctx, |b| b.trailing_zeros(None) as i64),
        BuiltinCall::Clrsb { operand, .. } => bit_builtin(operand, ctx, |b| b.redundant_sign_bits() as i64),
        BuiltinCall::Popcount { operand, .. } => bit_builtin(operand, ctx, |b| b.nonzero_count() as i64),
        BuiltinCall::Parity { operand, .. } => bit_builtin(operand, ctx, |b| b.parity() as i64),
        // `__builtin_*_overflow` always writes through a pointer; it is
        // explicitly excluded from the constant-expression grammar.
        BuiltinCall::Overflow { .. } => Err(not_constant(node)),
    }
}

/// Non-emitting structure/union layout: same cursor math as the type
/// translator's `translate_record`, but it returns member offsets instead of
/// pushing typeentries, so `evaluate` can compute `offsetof` and pointer
/// arithmetic without a live `IrModule`.
pub(crate) fn record_layout(record: &astir_ast::RecordType, is_union: bool, ctx: &EvalContext) -> (u64, u32, Vec<(Option<String>, u64, AstTypeRef)>) {
    if record.fields.is_empty() {
        let size = if ctx.config.empty_structs { 1 } else { 0 };
        return (size, 1, Vec::new());
    }

    let mut allocator = BitFieldAllocator::new(ctx.config.bitfield_storage_unit_bits);
    let mut current_storage_offset: Option<u64> = None;
    let mut members = Vec::new();
    let mut cursor: u64 = 0;
    let mut max_align: u32 = 1;
    let storage_unit_bytes = (ctx.config.bitfield_storage_unit_bits as u64) / 8;

    for field in &record.fields {
        if let Some(width) = field.bitfield_width {
            if width == 0 {
                allocator.reset();
                current_storage_offset = None;
                continue;
            }
            let colocated = current_storage_offset.is_some();
            let placement = match allocator.next(colocated, width, ()) {
                BitFieldResult::Placed(p) => p,
                BitFieldResult::OutOfSpace => match allocator.next(false, width, ()) {
                    BitFieldResult::Placed(p) => p,
                    BitFieldResult::OutOfSpace => continue,
                },
            };
            let offset = if placement.offset_in_storage == 0 {
                if !is_union {
                    cursor = round_up(cursor, storage_unit_bytes);
                }
                let offset = if is_union { 0 } else { cursor };
                if !is_union {
                    cursor += storage_unit_bytes;
                }
                max_align = max_align.max(ctx.config.bitfield_storage_unit_bits / 8);
                current_storage_offset = Some(offset);
                offset
            } else {
                current_storage_offset.unwrap_or(0)
            };
            members.push((field.identifier.clone(), offset, Rc::clone(&field.ty)));
        } else {
            allocator.reset();
            current_storage_offset = None;
            let align = alignment_hint(&field.ty, ctx.target, ctx.config);
            let size = size_of(&field.ty, ctx);
            let offset = if is_union {
                0
            } else if record.packed {
                cursor
            } else {
                round_up(cursor, align as u64)
            };
            if !is_union {
                cursor = offset + size;
            }
            max_align = max_align.max(align);
            members.push((field.identifier.clone(), offset, Rc::clone(&field.ty)));
        }
    }

    let final_align = if record.packed { 1 } else { max_align };
    let size = if is_union {
        members.iter().map(|(_, _, ty)| size_of(ty, ctx)).max().unwrap_or(0)
    } else {
        round_up(cursor, final_align as u64)
    };
    (size, final_align, members)
}

pub(crate) fn size_of(ty: &AstTypeRef, ctx: &EvalContext) -> u64 {
    match ty.as_ref() {
        AstType::Void => ctx.target.incomplete_type_substitute_size(),
        AstType::Qualified { ty, .. } => size_of(ty, ctx),
        AstType::BitPrecise { width, .. } => crate::target::bit_precise_layout(*width, ctx.target.scalar_layout(ScalarKind::Pointer).1).0,
        AstType::Enumeration(enum_ty) => size_of(&enum_ty.underlying, ctx),
        AstType::Array { element, boundary } => {
            let count = match boundary {
                ArrayBoundary::Bounded(n) | ArrayBoundary::BoundedStatic(n) => *n,
                _ => 0,
            };
            size_of(element, ctx) * count
        }
        AstType::Structure(record) => record_layout(record, false, ctx).0,
        AstType::Union(record) => record_layout(record, true, ctx).0,
        AstType::Function(_) => ctx.target.incomplete_type_substitute_size(),
        other => scalar_kind_for(other).map(|kind| ctx.target.scalar_layout(kind).0).unwrap_or(0),
    }
}

/// Three-way comparison for ordering already-folded values, e.g. when
/// deduplicating or sorting `case` labels during switch lowering.
pub fn compare(lhs: &ConstValue, rhs: &ConstValue) -> Result<Ordering> {
    match (lhs, rhs) {
        (ConstValue::Integer { bitprecise: Some(a), .. }, ConstValue::Integer { bitprecise: Some(b), .. }) => Ok(a.unsigned_compare(b)),
        (ConstValue::Integer { unsigned: a, .. }, ConstValue::Integer { unsigned: b, .. }) => Ok(a.cmp(b)),
        (ConstValue::Float(a), ConstValue::Float(b)) => a.partial_cmp(b).ok_or_else(|| TranslateError::invalid_parameter("NaN values are unordered")),
        _ => Err(TranslateError::invalid_parameter("values are not comparable")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astir_ast::node::{ExpressionProps, NodeProperties, SourceLocation as AstLocation};
    use astir_ast::{BinaryOp as B, ConstantLiteral as Lit, Field, RecordType};

    fn ctx<'a>(target: &'a dyn TargetEnvironment, config: &'a TranslationConfig) -> EvalContext<'a> {
        EvalContext { target, config }
    }

    fn leaf(kind: ExpressionKind, ty: AstTypeRef) -> AstNode {
        AstNode {
            kind: AstNodeKind::Expression(kind),
            properties: NodeProperties {
                ty: Some(ty),
                ..NodeProperties::default()
            },
            location: AstLocation::default(),
        }
    }

    fn int_node(value: i64, ty: AstTypeRef) -> AstNode {
        leaf(ExpressionKind::Constant(Lit::Int(value)), ty)
    }

    fn int_ty() -> AstTypeRef {
        Rc::new(AstType::Int { signed: true })
    }

    fn binary(op: B, lhs: AstNode, rhs: AstNode, ty: AstTypeRef) -> AstNode {
        leaf(
            ExpressionKind::Binary {
                op,
                lhs: Rc::new(lhs),
                rhs: Rc::new(rhs),
            },
            ty,
        )
    }

    #[test]
    fn folds_integer_addition() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let node = binary(B::Add, int_node(2, int_ty()), int_node(3, int_ty()), int_ty());
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(5, 5));
    }

    #[test]
    fn addition_wraps_at_declared_width() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let uchar = Rc::new(AstType::UnsignedChar);
        let node = binary(B::Add, int_node(250, uchar.clone()), int_node(10, uchar.clone()), uchar);
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(4, 4));
    }

    #[test]
    fn division_by_zero_is_an_error_not_a_non_constant() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let node = binary(B::Divide, int_node(1, int_ty()), int_node(0, int_ty()), int_ty());
        let err = evaluate(&node, &c).unwrap_err();
        assert!(!matches!(err, TranslateError::NotConstant { .. }));
    }

    fn address_of_subscript(name: &str, index: i64) -> AstNode {
        let subscript = leaf(
            ExpressionKind::ArraySubscript {
                base: Rc::new(leaf(ExpressionKind::Identifier(name.to_string()), int_ty())),
                index: Rc::new(int_node(index, int_ty())),
            },
            int_ty(),
        );
        leaf(ExpressionKind::AddressOf(Rc::new(subscript)), Rc::new(AstType::Pointer(int_ty())))
    }

    #[test]
    fn pointer_difference_between_two_identifier_bases_is_not_constant() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let ptr_ty = Rc::new(AstType::Pointer(int_ty()));
        let node = binary(B::Subtract, address_of_subscript("arr", 5), address_of_subscript("arr", 2), ptr_ty);
        let err = evaluate(&node, &c).unwrap_err();
        assert!(matches!(err, TranslateError::NotConstant { .. }));
    }

    #[test]
    fn short_circuit_and_skips_right_operand_errors() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let zero = int_node(0, int_ty());
        let identifier = leaf(ExpressionKind::Identifier("x".into()), int_ty());
        let node = binary(B::LogicalAnd, zero, identifier, int_ty());
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(0, 0));
    }

    #[test]
    fn gnu_elision_uses_condition_value_as_true_branch() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let condition = int_node(7, int_ty());
        let else_branch = int_node(0, int_ty());
        let node = leaf(
            ExpressionKind::Conditional {
                condition: Rc::new(condition),
                then_branch: None,
                else_branch: Rc::new(else_branch),
            },
            int_ty(),
        );
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(7, 7));
    }

    #[test]
    fn offsetof_locates_second_struct_member() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let record = RecordType {
            complete: true,
            identifier: Some("S".into()),
            fields: vec![
                Field { identifier: Some("a".into()), ty: Rc::new(AstType::Char), bitfield_width: None },
                Field { identifier: Some("b".into()), ty: int_ty(), bitfield_width: None },
            ],
            packed: false,
        };
        let ty = Rc::new(AstType::Structure(record));
        let offset = offsetof(&ty, &[Designator::Member("b".into())], &c).unwrap();
        assert_eq!(offset, 4);
    }

    #[test]
    fn types_compatible_ignores_top_level_qualifiers() {
        let a = Rc::new(AstType::Qualified {
            ty: int_ty(),
            qualifiers: astir_ast::Qualifiers { const_: true, ..Default::default() },
        });
        assert!(types_compatible(&a, &int_ty()));
    }

    #[test]
    fn builtin_constant_p_is_false_for_non_constant_operand() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let operand = Rc::new(leaf(ExpressionKind::Identifier("x".into()), int_ty()));
        let node = leaf(ExpressionKind::Builtin(BuiltinCall::ConstantP(operand)), int_ty());
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(0, 0));
    }

    #[test]
    fn popcount_matches_known_bit_pattern() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let operand = Rc::new(int_node(0b1011_0001, int_ty()));
        let node = leaf(
            ExpressionKind::Builtin(BuiltinCall::Popcount { operand, generic: false }),
            int_ty(),
        );
        let value = evaluate(&node, &c).unwrap();
        assert_eq!(value, ConstValue::integer(4, 4));
    }

    #[test]
    fn pointer_plus_int_then_minus_int_round_trips() {
        let target = crate::target::DefaultTargetEnvironment;
        let config = TranslationConfig::default();
        let c = ctx(&target, &config);
        let ptr_ty = Rc::new(AstType::Pointer(int_ty()));
        let base = leaf(ExpressionKind::Identifier("arr".into()), ptr_ty.clone());
        let address = ConstValue::Address {
            base: AddressBase::Identifier("arr".into()),
            offset: 0,
            pointer_node_ref: None,
            scoped_id: None,
        };
        let mut base_with_value = base;
        base_with_value.properties.expression_props = Some(ExpressionProps {
            constant_expression: true,
            constant_expression_value: Some(address),
            ..ExpressionProps::default()
        });
        let plus = binary(B::Add, base_with_value, int_node(3, int_ty()), ptr_ty.clone());
        let forward = evaluate(&plus, &c).unwrap();
        match &forward {
            ConstValue::Address { offset, .. } => assert_eq!(*offset, 12),
            other => panic!("expected address, got {other:?}"),
        }
        let minus = binary(B::Subtract, plus, int_node(3, int_ty()), ptr_ty);
        let back = evaluate(&minus, &c).unwrap();
        match back {
            ConstValue::Address { offset, .. } => assert_eq!(offset, 0),
            other => panic!("expected address, got {other:?}"),
        }
    }

    #[test]
    fn compare_orders_integers_by_unsigned_value() {
        let ordering = compare(&ConstValue::integer(1, 1), &ConstValue::integer(2, 2)).unwrap();
        assert_eq!(ordering, Ordering::Less);
    }
}
