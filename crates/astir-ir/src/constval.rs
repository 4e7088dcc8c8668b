//! `ConstValue`, the result type of constant-expression evaluation
//! (`spec.md` §3, component C3).
//!
//! `Compound`'s `ty` field is a `TypeEntryId` rather than a borrowed AST
//! type: by the time an initializer list folds to a compound constant, C4
//! has already materialized the type's IR entries, and indexing through the
//! arena (spec.md §9 "Pointer-heavy payloads") keeps this crate from needing
//! a dependency on `astir-ast`.

use serde::{Deserialize, Serialize};

use crate::bigint::Bigint;
use crate::id::TypeEntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringLiteralKind {
    Narrow,
    Wide,
    Utf8,
    Utf16,
    Utf32,
}

/// Opaque back-reference to the AST node that produced an address constant,
/// used when a later cast needs to preserve provenance (`spec.md` §4.3
/// "the address is preserved with a new `pointer_node` back-reference").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRef(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AddressBase {
    Integral(i64),
    Identifier(String),
    StringLiteral {
        kind: StringLiteralKind,
        bytes: Vec<u8>,
        length: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstInitializer {
    Scalar(Box<ConstValue>),
    Elements(Vec<ConstInitializer>),
}

impl ConstInitializer {
    /// `spec.md`'s supplemented `is_statically_known` recurses over exactly
    /// this shape (`constant_expression.c:is_initializer_statically_known`).
    pub fn is_statically_known(&self) -> bool {
        match self {
            ConstInitializer::Scalar(value) => value.is_statically_known(),
            ConstInitializer::Elements(elements) => {
                elements.iter().all(ConstInitializer::is_statically_known)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    None,
    Integer {
        signed: i64,
        unsigned: u64,
        bitprecise: Option<Bigint>,
    },
    Float(f64),
    ComplexFloat {
        re: f64,
        im: f64,
    },
    Address {
        base: AddressBase,
        offset: i64,
        pointer_node_ref: Option<NodeRef>,
        scoped_id: Option<ScopeRef>,
    },
    Compound {
        ty: TypeEntryId,
        initializer: ConstInitializer,
    },
}

impl ConstValue {
    pub fn integer(signed: i64, unsigned: u64) -> Self {
        ConstValue::Integer {
            signed,
            unsigned,
            bitprecise: None,
        }
    }

    pub fn bitprecise(value: Bigint) -> Self {
        ConstValue::Integer {
            signed: value.get_signed(),
            unsigned: value.get_unsigned(),
            bitprecise: Some(value),
        }
    }

    /// Boolean coercion rules per `spec.md` §4.3: klass-dependent, not
    /// a single numeric comparison.
    pub fn to_boolean(&self) -> Option<bool> {
        match self {
            ConstValue::None => None,
            ConstValue::Integer {
                unsigned,
                bitprecise,
                ..
            } => Some(match bitprecise {
                Some(b) => !b.is_zero(),
                None => *unsigned != 0,
            }),
            ConstValue::Float(value) => Some(*value != 0.0),
            ConstValue::ComplexFloat { re, im } => Some(*re != 0.0 || *im != 0.0),
            ConstValue::Address { .. } => Some(true),
            ConstValue::Compound { .. } => None,
        }
    }

    /// `__builtin_constant_p`: statically known per-klass, recursing into
    /// compound initializers (`spec.md` Supplemented features).
    pub fn is_statically_known(&self) -> bool {
        match self {
            ConstValue::None | ConstValue::Integer { .. } | ConstValue::Float(_) | ConstValue::ComplexFloat { .. } => {
                true
            }
            ConstValue::Address { base, .. } => !matches!(base, AddressBase::Identifier(_)),
            ConstValue::Compound { initializer, .. } => initializer.is_statically_known(),
        }
    }

    /// Klass-aware equality used to deduplicate `case` labels during switch
    /// lowering (`constant_expression.c:..._value_equal`), distinct from the
    /// C `==` operator fold which `compare` in `astir-translate` implements.
    pub fn value_equal(&self, other: &ConstValue) -> bool {
        match (self, other) {
            (ConstValue::None, ConstValue::None) => true,
            (
                ConstValue::Integer { unsigned: a, .. },
                ConstValue::Integer { unsigned: b, .. },
            ) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a == b,
            (
                ConstValue::ComplexFloat { re: ar, im: ai },
                ConstValue::ComplexFloat { re: br, im: bi },
            ) => ar == br && ai == bi,
            (
                ConstValue::Address {
                    base: ab,
                    offset: ao,
                    ..
                },
                ConstValue::Address {
                    base: bb,
                    offset: bo,
                    ..
                },
            ) => ab == bb && ao == bo,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_coercion_for_zero_integer() {
        let v = ConstValue::integer(0, 0);
        assert_eq!(v.to_boolean(), Some(false));
    }

    #[test]
    fn boolean_coercion_for_nonzero_bitprecise() {
        let b = Bigint::from_u64(129, false, 1);
        let v = ConstValue::bitprecise(b);
        assert_eq!(v.to_boolean(), Some(true));
    }

    #[test]
    fn compound_is_not_a_boolean() {
        let v = ConstValue::Compound {
            ty: TypeEntryId(0),
            initializer: ConstInitializer::Elements(vec![]),
        };
        assert_eq!(v.to_boolean(), None);
    }

    #[test]
    fn identifier_address_is_not_statically_known() {
        let v = ConstValue::Address {
            base: AddressBase::Identifier("x".into()),
            offset: 0,
            pointer_node_ref: None,
            scoped_id: None,
        };
        assert!(!v.is_statically_known());
    }

    #[test]
    fn compound_statically_known_recurses() {
        let known = ConstInitializer::Elements(vec![
            ConstInitializer::Scalar(Box::new(ConstValue::integer(1, 1))),
            ConstInitializer::Scalar(Box::new(ConstValue::Address {
                base: AddressBase::Identifier("y".into()),
                offset: 0,
                pointer_node_ref: None,
                scoped_id: None,
            })),
        ]);
        assert!(!known.is_statically_known());
    }

    #[test]
    fn value_equal_compares_by_klass() {
        let a = ConstValue::integer(5, 5);
        let b = ConstValue::Float(5.0);
        assert!(!a.value_equal(&b));
        assert!(a.value_equal(&ConstValue::integer(5, 5)));
    }

    #[test]
    fn serde_roundtrip() {
        let v = ConstValue::ComplexFloat { re: 1.0, im: -2.0 };
        let json = serde_json::to_string(&v).unwrap();
        let back: ConstValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
