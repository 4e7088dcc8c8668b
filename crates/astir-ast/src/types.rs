//! The AST type system consumed from the semantic analyzer.
//!
//! Mirrors `spec.md` §3 `AstType` exactly. Nothing here folds, lays out, or
//! lowers anything -- this crate is the read-only contract the translator
//! pattern-matches against. `Qualified` never nests (the semantic analyzer
//! collapses repeated qualifiers before handing the tree to the translator);
//! `Pointer(Qualified(T))` is legal but `Qualified(Pointer(T))` is the
//! canonical shape for a qualified pointer itself.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::node::NodeRef;

/// Shared, read-only reference to a type node. The AST is immutable during
/// translation, so structural sharing via `Rc` needs no interior mutability.
pub type AstTypeRef = Rc<AstType>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstType {
    Void,
    Bool,
    SignedChar,
    UnsignedChar,
    /// Plain `char`, distinct from `SignedChar`/`UnsignedChar` because its
    /// signedness is a target-environment property, not a type property.
    Char,
    Short { signed: bool },
    Int { signed: bool },
    Long { signed: bool },
    LongLong { signed: bool },
    /// C23 `_BitInt(width)`.
    BitPrecise { signed: bool, width: u32 },
    Float,
    Double,
    LongDouble,
    ComplexFloat,
    ComplexDouble,
    ComplexLongDouble,
    Pointer(AstTypeRef),
    /// Type of the null pointer constant `0`/`(void*)0` prior to decay.
    NullPointer,
    Array {
        element: AstTypeRef,
        boundary: ArrayBoundary,
    },
    Structure(RecordType),
    Union(RecordType),
    Enumeration(EnumType),
    Function(FunctionType),
    Qualified {
        ty: AstTypeRef,
        qualifiers: Qualifiers,
    },
    VaList,
    /// Placeholder for `auto`-deduced types that the semantic analyzer has
    /// not yet resolved; never reaches the translator in a well-formed AST.
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayBoundary {
    Unbounded,
    Bounded(u64),
    BoundedStatic(u64),
    /// Variable-length array; the size expression is evaluated at runtime by
    /// emitted code, not by the translator.
    Vla(VlaSize),
    VlaStatic(VlaSize),
}

/// The AST expression node computing a VLA's element count, carried directly
/// rather than as an index: the size expression is evaluated once, at the
/// point the array's declaration is lowered, and nowhere else needs to look
/// it up by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlaSize(pub NodeRef);

impl PartialEq for VlaSize {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    pub const_: bool,
    pub volatile: bool,
    pub restrict: bool,
    pub atomic: bool,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        !self.const_ && !self.volatile && !self.restrict && !self.atomic
    }
}

/// A single field of a `Structure`/`Union`, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// `None` for an anonymous struct/union member.
    pub identifier: Option<String>,
    pub ty: AstTypeRef,
    /// Bit-field width, already folded by the semantic analyzer to a
    /// constant bit count. `None` for an ordinary field.
    pub bitfield_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    pub complete: bool,
    pub identifier: Option<String>,
    pub fields: Vec<Field>,
    pub packed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub complete: bool,
    pub identifier: Option<String>,
    pub underlying: AstTypeRef,
    /// `(name, explicit discriminant value)` in declaration order.
    pub enumerators: Vec<(String, Option<i64>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionMode {
    /// Prototype with a typed parameter list, e.g. `int f(int, char)`.
    Params,
    /// Prototype declared with an explicit empty parameter list `f(void)`.
    ParamEmpty,
    /// K&R-style declaration `f()` with parameter types supplied separately.
    Kr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    pub return_type: AstTypeRef,
    pub mode: FunctionMode,
    pub parameters: Vec<(Option<String>, Option<AstTypeRef>)>,
    pub ellipsis: bool,
}

impl AstType {
    /// Strips any number of `Qualified` wrappers, returning the inner type.
    pub fn unqualified(&self) -> AstTypeRef {
        match self {
            AstType::Qualified { ty, .. } => ty.unqualified(),
            _ => Rc::new(self.clone()),
        }
    }

    pub fn qualifiers(&self) -> Qualifiers {
        match self {
            AstType::Qualified { qualifiers, .. } => *qualifiers,
            _ => Qualifiers::default(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            AstType::Bool
                | AstType::SignedChar
                | AstType::UnsignedChar
                | AstType::Char
                | AstType::Short { .. }
                | AstType::Int { .. }
                | AstType::Long { .. }
                | AstType::LongLong { .. }
                | AstType::BitPrecise { .. }
                | AstType::Enumeration(_)
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            AstType::Float
                | AstType::Double
                | AstType::LongDouble
                | AstType::ComplexFloat
                | AstType::ComplexDouble
                | AstType::ComplexLongDouble
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            AstType::ComplexFloat | AstType::ComplexDouble | AstType::ComplexLongDouble
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, AstType::Pointer(_) | AstType::NullPointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unqualified_strips_single_wrapper() {
        let inner = Rc::new(AstType::Int { signed: true });
        let qualified = Rc::new(AstType::Qualified {
            ty: Rc::clone(&inner),
            qualifiers: Qualifiers {
                const_: true,
                ..Default::default()
            },
        });
        let stripped = qualified.unqualified();
        assert!(matches!(*stripped, AstType::Int { signed: true }));
    }

    #[test]
    fn qualifiers_default_is_empty() {
        assert!(Qualifiers::default().is_empty());
    }

    #[test]
    fn bitprecise_is_integer() {
        let ty = AstType::BitPrecise {
            signed: false,
            width: 129,
        };
        assert!(ty.is_integer());
        assert!(!ty.is_floating());
    }

    #[test]
    fn complex_double_is_complex_and_floating() {
        assert!(AstType::ComplexDouble.is_complex());
        assert!(AstType::ComplexDouble.is_floating());
    }

    #[test]
    fn serde_roundtrip_structure() {
        let ty = AstType::Structure(RecordType {
            complete: true,
            identifier: Some("S".into()),
            fields: vec![Field {
                identifier: Some("a".into()),
                ty: Rc::new(AstType::Int { signed: true }),
                bitfield_width: Some(25),
            }],
            packed: false,
        });
        let json = serde_json::to_string(&ty).unwrap();
        let back: AstType = serde_json::from_str(&json).unwrap();
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }
}
