//! The flat IR type-description list (`spec.md` §6 `types`). Each entry is a
//! tag plus alignment plus a single "param" integer whose meaning is
//! typecode-dependent (field count for `STRUCT`/`UNION`, element count for
//! `ARRAY`, nothing for scalars).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Vararg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Typecode {
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float32,
    Float64,
    LongDouble,
    ComplexFloat32,
    ComplexFloat64,
    ComplexLongDouble,
    Word,
    Struct,
    Union,
    Array,
    Builtin(Builtin),
}

impl Typecode {
    pub fn is_scalar(self) -> bool {
        !matches!(
            self,
            Typecode::Struct | Typecode::Union | Typecode::Array | Typecode::Builtin(_)
        )
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Typecode::Struct | Typecode::Union | Typecode::Array)
    }
}

/// One element of the flat type list: `(typecode, alignment, param, atomic?)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TypeEntry {
    pub typecode: Typecode,
    pub alignment: u32,
    pub param: i64,
    pub atomic: bool,
}

impl TypeEntry {
    pub fn new(typecode: Typecode, alignment: u32, param: i64) -> Self {
        TypeEntry {
            typecode,
            alignment,
            param,
            atomic: false,
        }
    }

    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Coerces `alignment == 0` to `1`, the "packed" post-pass of §4.1.
    pub fn pack(&mut self) {
        if self.alignment == 0 {
            self.alignment = 1;
        }
    }
}
