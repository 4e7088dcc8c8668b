//! Newtype identifiers into the IR module's flat storage vectors. Every
//! piece of IR state that other state refers to is addressed by one of these
//! rather than by pointer, so the arena can grow without invalidating
//! existing references (see `spec.md` §9 "Pointer-heavy payloads").

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! ir_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

ir_id!(TypeEntryId);
ir_id!(DebugEntryId);
ir_id!(StringLiteralId);
ir_id!(InlineAsmId);
ir_id!(FunctionIndex);
ir_id!(SymbolId);
ir_id!(InstructionIndex);
ir_id!(FlowControlId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_teacher_convention() {
        assert_eq!(TypeEntryId(7).to_string(), "TypeEntryId(7)");
        assert_eq!(DebugEntryId(0).to_string(), "DebugEntryId(0)");
    }

    #[test]
    fn roundtrips_through_u32() {
        let id = InstructionIndex::from(12u32);
        assert_eq!(u32::from(id), 12);
    }

    #[test]
    fn serde_roundtrip() {
        let id = StringLiteralId(3);
        let json = serde_json::to_string(&id).unwrap();
        let back: StringLiteralId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(FunctionIndex(1) < FunctionIndex(2));
    }
}
