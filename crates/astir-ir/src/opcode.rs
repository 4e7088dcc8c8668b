//! `IrInstruction`: `(opcode, operand)`, the stack-machine instruction shape
//! of `spec.md` §3. `Opcode` is a closed enum; integer-width families are
//! generated with a macro, the same way checked-arithmetic dispatch in
//! `eval.rs` generates per-width code paths.

use serde::{Deserialize, Serialize};

use crate::id::{InlineAsmId, InstructionIndex, StringLiteralId};

/// Sentinel written into a branch/jump operand before its target is known;
/// `spec.md` Invariant 3 requires none of these survive function
/// finalization.
pub const PLACEHOLDER_INDEX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(IntWidth::W8),
            16 => Some(IntWidth::W16),
            32 => Some(IntWidth::W32),
            64 => Some(IntWidth::W64),
            _ => None,
        }
    }
}

macro_rules! width_family {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }
    };
}

width_family!(ArithKind { Add, Sub, Mul, Div, Mod, And, Or, Xor, Lshift, Rshift, Arshift, Neg, Not });
width_family!(CompareKind { Equals, NotEquals, LessThan, LessOrEquals, GreaterThan, GreaterOrEquals });
width_family!(BoolOp { And, Or, Not });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFlags {
    pub volatile: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    IntConst,
    UintConst,
    Float32Const,
    Float64Const,
    LongDoubleConst,
    ComplexFloat64From,
    StringRef(StringLiteralId),

    /// Per-width integer arithmetic, e.g. `INT32_ADD`, `UINT8_MOD`.
    IntArith {
        width: IntWidth,
        signedness: Signedness,
        kind: ArithKind,
    },
    IntSignExtend { from: IntWidth, to: IntWidth },
    IntZeroExtend { from: IntWidth, to: IntWidth },
    IntToBool(IntWidth),
    IntBool { width: IntWidth, op: BoolOp },
    IntCompare {
        width: IntWidth,
        signedness: Signedness,
        kind: CompareKind,
    },

    Branch(IntWidth),
    Jump,
    /// Pushes the code address of a label as a value (`&&label`); carries
    /// the same `Operand::TargetIndex` backpatching as `Jump`/`Branch` when
    /// the label has not been placed yet.
    LabelAddress,
    /// Pops a code address off the stack and transfers control there
    /// (`goto *expr`); the one dynamic counterpart to the static `Jump`.
    IndirectJump,
    VstackPick,
    VstackPop,
    ScopePop,

    GetLocal,
    SetLocal,
    GetGlobal,
    Load { width: IntWidth, flags: LoadFlags },
    Store { width: IntWidth, flags: LoadFlags },
    ElementPtr,
    Call,
    IndirectCall,
    Return,

    InlineAsm(InlineAsmId),
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Return | Opcode::Jump | Opcode::IndirectJump)
    }

    pub fn is_branch_like(self) -> bool {
        matches!(self, Opcode::Branch(_) | Opcode::Jump)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    None,
    Immediate(i64),
    UImmediate(u64),
    Float(f64),
    /// Instruction-index operand: a branch/jump target, possibly still the
    /// `PLACEHOLDER_INDEX` sentinel awaiting back-patching.
    TargetIndex(u32),
    LocalSlot(u32),
}

impl Operand {
    pub fn placeholder_target() -> Self {
        Operand::TargetIndex(PLACEHOLDER_INDEX)
    }

    pub fn is_unresolved_placeholder(&self) -> bool {
        matches!(self, Operand::TargetIndex(PLACEHOLDER_INDEX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrInstruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl IrInstruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        IrInstruction { opcode, operand }
    }

    pub fn patch_target(&mut self, index: InstructionIndex) {
        debug_assert!(self.opcode.is_branch_like());
        self.operand = Operand::TargetIndex(index.0);
    }
}
