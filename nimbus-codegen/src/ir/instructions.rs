//! Opcodes and the flag sets that qualify them (`spec.md` §4.2).

use core::fmt;

/// Unary arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    RcpSqrt,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Asin,
    Acos,
    Atan,
    Exp,
    Exp2,
    Log,
    Log2,
    Log10,
    Floor,
    Ceiling,
    Round,
    IsNaN,
    IsInfinity,
    IsFinite,
    PopCount,
    LeadingZeros,
    TrailingZeros,
    BitCastToInt,
    BitCastToFloat,
}

/// Binary arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    ShrLogical,
    ShrArithmetic,
    Min,
    Max,
    Atan2,
    Pow,
    LogBase,
}

/// Ternary arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryOp {
    FusedMulAdd,
    Select,
    Clamp,
}

/// Comparison kinds. Result type is always `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Conversion opcodes (`spec.md` §4.2 "Conversion").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    IntToInt,
    IntToFloat,
    FloatToFloat,
    FloatToInt,
    PointerToInt,
    IntToPointer,
}

enum ArithFlagBit {
    Unsigned,
    FastMath,
    NoNaN,
    NoInf,
}

const ARITH_NAMES: [&str; 4] = ["unsigned", "fast_math", "no_nan", "no_inf"];

/// Per-instruction arithmetic flags. Downstream passes (constant folding)
/// and backends (PTX `.rn`/`.ftz` suffix selection) honor these; see
/// `spec.md` §4.2 and §4.5 rule 1.
///
/// Hand-rolled as a packed `u8` rather than pulled in from a flags crate,
/// matching `cranelift-codegen::ir::MemFlags`'s own bit-packed flag set.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArithmeticFlags {
    bits: u8,
}

impl ArithmeticFlags {
    pub fn new() -> Self {
        Self { bits: 0 }
    }

    fn read(self, bit: ArithFlagBit) -> bool {
        self.bits & (1 << bit as u8) != 0
    }

    fn set(&mut self, bit: ArithFlagBit) {
        self.bits |= 1 << bit as u8;
    }

    pub fn unsigned(self) -> bool {
        self.read(ArithFlagBit::Unsigned)
    }
    pub fn set_unsigned(&mut self) {
        self.set(ArithFlagBit::Unsigned)
    }

    pub fn fast_math(self) -> bool {
        self.read(ArithFlagBit::FastMath)
    }
    pub fn set_fast_math(&mut self) {
        self.set(ArithFlagBit::FastMath)
    }

    pub fn no_nan(self) -> bool {
        self.read(ArithFlagBit::NoNaN)
    }
    pub fn set_no_nan(&mut self) {
        self.set(ArithFlagBit::NoNaN)
    }

    pub fn no_inf(self) -> bool {
        self.read(ArithFlagBit::NoInf)
    }
    pub fn set_no_inf(&mut self) {
        self.set(ArithFlagBit::NoInf)
    }
}

impl fmt::Debug for ArithmeticFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (i, name) in ARITH_NAMES.iter().enumerate() {
            if self.bits & (1 << i) != 0 {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

enum CompareFlagBit {
    Unsigned,
    Unordered,
}

/// Comparison qualifiers: unsigned-vs-signed integer compares, and
/// ordered-vs-unordered float NaN handling.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CompareFlags {
    bits: u8,
}

impl CompareFlags {
    pub fn new() -> Self {
        Self { bits: 0 }
    }

    fn read(self, bit: CompareFlagBit) -> bool {
        self.bits & (1 << bit as u8) != 0
    }

    fn set(&mut self, bit: CompareFlagBit) {
        self.bits |= 1 << bit as u8;
    }

    pub fn unsigned(self) -> bool {
        self.read(CompareFlagBit::Unsigned)
    }
    pub fn set_unsigned(&mut self) {
        self.set(CompareFlagBit::Unsigned)
    }

    /// Unordered compares treat any NaN operand as making the compare
    /// true (IEEE `u*` predicates); ordered (the default) treat it as false.
    pub fn unordered(self) -> bool {
        self.read(CompareFlagBit::Unordered)
    }
    pub fn set_unordered(&mut self) {
        self.set(CompareFlagBit::Unordered)
    }
}

impl fmt::Debug for CompareFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.unsigned() {
            write!(f, "unsigned ")?;
        }
        if self.unordered() {
            write!(f, "unordered")?;
        } else {
            write!(f, "ordered")?;
        }
        Ok(())
    }
}
