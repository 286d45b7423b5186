//! The raw instruction stream a [`crate::method::MethodRef`] carries
//! (`spec.md` §4.3 "Input: ... an instruction stream (stack bytecode)").
//!
//! One byte tag per opcode, little-endian fixed-width immediates, branch
//! targets stored as absolute byte offsets into the same stream. This is
//! deliberately a small, made-up encoding, not a literal CIL/MSIL reader:
//! the original bytecode format is out of scope, only the stack-machine
//! *shape* the decoder has to handle matters here.

use std::fmt;

/// One decoded instruction, paired with its byte offset by [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawOpcode {
    Nop,
    LdcI4(i32),
    LdcI8(i64),
    LdcR4(f32),
    LdcR8(f64),
    LdArg(u16),
    LdLoc(u16),
    StLoc(u16),
    Dup,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    ShrUn,
    Shr,
    Neg,
    Not,
    /// Convert the top of stack to an integer of the given width/signedness.
    ConvInt { bits: u8, signed: bool },
    /// Convert the top of stack to a float of the given width.
    ConvFloat { bits: u8 },
    Ceq,
    CltI,
    CltUn,
    CgtI,
    CgtUn,
    Cle,
    Cge,
    /// Unconditional jump to an absolute offset.
    Br(u32),
    /// Pop a bool; jump to `target` if true, otherwise fall through.
    BrTrue(u32),
    /// Pop a bool; jump to `target` if false, otherwise fall through.
    BrFalse(u32),
    /// Pop an integer index; jump to `targets[index]`, or `default` if
    /// the index is out of range.
    Switch { targets: Vec<u32>, default: u32 },
    /// Index into `MethodRef::calls`.
    Call(u32),
    Ret,
    /// Pop `(view, index)`, push the loaded element.
    LdElem,
    /// Pop `(view, index, value)`, store `value` at `view[index]`.
    StElem,
    /// Index into `MethodRef::arrays`: push a view over a statically
    /// allocated constant blob (`spec.md` §4.3 "array-creation and
    /// array-initialization ... lowered into a view-cast of a statically
    /// allocated constant blob").
    LdStaticArray(u32),
    /// Pop a struct-typed base, push `fields[index]`.
    LdField(u32),
    /// Pop `(base, value)`, write `value` into `base`'s `fields[index]`.
    StField(u32),
    Unreachable,
}

impl RawOpcode {
    /// The byte tag this opcode encodes to/from, used only for
    /// `UnsupportedInstruction`'s diagnostic payload.
    pub fn tag(&self) -> u8 {
        match self {
            RawOpcode::Nop => 0x00,
            RawOpcode::LdcI4(_) => 0x01,
            RawOpcode::LdcI8(_) => 0x02,
            RawOpcode::LdcR4(_) => 0x03,
            RawOpcode::LdcR8(_) => 0x04,
            RawOpcode::LdArg(_) => 0x05,
            RawOpcode::LdLoc(_) => 0x06,
            RawOpcode::StLoc(_) => 0x07,
            RawOpcode::Dup => 0x08,
            RawOpcode::Pop => 0x09,
            RawOpcode::Add => 0x0A,
            RawOpcode::Sub => 0x0B,
            RawOpcode::Mul => 0x0C,
            RawOpcode::Div => 0x0D,
            RawOpcode::DivUn => 0x0E,
            RawOpcode::Rem => 0x0F,
            RawOpcode::RemUn => 0x10,
            RawOpcode::And => 0x11,
            RawOpcode::Or => 0x12,
            RawOpcode::Xor => 0x13,
            RawOpcode::Shl => 0x14,
            RawOpcode::ShrUn => 0x15,
            RawOpcode::Shr => 0x16,
            RawOpcode::Neg => 0x17,
            RawOpcode::Not => 0x18,
            RawOpcode::ConvInt { .. } => 0x19,
            RawOpcode::ConvFloat { .. } => 0x1A,
            RawOpcode::Ceq => 0x1B,
            RawOpcode::CltI => 0x1C,
            RawOpcode::CltUn => 0x1D,
            RawOpcode::CgtI => 0x1E,
            RawOpcode::CgtUn => 0x1F,
            RawOpcode::Cle => 0x20,
            RawOpcode::Cge => 0x21,
            RawOpcode::Br(_) => 0x22,
            RawOpcode::BrTrue(_) => 0x23,
            RawOpcode::BrFalse(_) => 0x24,
            RawOpcode::Switch { .. } => 0x25,
            RawOpcode::Call(_) => 0x26,
            RawOpcode::Ret => 0x27,
            RawOpcode::LdElem => 0x28,
            RawOpcode::StElem => 0x29,
            RawOpcode::LdStaticArray(_) => 0x2A,
            RawOpcode::LdField(_) => 0x2B,
            RawOpcode::StField(_) => 0x2C,
            RawOpcode::Unreachable => 0x2D,
        }
    }

    /// Every absolute offset this opcode can transfer control to,
    /// including the implicit fallthrough target for conditional
    /// branches — used to seed the decoder's block-boundary scan.
    pub fn branch_targets(&self, fallthrough: u32) -> Vec<u32> {
        match self {
            RawOpcode::Br(t) => vec![*t],
            RawOpcode::BrTrue(t) | RawOpcode::BrFalse(t) => vec![*t, fallthrough],
            RawOpcode::Switch { targets, default } => {
                let mut v = targets.clone();
                v.push(*default);
                v
            }
            _ => vec![],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            RawOpcode::Br(_)
                | RawOpcode::BrTrue(_)
                | RawOpcode::BrFalse(_)
                | RawOpcode::Switch { .. }
                | RawOpcode::Ret
                | RawOpcode::Unreachable
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed bytecode at offset {offset}: {reason}")]
pub struct DecodeError {
    pub offset: u32,
    pub reason: String,
}

/// Decode `bytes` into `(offset, opcode)` pairs in stream order.
pub fn decode(bytes: &[u8]) -> Result<Vec<(u32, RawOpcode)>, DecodeError> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let offset = cursor as u32;
        let tag = bytes[cursor];
        cursor += 1;
        let mut take = |n: usize| -> Result<&[u8], DecodeError> {
            if cursor + n > bytes.len() {
                return Err(DecodeError {
                    offset,
                    reason: format!("truncated operand for tag {tag:#04x}"),
                });
            }
            let s = &bytes[cursor..cursor + n];
            cursor += n;
            Ok(s)
        };
        let op = match tag {
            0x00 => RawOpcode::Nop,
            0x01 => RawOpcode::LdcI4(i32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x02 => RawOpcode::LdcI8(i64::from_le_bytes(take(8)?.try_into().unwrap())),
            0x03 => RawOpcode::LdcR4(f32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x04 => RawOpcode::LdcR8(f64::from_le_bytes(take(8)?.try_into().unwrap())),
            0x05 => RawOpcode::LdArg(u16::from_le_bytes(take(2)?.try_into().unwrap())),
            0x06 => RawOpcode::LdLoc(u16::from_le_bytes(take(2)?.try_into().unwrap())),
            0x07 => RawOpcode::StLoc(u16::from_le_bytes(take(2)?.try_into().unwrap())),
            0x08 => RawOpcode::Dup,
            0x09 => RawOpcode::Pop,
            0x0A => RawOpcode::Add,
            0x0B => RawOpcode::Sub,
            0x0C => RawOpcode::Mul,
            0x0D => RawOpcode::Div,
            0x0E => RawOpcode::DivUn,
            0x0F => RawOpcode::Rem,
            0x10 => RawOpcode::RemUn,
            0x11 => RawOpcode::And,
            0x12 => RawOpcode::Or,
            0x13 => RawOpcode::Xor,
            0x14 => RawOpcode::Shl,
            0x15 => RawOpcode::ShrUn,
            0x16 => RawOpcode::Shr,
            0x17 => RawOpcode::Neg,
            0x18 => RawOpcode::Not,
            0x19 => {
                let b = take(2)?;
                RawOpcode::ConvInt { bits: b[0], signed: b[1] != 0 }
            }
            0x1A => RawOpcode::ConvFloat { bits: take(1)?[0] },
            0x1B => RawOpcode::Ceq,
            0x1C => RawOpcode::CltI,
            0x1D => RawOpcode::CltUn,
            0x1E => RawOpcode::CgtI,
            0x1F => RawOpcode::CgtUn,
            0x20 => RawOpcode::Cle,
            0x21 => RawOpcode::Cge,
            0x22 => RawOpcode::Br(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x23 => RawOpcode::BrTrue(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x24 => RawOpcode::BrFalse(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x25 => {
                let count = u32::from_le_bytes(take(4)?.try_into().unwrap()) as usize;
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(u32::from_le_bytes(take(4)?.try_into().unwrap()));
                }
                let default = u32::from_le_bytes(take(4)?.try_into().unwrap());
                RawOpcode::Switch { targets, default }
            }
            0x26 => RawOpcode::Call(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x27 => RawOpcode::Ret,
            0x28 => RawOpcode::LdElem,
            0x29 => RawOpcode::StElem,
            0x2A => RawOpcode::LdStaticArray(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x2B => RawOpcode::LdField(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x2C => RawOpcode::StField(u32::from_le_bytes(take(4)?.try_into().unwrap())),
            0x2D => RawOpcode::Unreachable,
            other => {
                return Err(DecodeError {
                    offset,
                    reason: format!("unknown opcode tag {other:#04x}"),
                })
            }
        };
        out.push((offset, op));
    }
    Ok(out)
}

/// A forward-referencing label in an [`Assembler`] stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

enum Fixup {
    Br { at: usize, label: Label },
    BrTrue { at: usize, label: Label },
    BrFalse { at: usize, label: Label },
    Switch { at: usize, case_count: usize, labels: Vec<Label>, default: Label },
}

impl fmt::Debug for Fixup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fixup")
    }
}

/// Two-pass assembler for hand-written test/integration bytecode: emit
/// opcodes and labels in any order, then [`Assembler::finish`] patches
/// every forward reference to its label's final byte offset. Mirrors how
/// a real assembler resolves labels, so tests read like straight-line
/// bytecode instead of manually computed offset arithmetic.
#[derive(Default)]
pub struct Assembler {
    bytes: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current end of the stream (the next
    /// instruction emitted starts this label's block).
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.bytes.len() as u32);
    }

    fn push(&mut self, tag: u8) {
        self.bytes.push(tag);
    }

    pub fn nop(&mut self) -> &mut Self {
        self.push(0x00);
        self
    }
    pub fn ldc_i4(&mut self, v: i32) -> &mut Self {
        self.push(0x01);
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn ldc_i8(&mut self, v: i64) -> &mut Self {
        self.push(0x02);
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn ldc_r4(&mut self, v: f32) -> &mut Self {
        self.push(0x03);
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn ldc_r8(&mut self, v: f64) -> &mut Self {
        self.push(0x04);
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn ld_arg(&mut self, i: u16) -> &mut Self {
        self.push(0x05);
        self.bytes.extend_from_slice(&i.to_le_bytes());
        self
    }
    pub fn ld_loc(&mut self, i: u16) -> &mut Self {
        self.push(0x06);
        self.bytes.extend_from_slice(&i.to_le_bytes());
        self
    }
    pub fn st_loc(&mut self, i: u16) -> &mut Self {
        self.push(0x07);
        self.bytes.extend_from_slice(&i.to_le_bytes());
        self
    }
    pub fn dup(&mut self) -> &mut Self {
        self.push(0x08);
        self
    }
    pub fn pop(&mut self) -> &mut Self {
        self.push(0x09);
        self
    }
    pub fn add(&mut self) -> &mut Self {
        self.push(0x0A);
        self
    }
    pub fn sub(&mut self) -> &mut Self {
        self.push(0x0B);
        self
    }
    pub fn mul(&mut self) -> &mut Self {
        self.push(0x0C);
        self
    }
    pub fn div(&mut self) -> &mut Self {
        self.push(0x0D);
        self
    }
    pub fn div_un(&mut self) -> &mut Self {
        self.push(0x0E);
        self
    }
    pub fn rem(&mut self) -> &mut Self {
        self.push(0x0F);
        self
    }
    pub fn and(&mut self) -> &mut Self {
        self.push(0x11);
        self
    }
    pub fn shl(&mut self) -> &mut Self {
        self.push(0x14);
        self
    }
    pub fn shr_un(&mut self) -> &mut Self {
        self.push(0x15);
        self
    }
    pub fn neg(&mut self) -> &mut Self {
        self.push(0x17);
        self
    }
    pub fn conv_int(&mut self, bits: u8, signed: bool) -> &mut Self {
        self.push(0x19);
        self.bytes.push(bits);
        self.bytes.push(signed as u8);
        self
    }
    pub fn conv_float(&mut self, bits: u8) -> &mut Self {
        self.push(0x1A);
        self.bytes.push(bits);
        self
    }
    pub fn ceq(&mut self) -> &mut Self {
        self.push(0x1B);
        self
    }
    pub fn clt(&mut self) -> &mut Self {
        self.push(0x1C);
        self
    }
    pub fn cgt(&mut self) -> &mut Self {
        self.push(0x1E);
        self
    }
    pub fn call(&mut self, idx: u32) -> &mut Self {
        self.push(0x26);
        self.bytes.extend_from_slice(&idx.to_le_bytes());
        self
    }
    pub fn ret(&mut self) -> &mut Self {
        self.push(0x27);
        self
    }
    pub fn ld_elem(&mut self) -> &mut Self {
        self.push(0x28);
        self
    }
    pub fn st_elem(&mut self) -> &mut Self {
        self.push(0x29);
        self
    }
    pub fn ld_static_array(&mut self, idx: u32) -> &mut Self {
        self.push(0x2A);
        self.bytes.extend_from_slice(&idx.to_le_bytes());
        self
    }
    pub fn ld_field(&mut self, idx: u32) -> &mut Self {
        self.push(0x2B);
        self.bytes.extend_from_slice(&idx.to_le_bytes());
        self
    }
    pub fn st_field(&mut self, idx: u32) -> &mut Self {
        self.push(0x2C);
        self.bytes.extend_from_slice(&idx.to_le_bytes());
        self
    }
    pub fn unreachable(&mut self) -> &mut Self {
        self.push(0x2D);
        self
    }

    pub fn br(&mut self, label: Label) -> &mut Self {
        let at = self.bytes.len();
        self.push(0x22);
        self.bytes.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup::Br { at: at + 1, label });
        self
    }

    pub fn br_true(&mut self, label: Label) -> &mut Self {
        let at = self.bytes.len();
        self.push(0x23);
        self.bytes.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup::BrTrue { at: at + 1, label });
        self
    }

    pub fn br_false(&mut self, label: Label) -> &mut Self {
        let at = self.bytes.len();
        self.push(0x24);
        self.bytes.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup::BrFalse { at: at + 1, label });
        self
    }

    pub fn switch(&mut self, labels: Vec<Label>, default: Label) -> &mut Self {
        let at = self.bytes.len();
        self.push(0x25);
        self.bytes.extend_from_slice(&(labels.len() as u32).to_le_bytes());
        let case_count = labels.len();
        for _ in 0..case_count {
            self.bytes.extend_from_slice(&[0; 4]);
        }
        self.bytes.extend_from_slice(&[0; 4]);
        self.fixups.push(Fixup::Switch { at: at + 1, case_count, labels, default });
        self
    }

    /// Patch every forward reference and return the finished stream.
    pub fn finish(mut self) -> Vec<u8> {
        for fixup in &self.fixups {
            match fixup {
                Fixup::Br { at, label } | Fixup::BrTrue { at, label } | Fixup::BrFalse { at, label } => {
                    let target = self.labels[label.0].expect("unbound label");
                    self.bytes[*at..*at + 4].copy_from_slice(&target.to_le_bytes());
                }
                Fixup::Switch { at, case_count, labels, default } => {
                    let mut pos = *at + 4; // past the case count
                    for label in labels {
                        let target = self.labels[label.0].expect("unbound label");
                        self.bytes[pos..pos + 4].copy_from_slice(&target.to_le_bytes());
                        pos += 4;
                    }
                    let default_target = self.labels[default.0].expect("unbound label");
                    self.bytes[pos..pos + 4].copy_from_slice(&default_target.to_le_bytes());
                    let _ = case_count;
                }
            }
        }
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembler_round_trips_through_decode() {
        let mut asm = Assembler::new();
        let top = asm.new_label();
        asm.bind(top);
        asm.ld_arg(0).ldc_i4(1).add().st_loc(0).br(top);
        let bytes = asm.finish();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded[0], (0, RawOpcode::LdArg(0)));
        match decoded.last().unwrap() {
            (_, RawOpcode::Br(0)) => {}
            other => panic!("expected a backward branch to offset 0, got {other:?}"),
        }
    }

    #[test]
    fn rejects_truncated_operand() {
        let bytes = [0x01, 0x00, 0x00]; // LdcI4 needs 4 bytes, only 2 given
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn unconditional_branch_has_one_target() {
        assert_eq!(RawOpcode::Br(40).branch_targets(10), vec![40]);
    }

    #[test]
    fn conditional_branch_targets_both_arms() {
        assert_eq!(RawOpcode::BrFalse(40).branch_targets(10), vec![40, 10]);
    }
}
