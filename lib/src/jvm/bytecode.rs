//! Decoding of raw JVM bytecode, just far enough to find instruction boundaries and the constant
//! pool operands of each instruction.
//!
//! Nothing here interprets branches or the operand stack. Instruction lengths follow the table in
//! [chapter 6 of the JVM specification][0], including the variable length `tableswitch`,
//! `lookupswitch`, and `wide` forms.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html

use super::{ConstantIndex, Error};

pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const IINC: u8 = 0x84;
pub const WIDE: u8 = 0xc4;

/// Instructions whose operand is a constant pool index that is compared symbolically when
/// deciding whether a method body changed
///
/// `anewarray`, `checkcast`, `instanceof`, and `multianewarray` also carry class indices, but they
/// are deliberately left out.
pub fn reads_constant_pool(opcode: u8) -> bool {
    matches!(
        opcode,
        LDC | LDC_W
            | LDC2_W
            | NEW
            | INVOKEDYNAMIC
            | GETSTATIC
            | PUTSTATIC
            | GETFIELD
            | PUTFIELD
            | INVOKEVIRTUAL
            | INVOKESPECIAL
            | INVOKESTATIC
            | INVOKEINTERFACE
    )
}

/// Length of the instruction starting at `offset`, including its opcode
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize, Error> {
    let opcode = *code.get(offset).ok_or(Error::MalformedCode(offset))?;
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        TABLESWITCH => {
            let operands = offset + 1 + switch_padding(offset);
            let low = read_i32(code, operands + 4)?;
            let high = read_i32(code, operands + 8)?;
            if high < low {
                return Err(Error::MalformedCode(offset));
            }
            let targets = (high as i64 - low as i64 + 1) as usize;
            1 + switch_padding(offset) + 12 + targets * 4
        }
        LOOKUPSWITCH => {
            let operands = offset + 1 + switch_padding(offset);
            let npairs = read_i32(code, operands + 4)?;
            if npairs < 0 {
                return Err(Error::MalformedCode(offset));
            }
            1 + switch_padding(offset) + 8 + npairs as usize * 8
        }
        0xac..=0xb1 => 1,
        GETSTATIC..=INVOKESPECIAL | INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(Error::MalformedCode(offset)),
        },
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return Err(Error::MalformedCode(offset)),
    };
    if offset + length > code.len() {
        return Err(Error::MalformedCode(offset));
    }
    Ok(length)
}

/// Switch operands are aligned to a multiple of 4 from the start of the code array
fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, Error> {
    match code.get(at..at + 4) {
        Some(bytes) => Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(Error::MalformedCode(at)),
    }
}

/// One decoded instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub length: usize,

    /// Constant pool operand, for instructions where [`reads_constant_pool`] holds
    pub constant: Option<ConstantIndex>,
}

/// Iterate over the instructions of a code array
///
/// Decoding stops at the first malformed instruction, which is yielded as an error.
pub struct InstructionIter<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> InstructionIter<'a> {
    pub fn new(code: &'a [u8]) -> InstructionIter<'a> {
        InstructionIter {
            code,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = Result<Instruction, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        let length = match instruction_length(self.code, offset) {
            Ok(length) => length,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };
        let opcode = self.code[offset];
        let constant = if !reads_constant_pool(opcode) {
            None
        } else if opcode == LDC {
            Some(ConstantIndex(self.code[offset + 1] as u16))
        } else {
            let high = self.code[offset + 1] as u16;
            let low = self.code[offset + 2] as u16;
            Some(ConstantIndex(high << 8 | low))
        };
        self.offset += length;
        Some(Ok(Instruction {
            offset,
            opcode,
            length,
            constant,
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(code: &[u8]) -> Vec<Instruction> {
        InstructionIter::new(code).collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn constant_operands() {
        // ldc #3; invokestatic #258; new #7; return
        let code = [LDC, 3, INVOKESTATIC, 1, 2, NEW, 0, 7, 0xb1];
        let constants: Vec<_> = decode(&code).iter().map(|insn| insn.constant).collect();
        assert_eq!(
            constants,
            vec![
                Some(ConstantIndex(3)),
                Some(ConstantIndex(258)),
                Some(ConstantIndex(7)),
                None
            ]
        );
    }

    #[test]
    fn class_operands_are_not_compared() {
        // checkcast #5; instanceof #5; anewarray #5
        let code = [0xc0, 0, 5, 0xc1, 0, 5, 0xbd, 0, 5];
        assert!(decode(&code).iter().all(|insn| insn.constant.is_none()));
    }

    #[test]
    fn invoke_interface_and_dynamic() {
        let code = [INVOKEINTERFACE, 0, 9, 1, 0, INVOKEDYNAMIC, 0, 10, 0, 0];
        let insns = decode(&code);
        assert_eq!(insns.len(), 2);
        assert_eq!(insns[1].offset, 5);
        assert_eq!(insns[1].constant, Some(ConstantIndex(10)));
    }

    #[test]
    fn wide_forms() {
        // wide iload 300; wide iinc 300 -1
        let code = [WIDE, 0x15, 1, 44, WIDE, IINC, 1, 44, 0xff, 0xff];
        let insns = decode(&code);
        assert_eq!(insns.iter().map(|i| i.length).collect::<Vec<_>>(), vec![4, 6]);
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        // nop; tableswitch (2 bytes padding) default, low=0, high=1, 2 targets
        let mut code = vec![0x00, TABLESWITCH, 0, 0];
        code.extend_from_slice(&[0, 0, 0, 0]);
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        // lookupswitch at offset 24 (3 bytes padding), no pairs
        code.extend_from_slice(&[LOOKUPSWITCH, 0, 0, 0]);
        code.extend_from_slice(&[0; 4]);
        code.extend_from_slice(&0i32.to_be_bytes());
        code.push(LDC);
        code.push(1);

        let insns = decode(&code);
        assert_eq!(insns[1].length, 1 + 2 + 12 + 8);
        assert_eq!(insns[2].offset, 24);
        assert_eq!(insns[2].length, 1 + 3 + 8);
        assert_eq!(insns[3].constant, Some(ConstantIndex(1)));
    }

    #[test]
    fn truncated_and_unknown() {
        assert!(InstructionIter::new(&[INVOKESTATIC, 0]).any(|insn| insn.is_err()));
        assert!(InstructionIter::new(&[0xfe]).any(|insn| insn.is_err()));
        assert_eq!(InstructionIter::new(&[0xfe, 0x00]).count(), 1);
    }
}
