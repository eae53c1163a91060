use super::class_file::{Constant, ConstantIndex};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Failures while decoding or encoding class files
#[derive(Debug)]
pub enum Error {
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic(u32),

    /// Constant pool entry has a tag that is not part of the class file format
    UnknownConstantTag(u8),

    /// Method handle constant with a reference kind outside of `1..=9`
    UnknownHandleKind(u8),

    /// Index does not point at the start of a constant pool entry
    BadConstantIndex(ConstantIndex),

    /// Constant pool entry exists, but is not of the expected kind
    UnexpectedConstant {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// Modified UTF-8 that could not be decoded
    MalformedUtf8(Vec<u8>),

    /// Invalid class or member name
    MalformedName(String),

    /// Invalid field or method descriptor
    MalformedDescriptor(String),

    /// An attribute body was shorter or longer than its layout requires
    MalformedAttribute(&'static str),

    /// Bytecode could not be decoded at this offset
    MalformedCode(usize),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Error::ConstantPoolOverflow { offset, .. } => {
                write!(f, "constant pool overflow at offset {}", offset)
            }
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number {:#010x}", magic),
            Error::UnknownConstantTag(tag) => write!(f, "unknown constant tag {}", tag),
            Error::UnknownHandleKind(kind) => write!(f, "unknown method handle kind {}", kind),
            Error::BadConstantIndex(index) => write!(f, "bad constant pool index #{}", index.0),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant #{} is not a {}", index.0, expected)
            }
            Error::MalformedUtf8(bytes) => write!(f, "malformed modified UTF-8 {:?}", bytes),
            Error::MalformedName(name) => write!(f, "malformed name '{}'", name),
            Error::MalformedDescriptor(msg) => write!(f, "malformed descriptor: {}", msg),
            Error::MalformedAttribute(name) => write!(f, "malformed {} attribute", name),
            Error::MalformedCode(offset) => write!(f, "malformed bytecode at offset {}", offset),
        }
    }
}

impl std::error::Error for Error {}
