use crate::jvm::class_file::{read_bytes, ConstantsReader, Deserialize, Serialize};
use crate::jvm::{
    ClassConstantIndex, Constant, ConstantIndex, Error, NameAndTypeConstantIndex,
    Utf8ConstantIndex,
};
use crate::util::OffsetVec;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// Attributes are kept in their raw form and only decoded on demand (see
/// [`find_attribute`]), so that unknown attributes survive a round trip untouched.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

impl Attribute {
    /// Name of the attribute, as found in the constant pool
    pub fn name<'a>(&self, constants: &'a OffsetVec<Constant>) -> Result<&'a str, Error> {
        constants.get_utf8(self.name_index)
    }

    /// Decode the attribute body as a typed attribute
    ///
    /// The whole body must be consumed.
    pub fn decode<A: AttributeLike>(&self) -> Result<A, Error> {
        let mut cursor = Cursor::new(self.info.as_slice());
        let decoded = A::deserialize(&mut cursor).map_err(|err| match err {
            Error::IoError(_) => Error::MalformedAttribute(A::NAME),
            other => other,
        })?;
        if cursor.position() as usize != self.info.len() {
            return Err(Error::MalformedAttribute(A::NAME));
        }
        Ok(decoded)
    }
}

/// Find and decode the first attribute named `A::NAME`
pub fn find_attribute<A: AttributeLike>(
    attributes: &[Attribute],
    constants: &OffsetVec<Constant>,
) -> Result<Option<A>, Error> {
    for attribute in attributes {
        if attribute.name(constants)? == A::NAME {
            return attribute.decode().map(Some);
        }
    }
    Ok(None)
}

/// Find the raw body of the first attribute with this name
pub fn find_raw_attribute<'a>(
    attributes: &'a [Attribute],
    constants: &OffsetVec<Constant>,
    name: &str,
) -> Result<Option<&'a [u8]>, Error> {
    for attribute in attributes {
        if attribute.name(constants)? == name {
            return Ok(Some(&attribute.info));
        }
    }
    Ok(None)
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize + Deserialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantValue(pub ConstantIndex);

impl Serialize for ConstantValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantValue(ConstantIndex::deserialize(reader)?))
    }
}

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Index `0` catches everything (used for `finally`)
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        Ok(BytecodeArray(read_bytes(reader, len as usize)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: u16::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

/// Shared layout of `LocalVariableTable` and `LocalVariableTypeTable` entries
///
/// For the type table, `descriptor_index` points to a generic signature instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: u16::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);

/// Checked exceptions a method declares
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exceptions(pub Vec<ClassConstantIndex>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.28
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestMembers(pub Vec<ClassConstantIndex>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.31
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermittedSubclasses(pub Vec<ClassConstantIndex>);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.30
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(pub Vec<RecordComponent>);

macro_rules! vec_attribute {
    ($($attribute:ident = $name:literal),*) => {
        $(
            impl Serialize for $attribute {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $attribute {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($attribute(Vec::deserialize(reader)?))
                }
            }

            impl AttributeLike for $attribute {
                const NAME: &'static str = $name;
            }
        )*
    };
}

vec_attribute!(
    LineNumberTable = "LineNumberTable",
    LocalVariableTable = "LocalVariableTable",
    LocalVariableTypeTable = "LocalVariableTypeTable",
    Exceptions = "Exceptions",
    NestMembers = "NestMembers",
    PermittedSubclasses = "PermittedSubclasses",
    Record = "Record"
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for RecordComponent {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}

impl Deserialize for RecordComponent {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(RecordComponent {
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Generic signature of a class, method, or field
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.9
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub Utf8ConstantIndex);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.29
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestHost(pub ClassConstantIndex);

impl Serialize for Signature {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for Signature {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Signature(Utf8ConstantIndex::deserialize(reader)?))
    }
}

impl AttributeLike for Signature {
    const NAME: &'static str = "Signature";
}

impl Serialize for NestHost {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for NestHost {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(NestHost(ClassConstantIndex::deserialize(reader)?))
    }
}

impl AttributeLike for NestHost {
    const NAME: &'static str = "NestHost";
}

/// Marks local and anonymous classes with the method they were declared in
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: ClassConstantIndex,

    /// Absent when the class is declared in an initializer rather than a method
    pub method: Option<NameAndTypeConstantIndex>,
}

impl Serialize for EnclosingMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class.serialize(writer)?;
        match self.method {
            None => 0u16.serialize(writer),
            Some(method) => method.serialize(writer),
        }
    }
}

impl Deserialize for EnclosingMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let class = ClassConstantIndex::deserialize(reader)?;
        let method = NameAndTypeConstantIndex::deserialize(reader)?;
        Ok(EnclosingMethod {
            class,
            method: if method.0.is_null() { None } else { Some(method) },
        })
    }
}

impl AttributeLike for EnclosingMethod {
    const NAME: &'static str = "EnclosingMethod";
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;

    #[test]
    fn typed_attributes_through_the_pool() {
        let mut pool = ConstantsPool::new();
        let outer = pool.get_class("a/Outer").unwrap();
        let nest_host = pool.get_attribute(NestHost(outer)).unwrap();
        let lines = pool
            .get_attribute(LineNumberTable(vec![LineNumber {
                start_pc: 0,
                line_number: 12,
            }]))
            .unwrap();
        let constants = pool.into_offset_vec();
        let attributes = vec![lines, nest_host];

        let found: Option<NestHost> = find_attribute(&attributes, &constants).unwrap();
        assert_eq!(found, Some(NestHost(outer)));
        let missing: Option<Signature> = find_attribute(&attributes, &constants).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 1, 0],
        };
        assert!(matches!(
            attribute.decode::<NestHost>(),
            Err(Error::MalformedAttribute("NestHost"))
        ));
        let truncated = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0],
        };
        assert!(matches!(
            truncated.decode::<NestHost>(),
            Err(Error::MalformedAttribute("NestHost"))
        ));
    }

    #[test]
    fn enclosing_method_without_method() {
        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 3, 0, 0],
        };
        let decoded: EnclosingMethod = attribute.decode().unwrap();
        assert_eq!(decoded.method, None);
    }
}
