use crate::jvm::class_file::{
    find_attribute, Attribute, Code, ConstantsReader, Deserialize, Serialize,
};
use crate::jvm::{Constant, Error, MethodAccessFlags, Utf8ConstantIndex};
use crate::util::OffsetVec;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name<'a>(&self, constants: &'a OffsetVec<Constant>) -> Result<&'a str, Error> {
        constants.get_utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, constants: &'a OffsetVec<Constant>) -> Result<&'a str, Error> {
        constants.get_utf8(self.descriptor_index)
    }

    /// Decoded `Code` attribute (absent for `abstract` and `native` methods)
    pub fn code(&self, constants: &OffsetVec<Constant>) -> Result<Option<Code>, Error> {
        find_attribute(&self.attributes, constants)
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
