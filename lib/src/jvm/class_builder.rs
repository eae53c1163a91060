use super::class_file::*;
use super::*;
use crate::util::OffsetVec;

/// Incrementally assemble a class file
///
/// Names and descriptors are given as strings and interned into a shared constants pool. Nothing
/// is verified beyond descriptors being well formed.
pub struct ClassBuilder {
    /// Class file, but with `constants` left blank
    class: ClassFile,

    /// Constants pool
    constants_pool: ConstantsPool,
}

impl ClassBuilder {
    /// Create a new class builder
    pub fn new(
        access_flags: ClassAccessFlags,
        this_class: &str,
        super_class: Option<&str>,
        interfaces: &[&str],
    ) -> Result<ClassBuilder, Error> {
        BinaryName::check_valid(this_class).map_err(Error::MalformedName)?;

        // Construct a fresh constant pool
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class(this_class)?;
        let super_class = match super_class {
            None => ClassConstantIndex(ConstantIndex(0)),
            Some(super_class) => constants.get_class(super_class)?,
        };
        let interfaces = interfaces
            .iter()
            .map(|interface| constants.get_class(interface))
            .collect::<Result<_, _>>()?;

        let class = ClassFile {
            version: Version::JAVA8,
            constants: OffsetVec::new(),
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };

        Ok(ClassBuilder {
            class,
            constants_pool: constants,
        })
    }

    /// Consume the builder and return the file class file
    pub fn result(mut self) -> ClassFile {
        self.class.constants = self.constants_pool.into_offset_vec();
        self.class
    }

    /// Constants pool the class is being built against (eg. for building bytecode operands)
    pub fn constants(&mut self) -> &mut ConstantsPool {
        &mut self.constants_pool
    }

    pub fn set_version(&mut self, version: Version) {
        self.class.version = version;
    }

    /// Add an attribute to the class
    pub fn add_attribute(&mut self, attribute: impl AttributeLike) -> Result<(), Error> {
        let attribute = self.constants_pool.get_attribute(attribute)?;
        self.class.attributes.push(attribute);
        Ok(())
    }

    /// Add a field to the class
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> Result<(), Error> {
        UnqualifiedName::check_valid(name).map_err(Error::MalformedName)?;
        FieldType::<BinaryName>::parse(descriptor).map_err(Error::MalformedDescriptor)?;
        let name_index = self.constants_pool.get_utf8(name)?;
        let descriptor_index = self.constants_pool.get_utf8(descriptor)?;

        self.class.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Add a method to the class
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
        mut attributes: Vec<Attribute>,
    ) -> Result<(), Error> {
        MethodDescriptor::<BinaryName>::parse(descriptor).map_err(Error::MalformedDescriptor)?;
        let name_index = self.constants_pool.get_utf8(name)?;
        let descriptor_index = self.constants_pool.get_utf8(descriptor)?;

        if let Some(code) = code {
            attributes.insert(0, self.constants_pool.get_attribute(code)?);
        }

        self.class.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }
}
