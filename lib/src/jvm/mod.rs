//! Read, write, and assemble JVM class files
//!
//! Only the parts of the class file format needed to compare two versions of a class are decoded
//! into typed structures. Everything else (unknown attributes, most bytecode) is kept raw and
//! survives a parse/serialize round trip untouched.
//!
//! ### Simple example
//!
//! ```
//! use hotswap::jvm::class_file::{ClassFile, BytecodeArray, Code};
//! use hotswap::jvm::class_builder::ClassBuilder;
//! use hotswap::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let mut builder = ClassBuilder::new(
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     "me/alec/Point",
//!     Some("java/lang/Object"),
//!     &[],
//! )?;
//! builder.add_field(FieldAccessFlags::PUBLIC, "x", "I", vec![])?;
//! builder.add_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     "zero",
//!     "()I",
//!     Some(Code {
//!         max_stack: 1,
//!         max_locals: 0,
//!         code_array: BytecodeArray(vec![0x03, 0xac]), // iconst_0; ireturn
//!         exception_table: vec![],
//!         attributes: vec![],
//!     }),
//!     vec![],
//! )?;
//!
//! // Encode the class into bytes and read it back
//! let class_bytes: Vec<u8> = builder.result().to_bytes()?;
//! let class = ClassFile::parse(&class_bytes)?;
//! assert_eq!(class.name()?, "me/alec/Point");
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod bytecode;
pub mod class_builder;
pub mod class_file;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, Constant, ConstantIndex, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex,
    StringConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
