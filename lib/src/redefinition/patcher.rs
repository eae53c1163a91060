//! Default implementations of the class file collaborators

use super::{
    ClassParser, ConstantPoolComparator, ConstantPoolPatcher, LoaderId, RedefinitionError,
    RedefinitionRejected, RenameRules,
};
use crate::jvm::class_file::{ClassFile, ConstantsReader, Version};
use crate::jvm::{self, BinaryName, Constant, ConstantIndex, Utf8ConstantIndex};
use crate::util::{Offset, OffsetVec};
use std::collections::HashSet;

/// Decodes class files and performs the checks that precede defining a class
pub struct ClassFileParser {
    pub max_supported_version: Version,
}

impl ClassParser for ClassFileParser {
    fn parse(
        &self,
        _loader: LoaderId,
        name: &BinaryName,
        bytes: &[u8],
    ) -> Result<ClassFile, RedefinitionRejected> {
        let class = ClassFile::parse(bytes)?;

        if class.version > self.max_supported_version {
            return Err(RedefinitionRejected::with_message(
                RedefinitionError::UnsupportedVersion,
                format!(
                    "{} has class file version {}, newest supported is {}",
                    name, class.version, self.max_supported_version
                ),
            ));
        }

        let this_name = class.name()?;
        let is_circular = class.super_name()? == Some(this_name)
            || class.interface_names()?.contains(&this_name);
        if is_circular {
            return Err(RedefinitionRejected::with_message(
                RedefinitionError::CircularClassDefinition,
                format!("{} is its own supertype", this_name),
            ));
        }

        Ok(class)
    }
}

/// Constant pool entries are the same reference when they resolve to the same symbolic constant
///
/// Entries that don't resolve (eg. a dangling index) are never the same as anything.
pub struct SymbolicComparator;

impl ConstantPoolComparator for SymbolicComparator {
    fn is_same_reference(
        &self,
        pool_a: &OffsetVec<Constant>,
        index_a: ConstantIndex,
        pool_b: &OffsetVec<Constant>,
        index_b: ConstantIndex,
    ) -> bool {
        match (pool_a.get_symbolic(index_a), pool_b.get_symbolic(index_b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Applies rename rules by rewriting `Utf8` constants in place
///
/// Entries keep their positions, so nothing else in the class needs to change. A `Utf8` entry that
/// is also the contents of a string literal keeps its original text for the literal: the literal
/// is pointed at a copy appended to the pool.
pub struct ConstantPoolRewriter;

impl ConstantPoolPatcher for ConstantPoolRewriter {
    fn patch(&self, bytes: &[u8], rules: &RenameRules) -> Result<Vec<u8>, RedefinitionRejected> {
        let mut class = ClassFile::parse(bytes)?;

        let literals: HashSet<ConstantIndex> = class
            .constants
            .values()
            .filter_map(|constant| match constant {
                Constant::String(utf8) => Some(utf8.0),
                _ => None,
            })
            .collect();

        let offsets: Vec<Offset> = class.constants.iter().map(|(offset, _)| offset).collect();
        let mut preserved_literals = vec![];
        for (offset, constant) in offsets.into_iter().zip(class.constants.values_mut()) {
            if let Constant::Utf8(utf8) = constant {
                if let Some(rewritten) = rules.substitute(utf8) {
                    let index = ConstantIndex(offset.0 as u16);
                    if literals.contains(&index) {
                        preserved_literals.push((index, utf8.clone()));
                    }
                    *utf8 = rewritten;
                }
            }
        }

        for (index, original) in preserved_literals {
            let copy = append_constant(&mut class.constants, Constant::Utf8(original))?;
            for constant in class.constants.values_mut() {
                if let Constant::String(utf8) = constant {
                    if utf8.0 == index {
                        *utf8 = Utf8ConstantIndex(copy);
                    }
                }
            }
        }

        Ok(class.to_bytes()?)
    }
}

fn append_constant(
    constants: &mut OffsetVec<Constant>,
    constant: Constant,
) -> Result<ConstantIndex, jvm::Error> {
    let offset = constants.offset_len().0;
    if offset + 1 > u16::MAX as usize {
        return Err(jvm::Error::ConstantPoolOverflow { constant, offset });
    }
    constants.push(constant);
    Ok(ConstantIndex(offset as u16))
}
