//! Contracts the engine needs from the surrounding virtual machine
//!
//! The engine never owns classes. It talks to loaded classes through [`LoadedClass`] handles and
//! to the class loading machinery through [`ClassRegistry`]. Parsing, constant pool comparison,
//! and constant pool patching are also pluggable (see [`super::ClassFileParser`],
//! [`super::SymbolicComparator`], and [`super::ConstantPoolRewriter`] for the defaults).

use super::{ChangePacket, RedefinitionRejected, RenameRules};
use crate::jvm::class_file::ClassFile;
use crate::jvm::{BinaryName, Constant, ConstantIndex};
use crate::util::OffsetVec;
use std::fmt::Debug;
use std::sync::Arc;

/// Identity of a class loader
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoaderId(pub u64);

/// Shared handle to a loaded class
pub type ClassRef = Arc<dyn LoadedClass>;

/// A class as currently loaded in the virtual machine
pub trait LoadedClass: Send + Sync + Debug {
    fn name(&self) -> BinaryName;

    fn loader(&self) -> LoaderId;

    /// Currently active version of the class
    fn definition(&self) -> Arc<ClassFile>;

    fn superclass(&self) -> Option<ClassRef>;

    fn interfaces(&self) -> Vec<ClassRef>;

    /// Change the name the class is registered under
    fn rename(&self, new_name: &BinaryName);

    /// Stop tracking this class as a subclass of its current supertypes
    fn detach_from_hierarchy(&self);

    /// Make the new version active
    ///
    /// Returns classes whose cached state (eg. resolved members) is stale as a consequence and
    /// must be refreshed.
    fn swap_version(&self, packet: &ChangePacket) -> Vec<ClassRef>;

    /// Recompute derived state (vtables, field layout) against the current hierarchy, keeping the
    /// active version
    fn refresh(&self);

    fn rerun_static_initializer(&self) -> Result<(), String>;

    /// Drop the class from the loader's registry
    fn remove_from_registry(&self);
}

/// Class loading services
pub trait ClassRegistry: Send + Sync {
    /// Class already loaded by this loader, without triggering loading
    fn find_loaded(&self, loader: LoaderId, name: &BinaryName) -> Option<ClassRef>;

    /// Load the class if it isn't already (as resolving a supertype would)
    fn load(&self, loader: LoaderId, name: &BinaryName) -> Option<ClassRef>;

    /// Define a class from bytes, replacing any class registered under the same name
    fn define(
        &self,
        loader: LoaderId,
        name: &BinaryName,
        bytes: &[u8],
    ) -> Result<ClassRef, RedefinitionRejected>;

    /// Every loaded class that directly or indirectly extends or implements this one
    fn loaded_subclasses_of(&self, class: &ClassRef) -> Vec<ClassRef>;

    /// Raw bytes of a class as the loader would find them (eg. on the class path)
    fn resource_bytes(&self, loader: LoaderId, name: &BinaryName) -> Option<Vec<u8>>;
}

/// Class file parsing, including the checks done before a class can be defined
pub trait ClassParser: Send + Sync {
    fn parse(
        &self,
        loader: LoaderId,
        name: &BinaryName,
        bytes: &[u8],
    ) -> Result<ClassFile, RedefinitionRejected>;
}

pub trait ConstantPoolComparator: Send + Sync {
    /// Whether two constant pool entries (from possibly different pools) mean the same thing
    fn is_same_reference(
        &self,
        pool_a: &OffsetVec<Constant>,
        index_a: ConstantIndex,
        pool_b: &OffsetVec<Constant>,
        index_b: ConstantIndex,
    ) -> bool;
}

pub trait ConstantPoolPatcher: Send + Sync {
    /// Apply class renames to the constant pool of a class file
    fn patch(&self, bytes: &[u8], rules: &RenameRules) -> Result<Vec<u8>, RedefinitionRejected>;
}

/// Hook run on raw bytes before a redefinition touches any state
pub trait ClassTransformer: Send + Sync {
    /// Return `None` to leave the bytes untouched
    fn transform(&self, loader: LoaderId, name: &BinaryName, bytes: &[u8]) -> Option<Vec<u8>>;
}

pub trait RedefinitionListener: Send + Sync {
    /// Extra classes to redefine along with a batch, given what changed in it
    fn additional_classes(&self, _changes: &[ChangePacket]) -> Vec<RedefineRequest> {
        vec![]
    }

    /// Called once the batch is applied, with every class that was changed or refreshed
    fn post_redefinition(&self, changed: &[ClassRef]) -> Result<(), String>;
}

/// One class of a redefinition batch
#[derive(Clone, Debug)]
pub struct RedefineRequest {
    pub loader: LoaderId,
    pub name: BinaryName,

    /// Currently loaded version, if any
    pub class: Option<ClassRef>,
    pub bytes: Vec<u8>,
}

impl RedefineRequest {
    /// Replace the definition of a loaded class
    pub fn new(class: ClassRef, bytes: Vec<u8>) -> RedefineRequest {
        RedefineRequest {
            loader: class.loader(),
            name: class.name(),
            class: Some(class),
            bytes,
        }
    }

    /// Class known only by name (eg. an anonymous class, or one not loaded yet)
    pub fn by_name(loader: LoaderId, name: BinaryName, bytes: Vec<u8>) -> RedefineRequest {
        RedefineRequest {
            loader,
            name,
            class: None,
            bytes,
        }
    }
}
