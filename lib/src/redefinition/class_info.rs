use super::{ClassRef, Fingerprint, LoadedClass, LoaderId};
use crate::jvm::class_file::ClassFile;
use crate::jvm::BinaryName;
use std::sync::{Arc, Weak};

/// Index of a [`HotSwapClassInfo`] in its session
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassInfoId(pub usize);

/// Mutable record of one class taking part in a redefinition
///
/// Infos live in the session that created them and are dropped with it, after being folded into
/// [`ImmutableClassInfo`]s for the inner class cache.
#[derive(Debug)]
pub struct HotSwapClassInfo {
    /// Name under which the class was requested (or fetched)
    pub name: BinaryName,

    /// Name the class takes once the batch is applied, when matching renamed it
    pub new_name: Option<BinaryName>,
    pub loader: LoaderId,

    /// Loaded class this info was matched to
    pub class: Option<ClassRef>,

    /// New definition, `None` for placeholders standing in for an outer class that isn't part of
    /// the batch
    pub bytes: Option<Vec<u8>>,

    /// New definition after class renames were patched in
    pub patched_bytes: Option<Vec<u8>>,
    pub parsed: Option<Arc<ClassFile>>,
    pub fingerprint: Fingerprint,

    pub outer: Option<ClassInfoId>,
    pub inner: Vec<ClassInfoId>,

    /// Previous inner classes left out of the batch but still in use
    pub retained: Vec<Arc<ImmutableClassInfo>>,

    pub is_enum_switch_helper: bool,

    /// The final name was generated by the engine
    pub is_hot_class: bool,
}

impl HotSwapClassInfo {
    pub fn new(
        loader: LoaderId,
        name: BinaryName,
        bytes: Vec<u8>,
        parsed: ClassFile,
        fingerprint: Fingerprint,
        is_enum_switch_helper: bool,
    ) -> HotSwapClassInfo {
        HotSwapClassInfo {
            name,
            new_name: None,
            loader,
            class: None,
            bytes: Some(bytes),
            patched_bytes: None,
            parsed: Some(Arc::new(parsed)),
            fingerprint,
            outer: None,
            inner: vec![],
            retained: vec![],
            is_enum_switch_helper,
            is_hot_class: false,
        }
    }

    /// Stand-in for a loaded outer class whose inner classes are being redefined without it
    pub fn placeholder(loader: LoaderId, name: BinaryName, class: ClassRef) -> HotSwapClassInfo {
        HotSwapClassInfo {
            name,
            new_name: None,
            loader,
            class: Some(class),
            bytes: None,
            patched_bytes: None,
            parsed: None,
            fingerprint: Fingerprint::default(),
            outer: None,
            inner: vec![],
            retained: vec![],
            is_enum_switch_helper: false,
            is_hot_class: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.bytes.is_none()
    }

    /// Name after the rename from matching (if any)
    pub fn final_name(&self) -> &BinaryName {
        self.new_name.as_ref().unwrap_or(&self.name)
    }

    /// Definition to apply (patched if renames touched it)
    pub fn final_bytes(&self) -> Option<&[u8]> {
        self.patched_bytes.as_deref().or(self.bytes.as_deref())
    }
}

/// What is remembered about a class between redefinitions, for matching its inner classes again
///
/// The loaded class is held weakly so that an unloaded class does not linger in the cache.
#[derive(Debug)]
pub struct ImmutableClassInfo {
    pub name: BinaryName,
    pub loader: LoaderId,
    class: Option<Weak<dyn LoadedClass>>,
    pub fingerprint: Fingerprint,
    pub inner: Vec<Arc<ImmutableClassInfo>>,
    pub is_enum_switch_helper: bool,
}

impl ImmutableClassInfo {
    pub fn new(
        name: BinaryName,
        loader: LoaderId,
        class: Option<&ClassRef>,
        fingerprint: Fingerprint,
        inner: Vec<Arc<ImmutableClassInfo>>,
        is_enum_switch_helper: bool,
    ) -> ImmutableClassInfo {
        ImmutableClassInfo {
            name,
            loader,
            class: class.map(Arc::downgrade),
            fingerprint,
            inner,
            is_enum_switch_helper,
        }
    }

    /// Loaded class, unless there never was one or it has since been unloaded
    pub fn class(&self) -> Option<ClassRef> {
        self.class.as_ref().and_then(Weak::upgrade)
    }

    /// Tracked a loaded class that no longer exists
    pub fn is_reclaimed(&self) -> bool {
        matches!(&self.class, Some(class) if class.strong_count() == 0)
    }

    /// This info and all infos nested in it, outer classes first
    pub fn flatten(self: &Arc<Self>) -> Vec<Arc<ImmutableClassInfo>> {
        let mut flattened = vec![self.clone()];
        let mut next = 0;
        while next < flattened.len() {
            let inner = flattened[next].inner.clone();
            flattened.extend(inner);
            next += 1;
        }
        flattened
    }
}
