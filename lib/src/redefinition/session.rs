use super::{ClassInfoId, HotSwapClassInfo, ImmutableClassInfo, LoaderId, RenameRules};
use crate::jvm::BinaryName;
use std::sync::Arc;

/// State of one redefinition, threaded through matching, detection, and application
///
/// Class infos are stored in an arena and refer to each other by [`ClassInfoId`]. Sessions are
/// independent values: nothing here is shared between redefinitions.
#[derive(Debug, Default)]
pub struct RedefinitionSession {
    pub restricted: bool,
    infos: Vec<HotSwapClassInfo>,

    /// Infos with no outer class in the session
    roots: Vec<ClassInfoId>,

    /// Class renames decided by matching
    pub rules: RenameRules,

    /// Previous inner classes with no counterpart in the new batch
    pub removed: Vec<Arc<ImmutableClassInfo>>,
}

impl RedefinitionSession {
    pub fn new(restricted: bool) -> RedefinitionSession {
        RedefinitionSession {
            restricted,
            ..RedefinitionSession::default()
        }
    }

    /// Add an info (not yet attached to any outer class)
    pub fn add(&mut self, info: HotSwapClassInfo) -> ClassInfoId {
        self.infos.push(info);
        ClassInfoId(self.infos.len() - 1)
    }

    pub fn info(&self, id: ClassInfoId) -> &HotSwapClassInfo {
        &self.infos[id.0]
    }

    pub fn info_mut(&mut self, id: ClassInfoId) -> &mut HotSwapClassInfo {
        &mut self.infos[id.0]
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassInfoId> {
        (0..self.infos.len()).map(ClassInfoId)
    }

    pub fn roots(&self) -> &[ClassInfoId] {
        &self.roots
    }

    pub fn add_root(&mut self, id: ClassInfoId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Nest `inner` in `outer`
    pub fn attach(&mut self, outer: ClassInfoId, inner: ClassInfoId) {
        self.roots.retain(|root| *root != inner);
        self.infos[inner.0].outer = Some(outer);
        self.infos[outer.0].inner.push(inner);
    }

    /// Info requested under this name
    pub fn find(&self, loader: LoaderId, name: &BinaryName) -> Option<ClassInfoId> {
        self.infos
            .iter()
            .position(|info| info.loader == loader && &info.name == name)
            .map(ClassInfoId)
    }

    /// Whether some info already ends up with this name
    pub fn has_final_name(&self, loader: LoaderId, name: &BinaryName) -> bool {
        self.infos
            .iter()
            .any(|info| info.loader == loader && info.final_name() == name)
    }

    /// Every info reachable from the roots, outer classes before their inner classes
    pub fn ordered(&self) -> Vec<ClassInfoId> {
        let mut ordered = vec![];
        let mut stack: Vec<ClassInfoId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            ordered.push(id);
            stack.extend(self.infos[id.0].inner.iter().rev().copied());
        }
        ordered
    }

    /// Snapshot an info and its inner classes for the inner class cache
    pub fn freeze(&self, id: ClassInfoId) -> Arc<ImmutableClassInfo> {
        let info = &self.infos[id.0];
        let inner = info
            .inner
            .iter()
            .map(|inner| self.freeze(*inner))
            .chain(info.retained.iter().cloned())
            .collect();
        Arc::new(ImmutableClassInfo::new(
            info.final_name().clone(),
            info.loader,
            info.class.as_ref(),
            info.fingerprint.clone(),
            inner,
            info.is_enum_switch_helper,
        ))
    }
}
