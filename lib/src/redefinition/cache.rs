use super::{
    is_enum_switch_helper, referenced_local_inners, ClassRef, ClassRegistry, Fingerprint,
    ImmutableClassInfo, LoaderId,
};
use crate::jvm::{self, BinaryName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Inner class structure of outer classes, as left by the last redefinition that touched them
///
/// Entries are keyed by loader and outer class name. Lookups only take a read lock. A commit
/// removes the loader's entries and then reinserts them merged with the new session, so a reader
/// racing it may briefly see no entry: that reads as "no previous version" and the structure is
/// recomputed from the loaded class.
#[derive(Default)]
pub struct InnerClassCache {
    entries: RwLock<HashMap<LoaderId, HashMap<BinaryName, Arc<ImmutableClassInfo>>>>,
}

impl InnerClassCache {
    pub fn new() -> InnerClassCache {
        InnerClassCache::default()
    }

    /// Cached entry for an outer class
    ///
    /// Entries whose loaded class was unloaded are purged rather than returned.
    pub fn lookup(&self, loader: LoaderId, name: &BinaryName) -> Option<Arc<ImmutableClassInfo>> {
        let found = self.entries.read().get(&loader)?.get(name).cloned()?;
        if found.is_reclaimed() {
            log::debug!("Purging reclaimed inner class cache entry {}", name);
            self.on_class_unloaded(loader, name);
            return None;
        }
        Some(found)
    }

    /// Inner class structure of a loaded class before this redefinition
    ///
    /// On a cache miss, the structure is recomputed from the loaded definition and the loaded
    /// anonymous classes it refers to.
    pub fn previous_info(
        &self,
        class: &ClassRef,
        registry: &dyn ClassRegistry,
        hot_class_marker: &str,
    ) -> Option<Arc<ImmutableClassInfo>> {
        let name = class.name();
        if let Some(cached) = self.lookup(class.loader(), &name) {
            return Some(cached);
        }
        match Self::from_loaded(class, registry, hot_class_marker) {
            Ok(info) => Some(info),
            Err(err) => {
                log::warn!("Cannot summarize loaded class {}: {}", name, err);
                None
            }
        }
    }

    fn from_loaded(
        class: &ClassRef,
        registry: &dyn ClassRegistry,
        hot_class_marker: &str,
    ) -> Result<Arc<ImmutableClassInfo>, jvm::Error> {
        let name = class.name();
        let loader = class.loader();
        let definition = class.definition();

        let mut inner = vec![];
        for inner_name in referenced_local_inners(&name, &definition, hot_class_marker)? {
            if let Some(inner_class) = registry.find_loaded(loader, &inner_name) {
                inner.push(Self::from_loaded(&inner_class, registry, hot_class_marker)?);
            }
        }

        Ok(Arc::new(ImmutableClassInfo::new(
            name,
            loader,
            Some(class),
            Fingerprint::of(&definition)?,
            inner,
            is_enum_switch_helper(&definition)?,
        )))
    }

    /// Record the outcome of a redefinition for one loader
    ///
    /// Entries for outer classes not in `entries` are kept.
    pub fn commit(&self, loader: LoaderId, entries: Vec<Arc<ImmutableClassInfo>>) {
        let removed = self.entries.write().remove(&loader);
        let mut merged = removed.unwrap_or_default();
        for entry in entries {
            merged.insert(entry.name.clone(), entry);
        }
        self.entries.write().insert(loader, merged);
    }

    /// Forget a class, as when its loader reports it unloaded
    pub fn on_class_unloaded(&self, loader: LoaderId, name: &BinaryName) {
        let mut entries = self.entries.write();
        if let Some(by_name) = entries.get_mut(&loader) {
            by_name.remove(name);
            if by_name.is_empty() {
                entries.remove(&loader);
            }
        }
    }

    pub fn on_loader_unloaded(&self, loader: LoaderId) {
        self.entries.write().remove(&loader);
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn entry(loader: LoaderId, outer: &str) -> Arc<ImmutableClassInfo> {
        Arc::new(ImmutableClassInfo::new(
            name(outer),
            loader,
            None,
            Fingerprint::default(),
            vec![],
            false,
        ))
    }

    #[test]
    fn commit_merges_per_loader() {
        let cache = InnerClassCache::new();
        let loader = LoaderId(1);
        cache.commit(loader, vec![entry(loader, "a/First"), entry(loader, "a/Second")]);
        cache.commit(LoaderId(2), vec![entry(LoaderId(2), "a/First")]);

        let replacement = entry(loader, "a/First");
        cache.commit(loader, vec![replacement.clone()]);

        assert_eq!(cache.len(), 3);
        let found = cache.lookup(loader, &name("a/First")).unwrap();
        assert!(Arc::ptr_eq(&found, &replacement));
        assert!(cache.lookup(loader, &name("a/Second")).is_some());
    }

    #[test]
    fn unload_notifications() {
        let cache = InnerClassCache::new();
        cache.commit(LoaderId(1), vec![entry(LoaderId(1), "a/First")]);
        cache.commit(LoaderId(2), vec![entry(LoaderId(2), "a/First")]);

        cache.on_class_unloaded(LoaderId(1), &name("a/First"));
        assert!(cache.lookup(LoaderId(1), &name("a/First")).is_none());
        assert!(cache.lookup(LoaderId(2), &name("a/First")).is_some());

        cache.on_loader_unloaded(LoaderId(2));
        assert!(cache.is_empty());
    }
}
