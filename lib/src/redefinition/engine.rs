use super::{
    sort_by_hierarchy, ChangeDetector, ChangePacket, ClassChange, ClassFileParser, ClassInfoId,
    ClassParser, ClassRef, ClassRegistry, ClassTransformer, ConstantPoolComparator,
    ConstantPoolPatcher, ConstantPoolRewriter, DetectedChange, InnerClassCache, InnerClassMatcher,
    LoadedClass, LoaderId, MemberKey, RedefineRequest, RedefinitionListener, RedefinitionLock,
    RedefinitionRejected, RedefinitionSession, RedefinitionSettings, SymbolicComparator,
};
use crate::jvm::class_file::ClassFile;
use crate::jvm::BinaryName;
use crate::util::ArcId;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An added field that can take over the state of a removed field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDelegation {
    pub loader: LoaderId,
    pub class: BinaryName,
    pub added: MemberKey,
    pub removed: MemberKey,
}

/// Entry point for redefining classes
///
/// Holds the collaborators, the inner class cache, and the redefinition lock. Every redefinition
/// runs in its own [`RedefinitionSession`].
pub struct RedefinitionEngine {
    settings: RedefinitionSettings,
    registry: Arc<dyn ClassRegistry>,
    parser: Box<dyn ClassParser>,
    comparator: Box<dyn ConstantPoolComparator>,
    patcher: Box<dyn ConstantPoolPatcher>,
    cache: InnerClassCache,
    lock: RedefinitionLock,
    transformers: RwLock<Vec<Arc<dyn ClassTransformer>>>,
    listeners: RwLock<Vec<Arc<dyn RedefinitionListener>>>,

    /// Cleared whenever a redefinition starts: field lookups that previously failed may now succeed
    missing_field_fast_path: AtomicBool,
    delegations: Mutex<Vec<FieldDelegation>>,
}

impl RedefinitionEngine {
    pub fn new(
        settings: RedefinitionSettings,
        registry: Arc<dyn ClassRegistry>,
    ) -> RedefinitionEngine {
        let parser = ClassFileParser {
            max_supported_version: settings.max_supported_version,
        };
        RedefinitionEngine {
            settings,
            registry,
            parser: Box::new(parser),
            comparator: Box::new(SymbolicComparator),
            patcher: Box::new(ConstantPoolRewriter),
            cache: InnerClassCache::new(),
            lock: RedefinitionLock::new(),
            transformers: RwLock::new(vec![]),
            listeners: RwLock::new(vec![]),
            missing_field_fast_path: AtomicBool::new(true),
            delegations: Mutex::new(vec![]),
        }
    }

    pub fn with_parser(mut self, parser: impl ClassParser + 'static) -> RedefinitionEngine {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_comparator(
        mut self,
        comparator: impl ConstantPoolComparator + 'static,
    ) -> RedefinitionEngine {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn with_patcher(
        mut self,
        patcher: impl ConstantPoolPatcher + 'static,
    ) -> RedefinitionEngine {
        self.patcher = Box::new(patcher);
        self
    }

    pub fn add_transformer(&self, transformer: Arc<dyn ClassTransformer>) {
        self.transformers.write().push(transformer);
    }

    pub fn add_listener(&self, listener: Arc<dyn RedefinitionListener>) {
        self.listeners.write().push(listener);
    }

    pub fn settings(&self) -> &RedefinitionSettings {
        &self.settings
    }

    pub fn cache(&self) -> &InnerClassCache {
        &self.cache
    }

    /// Barrier for code about to trust cached class structure (see [`RedefinitionLock::check`])
    pub fn check(&self) {
        self.lock.check();
    }

    pub fn is_redefining_thread(&self) -> bool {
        self.lock.is_redefining_thread()
    }

    /// Whether failed field lookups can still be trusted without resolving them again
    pub fn missing_field_fast_path(&self) -> bool {
        self.missing_field_fast_path.load(Ordering::Acquire)
    }

    /// Called once failed field lookups have been resolved again
    pub fn restore_missing_field_fast_path(&self) {
        self.missing_field_fast_path.store(true, Ordering::Release);
    }

    /// Field delegations recorded by the last redefinition, for the object model to install
    pub fn take_delegations(&self) -> Vec<FieldDelegation> {
        std::mem::take(&mut *self.delegations.lock())
    }

    /// Forget cached inner class structure of an unloaded class
    pub fn on_class_unloaded(&self, loader: LoaderId, name: &BinaryName) {
        self.cache.on_class_unloaded(loader, name);
    }

    pub fn on_loader_unloaded(&self, loader: LoaderId) {
        self.cache.on_loader_unloaded(loader);
    }

    /// Redefine a batch of classes, in the mode set by the settings
    pub fn redefine(
        &self,
        requests: Vec<RedefineRequest>,
    ) -> Result<Vec<ClassRef>, RedefinitionRejected> {
        self.redefine_with_mode(requests, self.settings.restricted)
    }

    /// Redefine a batch of classes
    ///
    /// The batch is applied entirely or not at all: any rejection is returned before a loaded
    /// class is touched. On success, returns every class that was changed, defined, or refreshed
    /// because a supertype changed.
    pub fn redefine_with_mode(
        &self,
        requests: Vec<RedefineRequest>,
        restricted: bool,
    ) -> Result<Vec<ClassRef>, RedefinitionRejected> {
        let requests = self.transform(requests);

        let _guard = self.lock.begin();
        log::info!("Redefining {} classes (restricted: {})", requests.len(), restricted);
        self.delegations.lock().clear();
        self.missing_field_fast_path.store(false, Ordering::Release);

        let mut session = RedefinitionSession::new(restricted);
        let mut packets = self.match_and_detect(0, &mut session, requests)?;

        let mut sessions = vec![session];
        let extra = self.additional_requests(&packets);
        if !extra.is_empty() {
            log::debug!("Listeners added {} classes to the batch", extra.len());
            let mut extra_session = RedefinitionSession::new(restricted);
            packets.extend(self.match_and_detect(1, &mut extra_session, extra)?);
            sessions.push(extra_session);
        }

        self.define_new_classes(&mut sessions, &mut packets)?;

        // Loaded classes are only modified from here on

        let packets: Vec<ChangePacket> = packets
            .into_iter()
            .map(|(_, _, packet)| packet)
            .filter(|packet| packet.class_change != ClassChange::NoChange)
            .collect();
        let packets = sort_by_hierarchy(packets, &self.settings.hot_class_marker);

        let (mut changed, stale) = self.apply(&packets);
        let cascaded = self.refresh_invalidated(&packets, &changed, stale);
        changed.extend(cascaded);

        for session in &sessions {
            self.commit(session);
        }
        self.rerun_static_initializers(&packets);
        self.notify_listeners(&changed);

        log::info!("Redefinition changed {} classes", changed.len());
        Ok(changed)
    }

    fn transform(&self, mut requests: Vec<RedefineRequest>) -> Vec<RedefineRequest> {
        let transformers = self.transformers.read();
        for request in &mut requests {
            for transformer in transformers.iter() {
                let transformed =
                    transformer.transform(request.loader, &request.name, &request.bytes);
                if let Some(bytes) = transformed {
                    log::debug!("Transformed {} before redefinition", request.name);
                    request.bytes = bytes;
                }
            }
        }
        requests
    }

    fn match_and_detect(
        &self,
        session_index: usize,
        session: &mut RedefinitionSession,
        requests: Vec<RedefineRequest>,
    ) -> Result<Vec<(usize, ClassInfoId, ChangePacket)>, RedefinitionRejected> {
        let matcher = InnerClassMatcher {
            settings: &self.settings,
            registry: self.registry.as_ref(),
            parser: self.parser.as_ref(),
            patcher: self.patcher.as_ref(),
            cache: &self.cache,
        };
        let order = matcher.match_classes(session, requests)?;

        let detector = ChangeDetector {
            settings: &self.settings,
            comparator: self.comparator.as_ref(),
            registry: self.registry.as_ref(),
        };
        let mut packets = vec![];
        for id in order {
            let info = session.info(id);
            let (bytes, parsed) = match (info.final_bytes(), &info.parsed) {
                (Some(bytes), Some(parsed)) => (bytes.to_vec(), parsed.clone()),
                _ => continue,
            };
            let (class_change, detected_change) = match &info.class {
                Some(class) => {
                    let previous = class.definition();
                    let renamed = info.final_name() != &class.name();
                    let (verdict, detected) = detector.detect(
                        info.loader,
                        info.final_name(),
                        &previous,
                        &parsed,
                        session.restricted,
                        renamed,
                    )?;
                    (verdict, detected)
                }
                None => (ClassChange::NewClass, DetectedChange::default()),
            };
            log::debug!("{}: {:?}", info.final_name(), class_change);

            let packet = ChangePacket {
                name: info.final_name().clone(),
                loader: info.loader,
                class: info.class.clone(),
                renamed_from: info.new_name.as_ref().map(|_| info.name.clone()),
                bytes,
                parsed,
                class_change,
                detected_change,
            };
            packets.push((session_index, id, packet));
        }
        Ok(packets)
    }

    fn additional_requests(
        &self,
        packets: &[(usize, ClassInfoId, ChangePacket)],
    ) -> Vec<RedefineRequest> {
        let changes: Vec<ChangePacket> =
            packets.iter().map(|(_, _, packet)| packet.clone()).collect();
        let batch: HashSet<(LoaderId, BinaryName)> = changes
            .iter()
            .flat_map(|packet| {
                let requested = packet
                    .renamed_from
                    .clone()
                    .unwrap_or_else(|| packet.name.clone());
                [(packet.loader, packet.name.clone()), (packet.loader, requested)]
            })
            .collect();

        let mut requests = vec![];
        for listener in self.listeners.read().iter() {
            for request in listener.additional_classes(&changes) {
                if batch.contains(&(request.loader, request.name.clone())) {
                    log::debug!("{} is already part of the batch", request.name);
                } else {
                    requests.push(request);
                }
            }
        }
        requests
    }

    /// Define the classes with no previous version that nothing else could define
    ///
    /// That is when a class is already loaded under its name (and must be replaced) or when its
    /// name was generated by inner class matching (no loader can find bytes for it). If a
    /// definition fails, the classes defined so far are removed again before returning.
    fn define_new_classes(
        &self,
        sessions: &mut [RedefinitionSession],
        packets: &mut [(usize, ClassInfoId, ChangePacket)],
    ) -> Result<(), RedefinitionRejected> {
        let mut defined: Vec<ClassRef> = vec![];
        for (session_index, id, packet) in packets.iter_mut() {
            if packet.class_change != ClassChange::NewClass {
                continue;
            }
            let session = &mut sessions[*session_index];
            match self.define_new_class(session, *id, packet) {
                Ok(Some(class)) => defined.push(class),
                Ok(None) => (),
                Err(rejected) => {
                    log::warn!("Failed to define {}: {}", packet.name, rejected);
                    for class in defined {
                        log::debug!("Removing {} defined by the failed batch", class.name());
                        class.remove_from_registry();
                    }
                    return Err(rejected);
                }
            }
        }
        Ok(())
    }

    fn define_new_class(
        &self,
        session: &mut RedefinitionSession,
        id: ClassInfoId,
        packet: &mut ChangePacket,
    ) -> Result<Option<ClassRef>, RedefinitionRejected> {
        let info = session.info(id);
        let already_loaded = self.registry.find_loaded(packet.loader, &packet.name).is_some();
        if !already_loaded && !info.is_hot_class {
            return Ok(None);
        }

        log::debug!("Defining new class {}", packet.name);
        let class = self.registry.define(packet.loader, &packet.name, &packet.bytes)?;
        session.info_mut(id).class = Some(class.clone());
        packet.class = Some(class.clone());
        Ok(Some(class))
    }

    /// Swap in new versions, supertypes first
    ///
    /// Returns the changed classes, and the classes their new versions invalidated.
    fn apply(&self, packets: &[ChangePacket]) -> (Vec<ClassRef>, Vec<ClassRef>) {
        let mut changed = vec![];
        let mut invalidated = vec![];
        for packet in packets {
            let class = match &packet.class {
                Some(class) => class,
                None => continue,
            };
            if packet.class_change == ClassChange::NewClass {
                changed.push(class.clone());
                continue;
            }

            if class.name() != packet.name {
                class.rename(&packet.name);
            }
            if packet.detected_change.hierarchy_changed {
                class.detach_from_hierarchy();
            }
            let stale = class.swap_version(packet);
            if !stale.is_empty() {
                log::debug!("Swapping {} invalidated {} classes", packet.name, stale.len());
            }
            invalidated.extend(stale);

            let mut delegations = self.delegations.lock();
            for (added, removed) in &packet.detected_change.mapped_compatible_fields {
                delegations.push(FieldDelegation {
                    loader: packet.loader,
                    class: packet.name.clone(),
                    added: added.clone(),
                    removed: removed.clone(),
                });
            }
            changed.push(class.clone());
        }
        (changed, invalidated)
    }

    /// Refresh classes whose derived state depends on a redefined class
    ///
    /// Classes redefined in this batch are skipped. Returns the refreshed classes, supertypes
    /// before subtypes.
    fn refresh_invalidated(
        &self,
        packets: &[ChangePacket],
        redefined: &[ClassRef],
        stale_after_swap: Vec<ClassRef>,
    ) -> Vec<ClassRef> {
        let redefined: HashSet<ArcId<dyn LoadedClass>> =
            redefined.iter().cloned().map(ArcId).collect();
        let mut seen = HashSet::new();
        let mut invalidated = vec![];
        let mut keep = |class: ClassRef| {
            let id = ArcId(class);
            if !redefined.contains(&id) && seen.insert(id.clone()) {
                invalidated.push(id.0);
            }
        };
        stale_after_swap.into_iter().for_each(&mut keep);

        for packet in packets {
            let class = match &packet.class {
                Some(class) if packet.class_change != ClassChange::NewClass => class,
                _ => continue,
            };
            let change = &packet.detected_change;
            let mut stale = vec![];
            if change.hierarchy_changed
                || change.changes_virtual_methods()
                || change.changes_field_layout()
            {
                stale.extend(self.registry.loaded_subclasses_of(class));
            }
            stale.extend(self.field_shadowing(class, change));

            stale.into_iter().for_each(&mut keep);
        }

        invalidated.sort_by_cached_key(hierarchy_depth);
        for class in &invalidated {
            log::debug!("Refreshing {}", class.name());
            class.refresh();
        }
        invalidated
    }

    /// Supertypes and subtypes declaring a field like one this class added
    fn field_shadowing(&self, class: &ClassRef, change: &DetectedChange) -> Vec<ClassRef> {
        let added: Vec<&MemberKey> = change.added_fields().map(|field| &field.key).collect();
        if added.is_empty() {
            return vec![];
        }

        let mut related = vec![];
        let mut superclass = class.superclass();
        while let Some(class) = superclass {
            superclass = class.superclass();
            related.push(class);
        }
        related.extend(self.registry.loaded_subclasses_of(class));

        related
            .into_iter()
            .filter(|related| declares_any_field(&related.definition(), &added))
            .collect()
    }

    fn commit(&self, session: &RedefinitionSession) {
        let mut by_loader: BTreeMap<LoaderId, Vec<_>> = BTreeMap::new();
        for &root in session.roots() {
            let info = session.info(root);
            if info.class.is_some() {
                by_loader.entry(info.loader).or_default().push(session.freeze(root));
            }
        }
        for (loader, entries) in by_loader {
            self.cache.commit(loader, entries);
        }

        for removed in &session.removed {
            for removed in removed.flatten() {
                log::info!("Unloading removed inner class {}", removed.name);
                if let Some(class) = removed.class() {
                    class.remove_from_registry();
                }
                self.cache.on_class_unloaded(removed.loader, &removed.name);
            }
        }
    }

    /// Failures are logged: the new versions are already in place
    fn rerun_static_initializers(&self, packets: &[ChangePacket]) {
        for packet in packets {
            let change = &packet.detected_change;
            if !change.clinit_changed || packet.class_change == ClassChange::NewClass {
                continue;
            }
            if let Some(class) = &packet.class {
                log::debug!("Re-running static initializer of {}", packet.name);
                if let Err(err) = class.rerun_static_initializer() {
                    log::warn!("Static initializer of {} failed: {}", packet.name, err);
                }
            }
        }
    }

    fn notify_listeners(&self, changed: &[ClassRef]) {
        for listener in self.listeners.read().iter() {
            if let Err(err) = listener.post_redefinition(changed) {
                log::warn!("Redefinition listener failed: {}", err);
            }
        }
    }
}

fn hierarchy_depth(class: &ClassRef) -> usize {
    let mut depth = 0;
    let mut superclass = class.superclass();
    while let Some(class) = superclass {
        superclass = class.superclass();
        depth += 1;
    }
    depth
}

fn declares_any_field(class: &ClassFile, fields: &[&MemberKey]) -> bool {
    class.fields.iter().any(|field| {
        match (field.name(&class.constants), field.descriptor(&class.constants)) {
            (Ok(name), Ok(descriptor)) => fields
                .iter()
                .any(|key| key.name == name && key.descriptor == descriptor),
            _ => false,
        }
    })
}
