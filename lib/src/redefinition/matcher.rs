use super::{
    is_anonymous_name, is_enum_switch_helper, referenced_local_inners, ClassInfoId, ClassParser,
    ClassRegistry, ConstantPoolPatcher, Fingerprint, HotSwapClassInfo, ImmutableClassInfo,
    InnerClassCache, LoaderId, MatchWeights, RedefineRequest, RedefinitionError,
    RedefinitionRejected, RedefinitionSession, RedefinitionSettings,
};
use crate::jvm::BinaryName;
use std::sync::Arc;

/// Re-associates anonymous and local classes of a batch with the classes they replace
///
/// Anonymous classes are named by position (`Outer$1`, `Outer$2`, ...), so an edit to the outer
/// class can shift names around. Each new anonymous class is matched against the inner classes the
/// outer class had after the previous redefinition, and renamed to the identity it matched. Those
/// that match nothing get a fresh name built from the hot class marker.
pub struct InnerClassMatcher<'a> {
    pub settings: &'a RedefinitionSettings,
    pub registry: &'a dyn ClassRegistry,
    pub parser: &'a dyn ClassParser,
    pub patcher: &'a dyn ConstantPoolPatcher,
    pub cache: &'a InnerClassCache,
}

impl<'a> InnerClassMatcher<'a> {
    /// Build the class tree for a batch, match inner classes, and patch references to renames
    ///
    /// Returns every info of the session, outer classes before their inner classes. Previous inner
    /// classes that were not matched, and that the new outer classes no longer use, are left in
    /// `session.removed`.
    pub fn match_classes(
        &self,
        session: &mut RedefinitionSession,
        requests: Vec<RedefineRequest>,
    ) -> Result<Vec<ClassInfoId>, RedefinitionRejected> {
        let marker = self.settings.hot_class_marker.as_str();

        let mut anonymous = vec![];
        for request in requests {
            let is_anonymous = is_anonymous_name(&request.name, marker);
            let class = request.class.clone();
            let id = session.add(self.class_info(request)?);
            if is_anonymous {
                anonymous.push(id);
            } else {
                let class = class.or_else(|| {
                    let info = session.info(id);
                    self.registry.find_loaded(info.loader, &info.name)
                });
                session.info_mut(id).class = class;
                session.add_root(id);
            }
        }

        if self.settings.fetch_missing_inner_classes {
            anonymous.extend(self.fetch_missing_inner_classes(session));
        }
        self.attach_to_outer_classes(session, anonymous);

        for root in session.roots().to_vec() {
            let previous = match &session.info(root).class {
                Some(class) => self.cache.previous_info(class, self.registry, marker),
                None => continue,
            };
            let previous_inner = previous
                .map(|previous| previous.inner.clone())
                .unwrap_or_default();
            self.match_inner_classes(session, root, previous_inner);
        }

        self.patch_renamed_references(session)?;
        Ok(session.ordered())
    }

    fn class_info(
        &self,
        request: RedefineRequest,
    ) -> Result<HotSwapClassInfo, RedefinitionRejected> {
        let parsed = self.parser.parse(request.loader, &request.name, &request.bytes)?;
        let fingerprint = Fingerprint::of(&parsed)?;
        let is_enum_switch_helper = is_enum_switch_helper(&parsed)?;
        Ok(HotSwapClassInfo::new(
            request.loader,
            request.name,
            request.bytes,
            parsed,
            fingerprint,
            is_enum_switch_helper,
        ))
    }

    /// Ask loaders for anonymous classes the batch refers to but doesn't contain
    ///
    /// Missing or unparseable bytes are skipped: the affected classes are simply matched less
    /// precisely.
    fn fetch_missing_inner_classes(&self, session: &mut RedefinitionSession) -> Vec<ClassInfoId> {
        let marker = self.settings.hot_class_marker.as_str();
        let mut fetched = vec![];
        let mut next = 0;
        while next < session.len() {
            let id = ClassInfoId(next);
            next += 1;

            let info = session.info(id);
            let (loader, outer) = (info.loader, info.name.clone());
            let referenced = match &info.parsed {
                Some(parsed) => referenced_local_inners(&outer, parsed, marker),
                None => continue,
            };
            let referenced = match referenced {
                Ok(referenced) => referenced,
                Err(err) => {
                    log::warn!("Cannot scan {} for inner classes: {}", outer, err);
                    continue;
                }
            };

            for name in referenced {
                if session.find(loader, &name).is_some() {
                    continue;
                }
                let bytes = match self.registry.resource_bytes(loader, &name) {
                    Some(bytes) => bytes,
                    None => {
                        log::debug!("No bytes found for inner class {}", name);
                        continue;
                    }
                };
                match self.class_info(RedefineRequest::by_name(loader, name.clone(), bytes)) {
                    Ok(info) => {
                        log::debug!("Fetched inner class {} referenced by {}", name, outer);
                        fetched.push(session.add(info));
                    }
                    Err(err) => log::warn!("Skipping inner class {}: {}", name, err),
                }
            }
        }
        fetched
    }

    /// Nest every anonymous class in its outer class
    ///
    /// Outer classes that are loaded but not part of the batch are represented by placeholders.
    /// Classes whose outer class can't be found at all are treated as top level classes.
    fn attach_to_outer_classes(
        &self,
        session: &mut RedefinitionSession,
        mut pending: Vec<ClassInfoId>,
    ) {
        loop {
            let mut attached_any = true;
            while attached_any {
                attached_any = false;
                pending.retain(|id| {
                    let info = session.info(*id);
                    let outer = info
                        .name
                        .outer_class()
                        .and_then(|outer| session.find(info.loader, &outer));
                    match outer {
                        Some(outer) => {
                            session.attach(outer, *id);
                            attached_any = true;
                            false
                        }
                        None => true,
                    }
                });
            }

            let first = match pending.first() {
                Some(first) => *first,
                None => return,
            };
            let info = session.info(first);
            let loader = info.loader;
            let loaded_outer = info.name.outer_class().and_then(|outer| {
                let class = self.registry.find_loaded(loader, &outer)?;
                Some((outer, class))
            });
            match loaded_outer {
                Some((outer, class)) => {
                    log::debug!("Using loaded {} as outer class of {}", outer, info.name);
                    let placeholder = HotSwapClassInfo::placeholder(loader, outer, class);
                    let placeholder = session.add(placeholder);
                    session.add_root(placeholder);
                }
                None => {
                    pending.remove(0);
                    let info = session.info_mut(first);
                    info.class = self.registry.find_loaded(loader, &info.name);
                    session.add_root(first);
                }
            }
        }
    }

    /// Pair the inner classes of `outer` with its previous inner classes, then recurse
    fn match_inner_classes(
        &self,
        session: &mut RedefinitionSession,
        outer: ClassInfoId,
        previous: Vec<Arc<ImmutableClassInfo>>,
    ) {
        let weights = &self.settings.match_weights;
        let mut available: Vec<Option<Arc<ImmutableClassInfo>>> =
            previous.into_iter().map(Some).collect();
        let inner = session.info(outer).inner.clone();

        // Perfect matches are settled first so a lesser match can't take their identity
        let mut assigned: Vec<Option<(Arc<ImmutableClassInfo>, u32)>> = vec![None; inner.len()];
        for perfect_only in [true, false] {
            for (slot, id) in inner.iter().enumerate() {
                if assigned[slot].is_some() {
                    continue;
                }
                let best = best_candidate(session.info(*id), &available, weights);
                if let Some((position, score)) = best {
                    if !perfect_only || score == weights.max_score() {
                        assigned[slot] =
                            available[position].take().map(|previous| (previous, score));
                    }
                }
            }
        }

        let mut matched = vec![];
        let mut unmatched = vec![];
        for (id, assigned) in inner.into_iter().zip(assigned) {
            let (previous, score) = match assigned {
                Some(assigned) => assigned,
                None => {
                    unmatched.push(id);
                    continue;
                }
            };
            let info_name = session.info(id).name.clone();
            log::debug!(
                "Matched {} to previous {} (score {})",
                info_name,
                previous.name,
                score
            );
            if previous.name != info_name {
                session.rules.add_class_rename(&info_name, &previous.name);
                session.info_mut(id).new_name = Some(previous.name.clone());
            }
            session.info_mut(id).class = previous.class();
            matched.push((id, previous.inner.clone()));
        }

        for id in unmatched {
            let info = session.info(id);
            let loader = info.loader;
            let fresh = self.fresh_name(session, loader, outer);
            log::debug!("No previous version of {}, renaming it to {}", info.name, fresh);
            let info_name = info.name.clone();
            session.rules.add_class_rename(&info_name, &fresh);
            let info = session.info_mut(id);
            info.new_name = Some(fresh);
            info.is_hot_class = true;
            info.class = None;
            matched.push((id, vec![]));
        }

        for previous in available.into_iter().flatten() {
            if self.is_still_referenced(session, outer, &previous) {
                log::debug!("Keeping inner class {}, which is not in the batch", previous.name);
                session.info_mut(outer).retained.push(previous);
            } else {
                log::info!("Inner class {} was removed", previous.name);
                session.removed.push(previous);
            }
        }

        for (id, previous_inner) in matched {
            self.match_inner_classes(session, id, previous_inner);
        }
    }

    /// Whether a previous inner class that matched nothing is still used by its outer class
    ///
    /// Placeholders keep all their inner classes. Otherwise the new outer definition must refer to
    /// the class under a name that no class of the batch was requested under.
    fn is_still_referenced(
        &self,
        session: &RedefinitionSession,
        outer: ClassInfoId,
        previous: &ImmutableClassInfo,
    ) -> bool {
        let info = session.info(outer);
        if info.is_placeholder() {
            return true;
        }
        let parsed = match &info.parsed {
            Some(parsed) => parsed,
            None => return true,
        };
        let marker = self.settings.hot_class_marker.as_str();
        let referenced = referenced_local_inners(&info.name, parsed, marker).unwrap_or_default();
        referenced.contains(&previous.name) && session.find(info.loader, &previous.name).is_none()
    }

    /// Unused name for a new inner class of `outer`: `Outer$hotswap1`, `Outer$hotswap2`, ...
    fn fresh_name(
        &self,
        session: &RedefinitionSession,
        loader: LoaderId,
        outer: ClassInfoId,
    ) -> BinaryName {
        let outer_name = session.info(outer).final_name().clone();
        let mut counter = 1;
        loop {
            let suffix = format!("{}{}", self.settings.hot_class_marker, counter);
            let candidate = outer_name.concat(&suffix);
            let taken = session.has_final_name(loader, &candidate)
                || session.find(loader, &candidate).is_some()
                || self.registry.find_loaded(loader, &candidate).is_some();
            if !taken {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Rewrite the constant pools of classes that refer to a renamed class
    fn patch_renamed_references(
        &self,
        session: &mut RedefinitionSession,
    ) -> Result<(), RedefinitionRejected> {
        if session.rules.is_empty() {
            return Ok(());
        }
        for id in session.ids().collect::<Vec<_>>() {
            let info = session.info(id);
            let bytes = match (&info.bytes, &info.parsed) {
                (Some(bytes), Some(parsed)) if session.rules.references(parsed) => bytes,
                _ => continue,
            };
            let patched = self.patcher.patch(bytes, &session.rules).map_err(|rejected| {
                RedefinitionRejected::with_message(
                    RedefinitionError::InvalidClassFormat,
                    format!("patching {} failed: {}", info.name, rejected),
                )
            })?;
            let reparsed = self
                .parser
                .parse(info.loader, info.final_name(), &patched)
                .map_err(|rejected| {
                    RedefinitionRejected::with_message(
                        RedefinitionError::InvalidClassFormat,
                        format!("patched {} is invalid: {}", info.name, rejected),
                    )
                })?;
            log::debug!("Patched references to renamed classes in {}", info.name);

            let info = session.info_mut(id);
            info.patched_bytes = Some(patched);
            info.parsed = Some(Arc::new(reparsed));
        }
        Ok(())
    }
}

/// Highest scoring previous class (first one wins ties), stopping early at a perfect score
fn best_candidate(
    info: &HotSwapClassInfo,
    available: &[Option<Arc<ImmutableClassInfo>>],
    weights: &MatchWeights,
) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (position, candidate) in available.iter().enumerate() {
        let candidate = match candidate {
            Some(candidate) if candidate.is_enum_switch_helper == info.is_enum_switch_helper => {
                candidate
            }
            _ => continue,
        };
        let score = info.fingerprint.match_score(
            info.inner.len(),
            &candidate.fingerprint,
            candidate.inner.len(),
            weights,
        );
        if score > 0 && best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((position, score));
            if score == weights.max_score() {
                break;
            }
        }
    }
    best
}
