use super::{is_anonymous_name, ChangePacket, ClassChange, LoaderId};
use crate::jvm::{BinaryName, Name};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Order packets so that every supertype comes before its subtypes
///
/// Supertypes are taken from both the new definition and the loaded class. Among classes free to
/// go next, named classes come before anonymous ones and classes without a previous version come
/// last. Remaining ties keep the incoming order, so the result is deterministic.
pub fn sort_by_hierarchy(packets: Vec<ChangePacket>, hot_class_marker: &str) -> Vec<ChangePacket> {
    let positions: HashMap<(LoaderId, BinaryName), usize> = packets
        .iter()
        .enumerate()
        .map(|(position, packet)| ((packet.loader, packet.name.clone()), position))
        .collect();

    let mut subtypes: Vec<Vec<usize>> = vec![vec![]; packets.len()];
    let mut supertype_counts = vec![0; packets.len()];
    for (position, packet) in packets.iter().enumerate() {
        let mut supertypes = vec![];
        for supertype in supertype_names(packet) {
            if let Some(&supertype) = positions.get(&(packet.loader, supertype)) {
                if supertype != position && !supertypes.contains(&supertype) {
                    supertypes.push(supertype);
                }
            }
        }
        for supertype in supertypes {
            subtypes[supertype].push(position);
            supertype_counts[position] += 1;
        }
    }

    let priority = |position: usize| {
        let packet = &packets[position];
        Reverse((
            packet.class_change == ClassChange::NewClass,
            is_anonymous_name(&packet.name, hot_class_marker),
            position,
        ))
    };
    let mut ready: BinaryHeap<_> = (0..packets.len())
        .filter(|position| supertype_counts[*position] == 0)
        .map(priority)
        .collect();

    let mut order = Vec::with_capacity(packets.len());
    while let Some(Reverse((_, _, position))) = ready.pop() {
        order.push(position);
        for &subtype in &subtypes[position] {
            supertype_counts[subtype] -= 1;
            if supertype_counts[subtype] == 0 {
                ready.push(priority(subtype));
            }
        }
    }

    // Cycles can only come from inconsistent input: keep whatever is left in incoming order
    if order.len() < packets.len() {
        log::warn!("Cyclic class hierarchy in redefinition batch");
        for position in 0..packets.len() {
            if !order.contains(&position) {
                order.push(position);
            }
        }
    }

    let mut slots: Vec<Option<ChangePacket>> = packets.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}

fn supertype_names(packet: &ChangePacket) -> Vec<BinaryName> {
    let mut names = vec![];
    if let Ok(Some(super_name)) = packet.parsed.super_name() {
        names.extend(BinaryName::from_string(super_name.to_owned()).ok());
    }
    if let Ok(interfaces) = packet.parsed.interface_names() {
        for interface in interfaces {
            names.extend(BinaryName::from_string(interface.to_owned()).ok());
        }
    }
    if let Some(class) = &packet.class {
        names.extend(class.superclass().map(|superclass| superclass.name()));
        names.extend(class.interfaces().iter().map(|interface| interface.name()));
    }
    names
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_builder::ClassBuilder;
    use crate::jvm::{ClassAccessFlags, Name};
    use crate::redefinition::DetectedChange;
    use std::sync::Arc;

    fn packet(
        name: &str,
        super_class: &str,
        interfaces: &[&str],
        change: ClassChange,
    ) -> ChangePacket {
        let access_flags = ClassAccessFlags::PUBLIC;
        let parsed = ClassBuilder::new(access_flags, name, Some(super_class), interfaces)
            .unwrap()
            .result();
        ChangePacket {
            name: BinaryName::from_string(name.to_owned()).unwrap(),
            loader: LoaderId(0),
            class: None,
            renamed_from: None,
            bytes: parsed.to_bytes().unwrap(),
            parsed: Arc::new(parsed),
            class_change: change,
            detected_change: DetectedChange::default(),
        }
    }

    fn names(packets: &[ChangePacket]) -> Vec<&str> {
        packets.iter().map(|packet| packet.name.as_str()).collect()
    }

    #[test]
    fn supertypes_first() {
        let body = ClassChange::MethodBodyChange;
        let packets = vec![
            packet("a/Leaf", "a/Middle", &[], body),
            packet("a/Outer$1", "java/lang/Object", &[], body),
            packet("a/Middle", "a/Root", &["a/Shape"], body),
            packet("a/Unrelated", "java/lang/Object", &[], body),
            packet("a/Shape", "java/lang/Object", &[], body),
            packet("a/Root", "java/lang/Object", &[], body),
        ];

        let sorted = sort_by_hierarchy(packets, "$hotswap");
        assert_eq!(
            names(&sorted),
            vec!["a/Unrelated", "a/Shape", "a/Root", "a/Middle", "a/Leaf", "a/Outer$1"]
        );
    }

    #[test]
    fn new_classes_last() {
        let packets = vec![
            packet("a/Fresh", "java/lang/Object", &[], ClassChange::NewClass),
            packet("a/Outer$1", "java/lang/Object", &[], ClassChange::AddMethod),
            packet("a/Outer", "java/lang/Object", &[], ClassChange::AddMethod),
            packet("a/Child", "a/Fresh", &[], ClassChange::ClassHierarchyChanged),
        ];

        let sorted = sort_by_hierarchy(packets, "$hotswap");
        assert_eq!(names(&sorted), vec!["a/Outer", "a/Outer$1", "a/Fresh", "a/Child"]);
    }
}
