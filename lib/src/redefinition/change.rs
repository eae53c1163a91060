use super::{ClassRef, LoaderId};
use crate::jvm::class_file::{ClassFile, Code};
use crate::jvm::{BinaryName, FieldAccessFlags, MethodAccessFlags, UnqualifiedName};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Verdict for one class, ordered from least to most severe
///
/// When several kinds of change are found, the most severe one is reported (see
/// [`ClassChange::most_severe`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassChange {
    NoChange,
    MethodBodyChange,
    ConstantPoolChange,
    ClassNameChanged,
    AddMethod,
    RemoveMethod,
    SchemaChange,
    ClassHierarchyChanged,

    /// No previous version is loaded
    NewClass,
}

impl ClassChange {
    /// Fold verdicts, keeping the most severe
    pub fn most_severe(verdicts: impl IntoIterator<Item = ClassChange>) -> ClassChange {
        verdicts.into_iter().fold(ClassChange::NoChange, ClassChange::max)
    }
}

/// Name and descriptor of a method or field
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberKey {
    pub name: String,
    pub descriptor: String,
}

impl MemberKey {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> MemberKey {
        MemberKey {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT.as_str()
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == UnqualifiedName::CLINIT.as_str()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSummary {
    pub key: MemberKey,
    pub access_flags: FieldAccessFlags,
}

impl FieldSummary {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSummary {
    pub key: MemberKey,
    pub access_flags: MethodAccessFlags,
}

impl MethodSummary {
    /// Takes part in virtual dispatch (so adding or removing it changes vtables)
    pub fn is_virtual(&self) -> bool {
        self.access_flags.is_virtual() && !self.key.is_constructor()
    }
}

/// Everything that differs between two versions of a class
///
/// A member appears in at most one of the added, removed, changed, and unchanged collections.
#[derive(Clone, Debug, Default)]
pub struct DetectedChange {
    pub added_static_fields: Vec<FieldSummary>,
    pub added_instance_fields: Vec<FieldSummary>,
    pub removed_fields: Vec<FieldSummary>,

    /// Added field mapped to a removed field with the same name, type, and static-ness, whose
    /// state can be carried over
    pub mapped_compatible_fields: Vec<(MemberKey, MemberKey)>,

    /// Methods whose body changed, with the new body
    pub changed_method_bodies: BTreeMap<MemberKey, Code>,
    pub added_methods: Vec<MethodSummary>,
    pub removed_methods: Vec<MethodSummary>,
    pub unchanged_methods: Vec<MethodSummary>,

    /// `<clinit>` was added or its body changed
    pub clinit_changed: bool,

    pub hierarchy_changed: bool,

    /// Resolved new superclass (only when the hierarchy changed)
    pub new_superclass: Option<ClassRef>,

    /// Resolved new interfaces (only when the hierarchy changed)
    pub new_interfaces: Vec<ClassRef>,
}

impl DetectedChange {
    /// Nothing was added, removed, or changed (unchanged members don't count)
    pub fn is_empty(&self) -> bool {
        self.added_static_fields.is_empty()
            && self.added_instance_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.changed_method_bodies.is_empty()
            && self.added_methods.is_empty()
            && self.removed_methods.is_empty()
            && !self.clinit_changed
            && !self.hierarchy_changed
    }

    /// A virtual method was added or removed
    pub fn changes_virtual_methods(&self) -> bool {
        self.added_methods
            .iter()
            .chain(&self.removed_methods)
            .any(MethodSummary::is_virtual)
    }

    /// An instance field was added or removed
    pub fn changes_field_layout(&self) -> bool {
        !self.added_instance_fields.is_empty()
            || self.removed_fields.iter().any(|field| !field.is_static())
    }

    pub fn added_fields(&self) -> impl Iterator<Item = &FieldSummary> {
        self.added_static_fields
            .iter()
            .chain(&self.added_instance_fields)
    }
}

/// A class ready to have its new version applied
#[derive(Clone, Debug)]
pub struct ChangePacket {
    /// Name of the class in its new version
    pub name: BinaryName,
    pub loader: LoaderId,

    /// Currently loaded version (`None` for new classes)
    pub class: Option<ClassRef>,

    /// Name in the request, when the class was renamed by inner class matching
    pub renamed_from: Option<BinaryName>,

    pub bytes: Vec<u8>,
    pub parsed: Arc<ClassFile>,
    pub class_change: ClassChange,
    pub detected_change: DetectedChange,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn severity_order() {
        use ClassChange::*;
        let order = [
            NoChange,
            MethodBodyChange,
            ConstantPoolChange,
            ClassNameChanged,
            AddMethod,
            RemoveMethod,
            SchemaChange,
            ClassHierarchyChanged,
        ];
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn most_severe_wins_regardless_of_order() {
        use ClassChange::*;
        assert_eq!(ClassChange::most_severe(vec![]), NoChange);
        assert_eq!(
            ClassChange::most_severe(vec![SchemaChange, MethodBodyChange, AddMethod]),
            SchemaChange
        );
        assert_eq!(
            ClassChange::most_severe(vec![MethodBodyChange, ConstantPoolChange]),
            ConstantPoolChange
        );
    }

    #[test]
    fn emptiness_ignores_unchanged_members() {
        let mut change = DetectedChange::default();
        change.unchanged_methods.push(MethodSummary {
            key: MemberKey::new("run", "()V"),
            access_flags: MethodAccessFlags::PUBLIC,
        });
        assert!(change.is_empty());

        change.clinit_changed = true;
        assert!(!change.is_empty());
    }

    #[test]
    fn virtual_method_changes() {
        let mut change = DetectedChange::default();
        change.added_methods.push(MethodSummary {
            key: MemberKey::new("<init>", "(I)V"),
            access_flags: MethodAccessFlags::PUBLIC,
        });
        change.added_methods.push(MethodSummary {
            key: MemberKey::new("helper", "()V"),
            access_flags: MethodAccessFlags::PRIVATE,
        });
        assert!(!change.changes_virtual_methods());

        change.removed_methods.push(MethodSummary {
            key: MemberKey::new("run", "()V"),
            access_flags: MethodAccessFlags::PUBLIC,
        });
        assert!(change.changes_virtual_methods());
    }
}
