use super::{
    ClassChange, ClassRef, ClassRegistry, ConstantPoolComparator, DetectedChange, FieldSummary,
    LoaderId, MemberKey, MethodSummary, RedefinitionError, RedefinitionRejected,
    RedefinitionSettings,
};
use crate::jvm::bytecode::InstructionIter;
use crate::jvm::class_file::{
    find_attribute, symbolic_annotations, AnnotationToken, Attribute, AttributeLike, ClassFile,
    Code, ConstantValue, ConstantsReader, Exceptions, Field, LineNumberTable, LocalVariable,
    LocalVariableTable, LocalVariableTypeTable, Method, NestHost, NestMembers,
    PermittedSubclasses, Record, Signature, SymbolicConstant, ANNOTATION_ATTRIBUTES,
};
use crate::jvm::{self, BinaryName, ClassAccessFlags, ClassConstantIndex, FieldAccessFlags, Name};

/// Method attributes that must agree for two methods to be considered the same method
const METHOD_METADATA: [&str; 7] = [
    ANNOTATION_ATTRIBUTES[0],
    ANNOTATION_ATTRIBUTES[1],
    ANNOTATION_ATTRIBUTES[2],
    ANNOTATION_ATTRIBUTES[3],
    ANNOTATION_ATTRIBUTES[4],
    "Exceptions",
    "Signature",
];

/// Compares the loaded version of a class with a new definition
///
/// Detection has no side effects apart from resolving new supertypes when the hierarchy changed
/// (which may load classes through the registry).
pub struct ChangeDetector<'a> {
    pub settings: &'a RedefinitionSettings,
    pub comparator: &'a dyn ConstantPoolComparator,
    pub registry: &'a dyn ClassRegistry,
}

impl<'a> ChangeDetector<'a> {
    /// Diff two versions of a class
    ///
    /// `name` is the name the class has once the batch is applied, which the new definition must
    /// declare. `renamed` marks a loaded class that takes that name in place of its current one.
    /// The verdict is the most severe change found. Under `restricted`, changes outside of method
    /// bodies are rejected.
    pub fn detect(
        &self,
        loader: LoaderId,
        name: &BinaryName,
        old: &ClassFile,
        new: &ClassFile,
        restricted: bool,
        renamed: bool,
    ) -> Result<(ClassChange, DetectedChange), RedefinitionRejected> {
        let new_name = new.name()?;
        if new_name != name.as_str() {
            return Err(RedefinitionRejected::with_message(
                RedefinitionError::ClassNameMismatch,
                format!("expected {} but the definition is for {}", name, new_name),
            ));
        }

        let mut change = DetectedChange::default();
        let mut verdicts = vec![];
        if renamed {
            verdicts.push(ClassChange::ClassNameChanged);
        }

        self.check_enum_constants(old, new)?;
        if restricted {
            check_restricted_attributes(old, new)?;
        }
        verdicts.push(self.compare_methods(old, new, restricted, &mut change)?);
        verdicts.push(compare_fields(old, new, restricted, &mut change)?);
        verdicts.push(compare_class_flags(old, new, restricted)?);
        verdicts.push(self.compare_hierarchy(loader, old, new, restricted, &mut change)?);

        let verdict = ClassChange::most_severe(verdicts);
        log::debug!("{} in {:?}: {:?}", name, loader, verdict);
        Ok((verdict, change))
    }

    /// Enum constants may be appended to, but never removed or reordered
    fn check_enum_constants(
        &self,
        old: &ClassFile,
        new: &ClassFile,
    ) -> Result<(), RedefinitionRejected> {
        if old.super_name()? != Some(self.settings.enum_base_class.as_str()) {
            return Ok(());
        }
        let old_constants = enum_constants(old)?;
        let new_constants = enum_constants(new)?;
        if !new_constants.starts_with(&old_constants) {
            return Err(RedefinitionRejected::with_message(
                RedefinitionError::SchemaChanged,
                "enum constants were removed or reordered",
            ));
        }
        Ok(())
    }

    fn compare_methods(
        &self,
        old: &ClassFile,
        new: &ClassFile,
        restricted: bool,
        change: &mut DetectedChange,
    ) -> Result<ClassChange, RedefinitionRejected> {
        let mut verdicts = vec![];
        let mut unmatched: Vec<&Method> = old.methods.iter().collect();
        let mut added = vec![];

        for new_method in &new.methods {
            let summary = method_summary(new, new_method)?;
            let mut found = None;
            for (position, old_method) in unmatched.iter().enumerate() {
                let old_attributes = &old_method.attributes;
                let new_attributes = &new_method.attributes;
                if old_method.access_flags == new_method.access_flags
                    && method_summary(old, old_method)?.key == summary.key
                    && same_attributes(old, old_attributes, new, new_attributes, |name| {
                        METHOD_METADATA.contains(&name)
                    })?
                {
                    found = Some(position);
                    break;
                }
            }

            let old_method = match found {
                Some(position) => unmatched.remove(position),
                None => {
                    if summary.key.is_static_initializer() {
                        change.clinit_changed = true;
                    }
                    added.push(summary);
                    continue;
                }
            };

            let old_code = old_method.code(&old.constants)?;
            let new_code = new_method.code(&new.constants)?;
            let (body_change, new_code) = match (old_code, new_code) {
                (None, None) => (ClassChange::NoChange, None),
                (Some(old_code), Some(new_code)) => {
                    (self.compare_bodies(old, &old_code, new, &new_code)?, Some(new_code))
                }
                _ => {
                    return Err(RedefinitionRejected::with_message(
                        RedefinitionError::InvalidClassFormat,
                        format!(
                            "{}{} has code in only one version",
                            summary.key.name, summary.key.descriptor
                        ),
                    ))
                }
            };

            match new_code {
                Some(code) if body_change != ClassChange::NoChange => {
                    if summary.key.is_static_initializer() {
                        change.clinit_changed = true;
                    }
                    change.changed_method_bodies.insert(summary.key, code);
                    verdicts.push(body_change);
                }
                _ => change.unchanged_methods.push(summary),
            }
        }

        let removed = unmatched
            .into_iter()
            .map(|method| method_summary(old, method))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(method) = removed.first() {
            if restricted {
                return Err(RedefinitionRejected::with_message(
                    RedefinitionError::MethodDeleted,
                    format!("{}{} was deleted", method.key.name, method.key.descriptor),
                ));
            }
            verdicts.push(ClassChange::RemoveMethod);
        }
        if let Some(method) = added.first() {
            if restricted {
                return Err(RedefinitionRejected::with_message(
                    RedefinitionError::MethodAdded,
                    format!("{}{} was added", method.key.name, method.key.descriptor),
                ));
            }
            verdicts.push(ClassChange::AddMethod);
        }

        change.removed_methods = removed;
        change.added_methods = added;
        Ok(ClassChange::most_severe(verdicts))
    }

    /// Classify a matched method body
    ///
    /// Returns `MethodBodyChange` when the instruction bytes or the debug tables differ,
    /// `ConstantPoolChange` when the bytes are the same but a constant read by an instruction now
    /// resolves to something else, and `NoChange` otherwise.
    fn compare_bodies(
        &self,
        old: &ClassFile,
        old_code: &Code,
        new: &ClassFile,
        new_code: &Code,
    ) -> Result<ClassChange, jvm::Error> {
        let old_bytes = &old_code.code_array.0;
        let new_bytes = &new_code.code_array.0;
        if old_code.max_stack != new_code.max_stack
            || old_code.max_locals != new_code.max_locals
            || old_bytes.len() != new_bytes.len()
            || !self.same_exception_tables(old, old_code, new, new_code)
        {
            return Ok(ClassChange::MethodBodyChange);
        }

        let old_lines = find_attribute::<LineNumberTable>(&old_code.attributes, &old.constants)?;
        let new_lines = find_attribute::<LineNumberTable>(&new_code.attributes, &new.constants)?;
        if old_lines != new_lines {
            return Ok(ClassChange::MethodBodyChange);
        }

        let old_locals =
            find_attribute::<LocalVariableTable>(&old_code.attributes, &old.constants)?;
        let new_locals =
            find_attribute::<LocalVariableTable>(&new_code.attributes, &new.constants)?;
        let old_locals = old_locals.map(|table| table.0);
        let new_locals = new_locals.map(|table| table.0);
        if !same_local_variables(old, old_locals.as_deref(), new, new_locals.as_deref())? {
            return Ok(ClassChange::MethodBodyChange);
        }

        let old_types =
            find_attribute::<LocalVariableTypeTable>(&old_code.attributes, &old.constants)?;
        let new_types =
            find_attribute::<LocalVariableTypeTable>(&new_code.attributes, &new.constants)?;
        let old_types = old_types.map(|table| table.0);
        let new_types = new_types.map(|table| table.0);
        if !same_local_variables(old, old_types.as_deref(), new, new_types.as_deref())? {
            return Ok(ClassChange::MethodBodyChange);
        }

        if old_bytes != new_bytes {
            return Ok(ClassChange::MethodBodyChange);
        }

        // Same instructions: only the constants they read can have changed meaning
        let mut constants_changed = false;
        for instruction in InstructionIter::new(old_bytes) {
            if let Some(constant) = instruction?.constant {
                if !self.comparator.is_same_reference(
                    &old.constants,
                    constant,
                    &new.constants,
                    constant,
                ) {
                    constants_changed = true;
                    break;
                }
            }
        }

        if constants_changed {
            Ok(ClassChange::ConstantPoolChange)
        } else {
            Ok(ClassChange::NoChange)
        }
    }

    fn same_exception_tables(
        &self,
        old: &ClassFile,
        old_code: &Code,
        new: &ClassFile,
        new_code: &Code,
    ) -> bool {
        old_code.exception_table.len() == new_code.exception_table.len()
            && old_code
                .exception_table
                .iter()
                .zip(&new_code.exception_table)
                .all(|(old_handler, new_handler)| {
                    old_handler.start_pc == new_handler.start_pc
                        && old_handler.end_pc == new_handler.end_pc
                        && old_handler.handler_pc == new_handler.handler_pc
                        && match (
                            old_handler.catch_type.0.is_null(),
                            new_handler.catch_type.0.is_null(),
                        ) {
                            (true, true) => true,
                            (false, false) => self.comparator.is_same_reference(
                                &old.constants,
                                old_handler.catch_type.0,
                                &new.constants,
                                new_handler.catch_type.0,
                            ),
                            _ => false,
                        }
                })
    }

    fn compare_hierarchy(
        &self,
        loader: LoaderId,
        old: &ClassFile,
        new: &ClassFile,
        restricted: bool,
        change: &mut DetectedChange,
    ) -> Result<ClassChange, RedefinitionRejected> {
        let new_super = new.super_name()?;
        let new_interfaces = new.interface_names()?;
        if old.super_name()? == new_super && old.interface_names()? == new_interfaces {
            return Ok(ClassChange::NoChange);
        }
        if restricted {
            return Err(RedefinitionRejected::new(
                RedefinitionError::ClassHierarchyChanged,
            ));
        }

        change.hierarchy_changed = true;
        if let Some(new_super) = new_super {
            change.new_superclass = Some(self.resolve_supertype(loader, new_super)?);
        }
        for interface in new_interfaces {
            let interface = self.resolve_supertype(loader, interface)?;
            change.new_interfaces.push(interface);
        }
        Ok(ClassChange::ClassHierarchyChanged)
    }

    /// Find a supertype, loading it if needed
    fn resolve_supertype(
        &self,
        loader: LoaderId,
        name: &str,
    ) -> Result<ClassRef, RedefinitionRejected> {
        let name = BinaryName::from_string(name.to_owned()).map_err(|msg| {
            RedefinitionRejected::with_message(RedefinitionError::InvalidClassFormat, msg)
        })?;
        self.registry
            .find_loaded(loader, &name)
            .or_else(|| self.registry.load(loader, &name))
            .ok_or_else(|| {
                RedefinitionRejected::with_message(
                    RedefinitionError::UnresolvedSupertype,
                    format!("cannot resolve new supertype {}", name),
                )
            })
    }
}

fn method_summary(class: &ClassFile, method: &Method) -> Result<MethodSummary, jvm::Error> {
    Ok(MethodSummary {
        key: MemberKey::new(method.name(&class.constants)?, method.descriptor(&class.constants)?),
        access_flags: method.access_flags,
    })
}

fn field_summary(class: &ClassFile, field: &Field) -> Result<FieldSummary, jvm::Error> {
    Ok(FieldSummary {
        key: MemberKey::new(field.name(&class.constants)?, field.descriptor(&class.constants)?),
        access_flags: field.access_flags,
    })
}

fn enum_constants(class: &ClassFile) -> Result<Vec<&str>, jvm::Error> {
    class
        .fields
        .iter()
        .filter(|field| field.access_flags.contains(FieldAccessFlags::ENUM))
        .map(|field| field.name(&class.constants))
        .collect()
}

/// How a field with the same name and type differs between versions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FieldDelta {
    Identical,

    /// Only the `ConstantValue` resolves to a different value
    ConstantValue,
    Different,
}

fn compare_field(
    old: &ClassFile,
    old_field: &Field,
    new: &ClassFile,
    new_field: &Field,
) -> Result<FieldDelta, jvm::Error> {
    if old_field.access_flags != new_field.access_flags
        || !same_attributes(old, &old_field.attributes, new, &new_field.attributes, |name| {
            name != ConstantValue::NAME
        })?
    {
        return Ok(FieldDelta::Different);
    }
    if constant_value(old, old_field)? != constant_value(new, new_field)? {
        return Ok(FieldDelta::ConstantValue);
    }
    Ok(FieldDelta::Identical)
}

fn constant_value(
    class: &ClassFile,
    field: &Field,
) -> Result<Option<SymbolicConstant>, jvm::Error> {
    find_attribute::<ConstantValue>(&field.attributes, &class.constants)?
        .map(|value| class.constants.get_symbolic(value.0))
        .transpose()
}

/// Fields match by name and type
///
/// A pair whose only difference is the resolved constant value is counted as a removal plus an
/// addition, but is the one schema change still allowed under restriction (and only when every
/// added and removed field is part of such a pair).
fn compare_fields(
    old: &ClassFile,
    new: &ClassFile,
    restricted: bool,
    change: &mut DetectedChange,
) -> Result<ClassChange, RedefinitionRejected> {
    let mut unmatched: Vec<&Field> = old.fields.iter().collect();
    let mut added = vec![];
    let mut removed = vec![];
    let mut constant_value_pairs = 0;

    for new_field in &new.fields {
        let summary = field_summary(new, new_field)?;
        let mut found = None;
        for (position, old_field) in unmatched.iter().enumerate() {
            if field_summary(old, old_field)?.key == summary.key {
                found = Some(position);
                break;
            }
        }
        let old_field = match found {
            Some(position) => unmatched.remove(position),
            None => {
                added.push(summary);
                continue;
            }
        };
        match compare_field(old, old_field, new, new_field)? {
            FieldDelta::Identical => continue,
            FieldDelta::ConstantValue => constant_value_pairs += 1,
            FieldDelta::Different => (),
        }
        removed.push(field_summary(old, old_field)?);
        added.push(summary);
    }
    for old_field in unmatched {
        removed.push(field_summary(old, old_field)?);
    }

    if added.is_empty() && removed.is_empty() {
        return Ok(ClassChange::NoChange);
    }
    let only_constant_values =
        added.len() == constant_value_pairs && removed.len() == constant_value_pairs;
    if restricted && !only_constant_values {
        let message = match (added.first(), removed.first()) {
            (Some(field), _) => {
                format!("field {} {} was added", field.key.descriptor, field.key.name)
            }
            (None, Some(field)) => {
                format!("field {} {} was removed", field.key.descriptor, field.key.name)
            }
            (None, None) => String::new(),
        };
        return Err(RedefinitionRejected::with_message(RedefinitionError::SchemaChanged, message));
    }

    for added_field in &added {
        let compatible = removed.iter().find(|removed_field| {
            removed_field.key == added_field.key
                && removed_field.is_static() == added_field.is_static()
        });
        if let Some(removed_field) = compatible {
            change
                .mapped_compatible_fields
                .push((added_field.key.clone(), removed_field.key.clone()));
        }
    }
    for field in added {
        if field.is_static() {
            change.added_static_fields.push(field);
        } else {
            change.added_instance_fields.push(field);
        }
    }
    change.removed_fields = removed;
    Ok(ClassChange::SchemaChange)
}

/// `ACC_SUPER` is ignored: modern VMs treat every class as having it
fn compare_class_flags(
    old: &ClassFile,
    new: &ClassFile,
    restricted: bool,
) -> Result<ClassChange, RedefinitionRejected> {
    let old_flags = old.access_flags - ClassAccessFlags::SUPER;
    let new_flags = new.access_flags - ClassAccessFlags::SUPER;
    if old_flags == new_flags {
        Ok(ClassChange::NoChange)
    } else if restricted {
        Err(RedefinitionRejected::with_message(
            RedefinitionError::ClassModifiersChanged,
            format!("class modifiers changed from {:?} to {:?}", old_flags, new_flags),
        ))
    } else {
        Ok(ClassChange::SchemaChange)
    }
}

fn check_restricted_attributes(
    old: &ClassFile,
    new: &ClassFile,
) -> Result<(), RedefinitionRejected> {
    let changed = if nest_host(old)? != nest_host(new)? {
        Some(NestHost::NAME)
    } else if class_list(old, |NestMembers(members)| members)?
        != class_list(new, |NestMembers(members)| members)?
    {
        Some(NestMembers::NAME)
    } else if record_components(old)? != record_components(new)? {
        Some(Record::NAME)
    } else if class_list(old, |PermittedSubclasses(classes)| classes)?
        != class_list(new, |PermittedSubclasses(classes)| classes)?
    {
        Some(PermittedSubclasses::NAME)
    } else {
        None
    };
    match changed {
        Some(attribute) => Err(RedefinitionRejected::with_message(
            RedefinitionError::ClassAttributeChanged,
            format!("the {} attribute changed", attribute),
        )),
        None => Ok(()),
    }
}

fn nest_host(class: &ClassFile) -> Result<Option<String>, jvm::Error> {
    class
        .attribute::<NestHost>()?
        .map(|NestHost(host)| class.constants.get_class_name(host).map(str::to_owned))
        .transpose()
}

fn class_list<A, F>(class: &ClassFile, classes: F) -> Result<Option<Vec<String>>, jvm::Error>
where
    A: AttributeLike,
    F: FnOnce(A) -> Vec<ClassConstantIndex>,
{
    class
        .attribute::<A>()?
        .map(|attribute| class_names(class, &classes(attribute)))
        .transpose()
}

fn class_names(
    class: &ClassFile,
    indices: &[ClassConstantIndex],
) -> Result<Vec<String>, jvm::Error> {
    indices
        .iter()
        .map(|index| class.constants.get_class_name(*index).map(str::to_owned))
        .collect()
}

/// Name, descriptor, and generic signature of each record component
fn record_components(
    class: &ClassFile,
) -> Result<Option<Vec<(String, String, Option<String>)>>, jvm::Error> {
    let record = match class.attribute::<Record>()? {
        Some(record) => record,
        None => return Ok(None),
    };
    let mut components = vec![];
    for component in record.0 {
        let signature = find_attribute::<Signature>(&component.attributes, &class.constants)?
            .map(|Signature(signature)| class.constants.get_utf8(signature).map(str::to_owned))
            .transpose()?;
        components.push((
            class.constants.get_utf8(component.name_index)?.to_owned(),
            class.constants.get_utf8(component.descriptor_index)?.to_owned(),
            signature,
        ));
    }
    Ok(Some(components))
}

fn same_local_variables(
    old: &ClassFile,
    old_locals: Option<&[LocalVariable]>,
    new: &ClassFile,
    new_locals: Option<&[LocalVariable]>,
) -> Result<bool, jvm::Error> {
    let (old_locals, new_locals) = match (old_locals, new_locals) {
        (None, None) => return Ok(true),
        (Some(old_locals), Some(new_locals)) if old_locals.len() == new_locals.len() => {
            (old_locals, new_locals)
        }
        _ => return Ok(false),
    };
    for (old_local, new_local) in old_locals.iter().zip(new_locals) {
        if old_local.start_pc != new_local.start_pc
            || old_local.length != new_local.length
            || old_local.index != new_local.index
            || old.constants.get_utf8(old_local.name_index)?
                != new.constants.get_utf8(new_local.name_index)?
            || old.constants.get_utf8(old_local.descriptor_index)?
                != new.constants.get_utf8(new_local.descriptor_index)?
        {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Attribute body with constant pool references resolved
#[derive(Debug, PartialEq, Eq)]
enum AttributeContent {
    Annotations(Vec<AnnotationToken>),
    Classes(Vec<String>),
    Text(String),
    Constant(SymbolicConstant),
    Raw(Vec<u8>),
}

fn attribute_content(
    class: &ClassFile,
    attribute: &Attribute,
) -> Result<AttributeContent, jvm::Error> {
    let name = attribute.name(&class.constants)?;
    let content = if ANNOTATION_ATTRIBUTES.contains(&name) {
        let annotations = symbolic_annotations(name, &attribute.info, &class.constants)?;
        AttributeContent::Annotations(annotations)
    } else if name == Exceptions::NAME {
        let Exceptions(exceptions) = attribute.decode()?;
        AttributeContent::Classes(class_names(class, &exceptions)?)
    } else if name == Signature::NAME {
        let Signature(signature) = attribute.decode()?;
        AttributeContent::Text(class.constants.get_utf8(signature)?.to_owned())
    } else if name == ConstantValue::NAME {
        let ConstantValue(value) = attribute.decode()?;
        AttributeContent::Constant(class.constants.get_symbolic(value)?)
    } else {
        AttributeContent::Raw(attribute.info.clone())
    };
    Ok(content)
}

/// Compare the attributes selected by `include`, in order, resolving constant pool references
fn same_attributes(
    old: &ClassFile,
    old_attributes: &[Attribute],
    new: &ClassFile,
    new_attributes: &[Attribute],
    include: impl Fn(&str) -> bool,
) -> Result<bool, jvm::Error> {
    let contents = |class: &ClassFile, attributes: &[Attribute]| {
        let mut contents: Vec<(String, AttributeContent)> = vec![];
        for attribute in attributes {
            let name = attribute.name(&class.constants)?;
            if include(name) {
                contents.push((name.to_owned(), attribute_content(class, attribute)?));
            }
        }
        Ok::<_, jvm::Error>(contents)
    };
    Ok(contents(old, old_attributes)? == contents(new, new_attributes)?)
}
