#![allow(dead_code)]

use hotswap::jvm::bytecode::NEW;
use hotswap::jvm::class_builder::ClassBuilder;
use hotswap::jvm::class_file::{BytecodeArray, ClassFile, Code, ConstantValue, EnclosingMethod};
use hotswap::jvm::{
    BinaryName, ClassAccessFlags, Constant, FieldAccessFlags, MethodAccessFlags, Name,
};
use hotswap::redefinition::{
    ChangePacket, ClassChange, ClassRef, ClassRegistry, LoadedClass, LoaderId, RedefineRequest,
    RedefinitionError, RedefinitionRejected,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const LOADER: LoaderId = LoaderId(1);
pub const RETURN: u8 = 0xb1;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(name: &str) -> BinaryName {
    BinaryName::from_string(name.to_owned()).unwrap()
}

/// Loaded class that records what the engine did to it
#[derive(Debug)]
pub struct MockClass {
    name: Mutex<BinaryName>,
    definition: Mutex<Arc<ClassFile>>,
    superclass: Mutex<Option<ClassRef>>,
    interfaces: Mutex<Vec<ClassRef>>,

    pub swaps: AtomicUsize,
    pub verdicts: Mutex<Vec<ClassChange>>,
    pub refreshes: AtomicUsize,
    pub initializer_runs: AtomicUsize,
    pub fail_initializer: AtomicBool,
    pub removed: AtomicBool,
}

impl MockClass {
    pub fn definition_bytes(&self) -> Vec<u8> {
        self.definition.lock().to_bytes().unwrap()
    }

    pub fn superclass_name(&self) -> Option<BinaryName> {
        self.superclass.lock().as_ref().map(|superclass| superclass.name())
    }

    /// Whether the class pool mentions this string
    pub fn mentions(&self, utf8: &str) -> bool {
        self.definition
            .lock()
            .constants
            .values()
            .any(|constant| matches!(constant, Constant::Utf8(found) if found == utf8))
    }
}

impl LoadedClass for MockClass {
    fn name(&self) -> BinaryName {
        self.name.lock().clone()
    }

    fn loader(&self) -> LoaderId {
        LOADER
    }

    fn definition(&self) -> Arc<ClassFile> {
        self.definition.lock().clone()
    }

    fn superclass(&self) -> Option<ClassRef> {
        self.superclass.lock().clone()
    }

    fn interfaces(&self) -> Vec<ClassRef> {
        self.interfaces.lock().clone()
    }

    fn rename(&self, new_name: &BinaryName) {
        *self.name.lock() = new_name.clone();
    }

    fn detach_from_hierarchy(&self) {
        *self.superclass.lock() = None;
        self.interfaces.lock().clear();
    }

    fn swap_version(&self, packet: &ChangePacket) -> Vec<ClassRef> {
        *self.definition.lock() = packet.parsed.clone();
        if packet.detected_change.hierarchy_changed {
            *self.superclass.lock() = packet.detected_change.new_superclass.clone();
            *self.interfaces.lock() = packet.detected_change.new_interfaces.clone();
        }
        self.verdicts.lock().push(packet.class_change);
        self.swaps.fetch_add(1, Ordering::SeqCst);
        vec![]
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn rerun_static_initializer(&self) -> Result<(), String> {
        self.initializer_runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_initializer.load(Ordering::SeqCst) {
            Err(format!("{} threw ExceptionInInitializerError", self.name()))
        } else {
            Ok(())
        }
    }

    fn remove_from_registry(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }
}

/// Single loader holding classes in memory
#[derive(Default)]
pub struct MockRegistry {
    classes: Mutex<Vec<Arc<MockClass>>>,
    resources: Mutex<HashMap<BinaryName, Vec<u8>>>,
    pub defined: Mutex<Vec<BinaryName>>,

    /// Number of definitions to accept before `define` fails
    pub define_limit: Mutex<Option<usize>>,
}

impl MockRegistry {
    /// Registry with `java/lang/Object` already loaded
    pub fn new() -> Arc<MockRegistry> {
        let registry = Arc::new(MockRegistry::default());
        let object = ClassBuilder::new(ClassAccessFlags::PUBLIC, "java/lang/Object", None, &[])
            .unwrap()
            .result();
        registry.load_class(&object.to_bytes().unwrap());
        registry
    }

    /// Load a class from bytes (its supertypes must be loaded first)
    pub fn load_class(&self, bytes: &[u8]) -> Arc<MockClass> {
        let parsed = ClassFile::parse(bytes).unwrap();
        let interfaces = parsed
            .interface_names()
            .unwrap()
            .into_iter()
            .filter_map(|interface| self.find(&name(interface)))
            .map(|interface| interface as ClassRef)
            .collect();
        let class = Arc::new(MockClass {
            name: Mutex::new(name(parsed.name().unwrap())),
            superclass: Mutex::new(self.resolve_superclass(&parsed)),
            interfaces: Mutex::new(interfaces),
            definition: Mutex::new(Arc::new(parsed)),
            swaps: AtomicUsize::new(0),
            verdicts: Mutex::new(vec![]),
            refreshes: AtomicUsize::new(0),
            initializer_runs: AtomicUsize::new(0),
            fail_initializer: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        });
        self.classes.lock().push(class.clone());
        class
    }

    pub fn load_spec(&self, spec: ClassSpec<'_>) -> Arc<MockClass> {
        self.load_class(&spec.bytes())
    }

    fn resolve_superclass(&self, parsed: &ClassFile) -> Option<ClassRef> {
        let super_name = parsed.super_name().unwrap()?;
        self.find(&name(super_name)).map(|class| class as ClassRef)
    }

    pub fn add_resource(&self, bytes: Vec<u8>) {
        let parsed = ClassFile::parse(&bytes).unwrap();
        self.resources.lock().insert(name(parsed.name().unwrap()), bytes);
    }

    /// Loaded class by name
    pub fn find(&self, class_name: &BinaryName) -> Option<Arc<MockClass>> {
        self.classes
            .lock()
            .iter()
            .rev()
            .find(|class| &class.name() == class_name && !class.removed.load(Ordering::SeqCst))
            .cloned()
    }

    fn is_subclass(class: &ClassRef, ancestor: &ClassRef) -> bool {
        let direct = class
            .superclass()
            .into_iter()
            .chain(class.interfaces())
            .collect::<Vec<_>>();
        direct.iter().any(|parent| {
            same_class(parent, ancestor) || MockRegistry::is_subclass(parent, ancestor)
        })
    }
}

impl ClassRegistry for MockRegistry {
    fn find_loaded(&self, loader: LoaderId, class_name: &BinaryName) -> Option<ClassRef> {
        if loader != LOADER {
            return None;
        }
        self.find(class_name).map(|class| class as ClassRef)
    }

    fn load(&self, loader: LoaderId, class_name: &BinaryName) -> Option<ClassRef> {
        if let Some(class) = self.find_loaded(loader, class_name) {
            return Some(class);
        }
        let bytes = self.resources.lock().get(class_name).cloned()?;
        Some(self.load_class(&bytes))
    }

    fn define(
        &self,
        _loader: LoaderId,
        class_name: &BinaryName,
        bytes: &[u8],
    ) -> Result<ClassRef, RedefinitionRejected> {
        let mut defined = self.defined.lock();
        if matches!(*self.define_limit.lock(), Some(limit) if defined.len() >= limit) {
            return Err(RedefinitionRejected::with_message(
                RedefinitionError::FailsVerification,
                format!("{} failed verification", class_name),
            ));
        }
        if let Some(existing) = self.find(class_name) {
            existing.removed.store(true, Ordering::SeqCst);
        }
        defined.push(class_name.clone());
        drop(defined);
        Ok(self.load_class(bytes))
    }

    fn loaded_subclasses_of(&self, class: &ClassRef) -> Vec<ClassRef> {
        self.classes
            .lock()
            .iter()
            .filter(|candidate| !candidate.removed.load(Ordering::SeqCst))
            .map(|candidate| candidate.clone() as ClassRef)
            .filter(|candidate| MockRegistry::is_subclass(candidate, class))
            .collect()
    }

    fn resource_bytes(&self, _loader: LoaderId, class_name: &BinaryName) -> Option<Vec<u8>> {
        self.resources.lock().get(class_name).cloned()
    }
}

pub fn same_class(class: &ClassRef, other: &ClassRef) -> bool {
    Arc::as_ptr(class) as *const u8 == Arc::as_ptr(other) as *const u8
}

pub fn is_mock(class: &ClassRef, mock: &Arc<MockClass>) -> bool {
    same_class(class, &(mock.clone() as ClassRef))
}

pub fn request(class: &Arc<MockClass>, bytes: Vec<u8>) -> RedefineRequest {
    RedefineRequest::new(class.clone(), bytes)
}

/// Method body made of raw instructions
pub fn code(instructions: Vec<u8>) -> Code {
    Code {
        max_stack: 2,
        max_locals: 1,
        code_array: BytecodeArray(instructions),
        exception_table: vec![],
        attributes: vec![],
    }
}

/// Describes a class to assemble
pub struct ClassSpec<'a> {
    pub name: &'a str,
    pub super_class: &'a str,
    pub interfaces: Vec<&'a str>,
    pub access_flags: ClassAccessFlags,
    builder_steps: Vec<Box<dyn FnOnce(&mut ClassBuilder) + 'a>>,
}

impl<'a> ClassSpec<'a> {
    pub fn new(name: &'a str) -> ClassSpec<'a> {
        ClassSpec {
            name,
            super_class: "java/lang/Object",
            interfaces: vec![],
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            builder_steps: vec![],
        }
    }

    pub fn extends(mut self, super_class: &'a str) -> Self {
        self.super_class = super_class;
        self
    }

    pub fn implements(mut self, interface: &'a str) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Public instance method returning `void`, with the given instructions
    pub fn method(self, name: &'a str, instructions: Vec<u8>) -> Self {
        self.with(move |builder| {
            builder
                .add_method(
                    MethodAccessFlags::PUBLIC,
                    name,
                    "()V",
                    Some(code(instructions)),
                    vec![],
                )
                .unwrap();
        })
    }

    /// Public method instantiating another class (`new`, then `return`)
    pub fn method_creating(self, name: &'a str, class: &'a str) -> Self {
        self.with(move |builder| {
            let class = builder.constants().get_class(class).unwrap();
            let [high, low] = class.0 .0.to_be_bytes();
            let instructions = vec![NEW, high, low, 0x57, RETURN];
            builder
                .add_method(
                    MethodAccessFlags::PUBLIC,
                    name,
                    "()V",
                    Some(code(instructions)),
                    vec![],
                )
                .unwrap();
        })
    }

    pub fn static_initializer(self, instructions: Vec<u8>) -> Self {
        self.with(move |builder| {
            builder
                .add_method(
                    MethodAccessFlags::STATIC,
                    "<clinit>",
                    "()V",
                    Some(code(instructions)),
                    vec![],
                )
                .unwrap();
        })
    }

    /// Mark the class as declared in a method of its outer class
    pub fn enclosed_in(self, outer: &'a str, method: &'a str) -> Self {
        self.with(move |builder| {
            let class = builder.constants().get_class(outer).unwrap();
            let method = builder.constants().get_name_and_type(method, "()V").unwrap();
            builder
                .add_attribute(EnclosingMethod {
                    class,
                    method: Some(method),
                })
                .unwrap();
        })
    }

    pub fn field(self, flags: FieldAccessFlags, name: &'a str, descriptor: &'a str) -> Self {
        self.with(move |builder| builder.add_field(flags, name, descriptor, vec![]).unwrap())
    }

    /// `static final int` with a constant value
    pub fn constant(self, name: &'a str, value: i32) -> Self {
        self.with(move |builder| {
            let value = builder.constants().get_integer(value).unwrap();
            let attribute = builder.constants().get_attribute(ConstantValue(value)).unwrap();
            builder
                .add_field(
                    FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                    name,
                    "I",
                    vec![attribute],
                )
                .unwrap();
        })
    }

    pub fn with(mut self, step: impl FnOnce(&mut ClassBuilder) + 'a) -> Self {
        self.builder_steps.push(Box::new(step));
        self
    }

    pub fn bytes(self) -> Vec<u8> {
        let mut builder = ClassBuilder::new(
            self.access_flags,
            self.name,
            Some(self.super_class),
            &self.interfaces,
        )
        .unwrap();
        for step in self.builder_steps {
            step(&mut builder);
        }
        builder.result().to_bytes().unwrap()
    }
}
