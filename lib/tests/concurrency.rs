mod common;

use common::*;
use hotswap::redefinition::{
    ClassRef, LoadedClass, RedefinitionEngine, RedefinitionListener, RedefinitionSettings,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const NOP: u8 = 0x00;

/// Holds the redefinition open until released
struct Gate {
    entered: Mutex<Sender<bool>>,
    release: Mutex<Receiver<()>>,
    engine: Mutex<Option<Arc<RedefinitionEngine>>>,
}

impl RedefinitionListener for Gate {
    fn post_redefinition(&self, _changed: &[ClassRef]) -> Result<(), String> {
        let owns_redefinition = match self.engine.lock().as_ref() {
            Some(engine) => engine.is_redefining_thread(),
            None => false,
        };
        self.entered
            .lock()
            .send(owns_redefinition)
            .map_err(|err| err.to_string())?;
        self.release.lock().recv().map_err(|err| err.to_string())
    }
}

#[test]
fn readers_wait_for_the_redefinition() {
    init_logging();
    let registry = MockRegistry::new();
    let greeter = registry.load_spec(ClassSpec::new("a/Greeter").method("greet", vec![RETURN]));
    let engine = Arc::new(RedefinitionEngine::new(
        RedefinitionSettings::default(),
        registry.clone(),
    ));

    let (entered_sender, entered) = channel();
    let (release, release_receiver) = channel();
    let gate = Arc::new(Gate {
        entered: Mutex::new(entered_sender),
        release: Mutex::new(release_receiver),
        engine: Mutex::new(Some(engine.clone())),
    });
    engine.add_listener(gate.clone());

    let new_bytes = ClassSpec::new("a/Greeter").method("greet", vec![NOP, RETURN]).bytes();
    let redefiner = {
        let engine = engine.clone();
        let request = request(&greeter, new_bytes.clone());
        thread::spawn(move || engine.redefine(vec![request]).map(|changed| changed.len()))
    };

    // The listener runs on the redefining thread, inside the transaction
    assert!(entered.recv().unwrap());
    assert!(!engine.is_redefining_thread());

    let checked = Arc::new(AtomicBool::new(false));
    let reader = {
        let engine = engine.clone();
        let greeter = greeter.clone();
        let checked = checked.clone();
        thread::spawn(move || {
            engine.check();
            checked.store(true, Ordering::SeqCst);
            greeter.definition_bytes()
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!checked.load(Ordering::SeqCst));

    release.send(()).unwrap();
    assert_eq!(redefiner.join().unwrap(), Ok(1));
    assert_eq!(reader.join().unwrap(), new_bytes);
    assert!(checked.load(Ordering::SeqCst));

    // Break the cycle between the engine and its listener
    gate.engine.lock().take();
}

#[test]
fn concurrent_batches_are_serialized() {
    init_logging();
    let registry = MockRegistry::new();
    let classes: Vec<_> = (0..4)
        .map(|index| {
            let class_name = format!("a/Worker{}", index);
            registry.load_class(&ClassSpec::new(&class_name).method("run", vec![RETURN]).bytes())
        })
        .collect();
    let engine = Arc::new(RedefinitionEngine::new(
        RedefinitionSettings::default(),
        registry.clone(),
    ));

    let workers: Vec<_> = classes
        .iter()
        .map(|class| {
            let engine = engine.clone();
            let class = class.clone();
            thread::spawn(move || {
                let class_name = class.name().as_str().to_owned();
                for length in 1..=5 {
                    let mut body = vec![NOP; length];
                    body.push(RETURN);
                    let bytes = ClassSpec::new(&class_name).method("run", body).bytes();
                    engine.redefine(vec![request(&class, bytes)]).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for class in &classes {
        assert_eq!(class.swaps.load(Ordering::SeqCst), 5);
    }
    assert!(!engine.is_redefining_thread());
}
