//! Redefinition of loaded classes
//!
//! A batch of new class files goes through [`RedefinitionEngine::redefine`]:
//!
//!   1. [`InnerClassMatcher`] pairs anonymous classes with the identities they had before, and
//!      patches references to any class it renames
//!   2. [`ChangeDetector`] diffs each class against its loaded version, producing a
//!      [`ClassChange`] verdict and a [`DetectedChange`]
//!   3. the engine applies the changes supertypes first, refreshes subclasses that depend on them,
//!      and re-runs static initializers that changed
//!
//! All of this happens while holding the [`RedefinitionLock`]. Any rejection (a
//! [`RedefinitionRejected`]) aborts the batch before a loaded class is modified.

mod cache;
mod change;
mod class_info;
mod detector;
mod engine;
mod errors;
mod fingerprint;
mod hierarchy;
mod matcher;
mod patcher;
mod rules;
mod session;
mod settings;
mod transaction;
mod vm;

pub use cache::*;
pub use change::*;
pub use class_info::*;
pub use detector::*;
pub use engine::*;
pub use errors::*;
pub use fingerprint::*;
pub use hierarchy::*;
pub use matcher::*;
pub use patcher::*;
pub use rules::*;
pub use session::*;
pub use settings::*;
pub use transaction::*;
pub use vm::*;
