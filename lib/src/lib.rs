//! Live redefinition of loaded JVM classes
//!
//! Given new class files for classes a virtual machine has already loaded, the engine works out
//! what changed between versions, decides whether the change can be applied in place, and drives
//! the swap through a small set of traits the virtual machine implements (see
//! [`redefinition::LoadedClass`] and [`redefinition::ClassRegistry`]).
//!
//! The crate is split in two layers:
//!
//!   - [`jvm`] reads, writes, and builds class files
//!   - [`redefinition`] compares versions, matches anonymous classes across versions, and applies
//!     batches of changes under a process-wide lock

pub mod jvm;
pub mod redefinition;
pub mod util;
