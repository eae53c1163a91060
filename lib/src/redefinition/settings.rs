use crate::jvm::class_file::Version;
use crate::jvm::BinaryName;

pub struct RedefinitionSettings {
    /// Reject schema, hierarchy, and method set changes outright
    ///
    /// This is the compatibility behaviour debuggers expect. Turning it off ("advanced" mode)
    /// lets those changes through, leaving the runtime to migrate what it can.
    pub restricted: bool,

    /// Marker used to build fresh names for inner classes that match no previous inner class
    ///
    /// Names are formed as `Outer` + marker + counter (eg. `a/Outer$hotswap1`).
    pub hot_class_marker: String,

    /// Superclass identifying enum classes, whose constants may only be appended to
    pub enum_base_class: BinaryName,

    /// Newest class file version accepted
    pub max_supported_version: Version,

    /// Weights of the signals used when pairing anonymous inner classes
    pub match_weights: MatchWeights,

    /// Ask the class loader for anonymous inner classes referenced by, but missing from, a batch
    pub fetch_missing_inner_classes: bool,
}

impl Default for RedefinitionSettings {
    fn default() -> Self {
        RedefinitionSettings {
            restricted: true,
            hot_class_marker: String::from("$hotswap"),
            enum_base_class: BinaryName::ENUM,
            max_supported_version: Version::JAVA21,
            match_weights: MatchWeights::default(),
            fetch_missing_inner_classes: true,
        }
    }
}

impl RedefinitionSettings {
    /// Settings with restrictions lifted
    pub fn advanced() -> Self {
        RedefinitionSettings {
            restricted: false,
            ..RedefinitionSettings::default()
        }
    }
}

/// Each signal that agrees between a new and a previous inner class adds its weight to the score
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatchWeights {
    pub methods: u32,
    pub enclosing_method: u32,
    pub fields: u32,
    pub inner_class_count: u32,
}

impl MatchWeights {
    /// Score of a pair agreeing on every signal
    pub const fn max_score(&self) -> u32 {
        self.methods + self.enclosing_method + self.fields + self.inner_class_count
    }
}

impl Default for MatchWeights {
    fn default() -> Self {
        MatchWeights {
            methods: 8,
            enclosing_method: 4,
            fields: 2,
            inner_class_count: 1,
        }
    }
}
