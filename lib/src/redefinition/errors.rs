use crate::jvm;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Reasons a redefinition can be rejected
///
/// The numeric codes are stable and match the JDWP error constants debuggers already understand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RedefinitionError {
    InvalidClassFormat,
    ClassNameMismatch,
    UnresolvedSupertype,
    UnsupportedVersion,
    CircularClassDefinition,
    FailsVerification,
    SchemaChanged,
    MethodDeleted,
    MethodAdded,
    ClassModifiersChanged,
    ClassHierarchyChanged,
    ClassAttributeChanged,
}

impl RedefinitionError {
    pub const ALL: [RedefinitionError; 12] = [
        RedefinitionError::InvalidClassFormat,
        RedefinitionError::ClassNameMismatch,
        RedefinitionError::UnresolvedSupertype,
        RedefinitionError::UnsupportedVersion,
        RedefinitionError::CircularClassDefinition,
        RedefinitionError::FailsVerification,
        RedefinitionError::SchemaChanged,
        RedefinitionError::MethodDeleted,
        RedefinitionError::MethodAdded,
        RedefinitionError::ClassModifiersChanged,
        RedefinitionError::ClassHierarchyChanged,
        RedefinitionError::ClassAttributeChanged,
    ];

    /// Stable external code
    pub const fn code(&self) -> u16 {
        match self {
            RedefinitionError::UnresolvedSupertype => 21,
            RedefinitionError::InvalidClassFormat => 60,
            RedefinitionError::CircularClassDefinition => 61,
            RedefinitionError::FailsVerification => 62,
            RedefinitionError::MethodAdded => 63,
            RedefinitionError::SchemaChanged => 64,
            RedefinitionError::ClassHierarchyChanged => 66,
            RedefinitionError::MethodDeleted => 67,
            RedefinitionError::UnsupportedVersion => 68,
            RedefinitionError::ClassNameMismatch => 69,
            RedefinitionError::ClassModifiersChanged => 70,
            RedefinitionError::ClassAttributeChanged => 72,
        }
    }

    pub fn from_code(code: u16) -> Option<RedefinitionError> {
        RedefinitionError::ALL
            .iter()
            .copied()
            .find(|error| error.code() == code)
    }

    /// Message used when the rejection site has nothing more specific to say
    pub const fn default_message(&self) -> Option<&'static str> {
        match self {
            RedefinitionError::SchemaChanged => {
                Some("A field was added or removed, or an enum constant was removed or reordered")
            }
            RedefinitionError::MethodDeleted => Some("A method was deleted"),
            RedefinitionError::MethodAdded => Some("A method was added"),
            RedefinitionError::ClassModifiersChanged => Some("Class modifiers were changed"),
            RedefinitionError::ClassHierarchyChanged => {
                Some("The superclass or implemented interfaces were changed")
            }
            RedefinitionError::ClassAttributeChanged => Some(
                "The NestHost, NestMembers, Record, or PermittedSubclasses attribute was changed",
            ),
            RedefinitionError::ClassNameMismatch => {
                Some("The class name in the new definition does not match")
            }
            RedefinitionError::InvalidClassFormat
            | RedefinitionError::UnresolvedSupertype
            | RedefinitionError::UnsupportedVersion
            | RedefinitionError::CircularClassDefinition
            | RedefinitionError::FailsVerification => None,
        }
    }
}

impl Display for RedefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// The only error a redefinition reports
///
/// A rejected batch leaves no structural change behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedefinitionRejected {
    pub error: RedefinitionError,
    message: Option<String>,
}

impl RedefinitionRejected {
    /// Rejection carrying the default message of the error (if any)
    pub fn new(error: RedefinitionError) -> RedefinitionRejected {
        RedefinitionRejected {
            error,
            message: None,
        }
    }

    pub fn with_message(error: RedefinitionError, message: impl Into<String>) -> Self {
        RedefinitionRejected {
            error,
            message: Some(message.into()),
        }
    }

    pub fn code(&self) -> u16 {
        self.error.code()
    }

    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or_else(|| self.error.default_message())
    }
}

impl Display for RedefinitionRejected {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self.message() {
            Some(message) => write!(f, "redefinition rejected, {}: {}", self.error, message),
            None => write!(f, "redefinition rejected, {}", self.error),
        }
    }
}

impl std::error::Error for RedefinitionRejected {}

/// Class files that cannot be decoded or re-encoded are invalid class formats
impl From<jvm::Error> for RedefinitionRejected {
    fn from(err: jvm::Error) -> RedefinitionRejected {
        RedefinitionRejected::with_message(RedefinitionError::InvalidClassFormat, err.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_distinct_and_reversible() {
        let codes: HashSet<u16> = RedefinitionError::ALL.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), RedefinitionError::ALL.len());
        for error in RedefinitionError::ALL {
            assert_eq!(RedefinitionError::from_code(error.code()), Some(error));
        }
        assert_eq!(RedefinitionError::from_code(0), None);
    }

    #[test]
    fn messages() {
        let rejected = RedefinitionRejected::new(RedefinitionError::MethodAdded);
        assert_eq!(rejected.message(), Some("A method was added"));
        assert_eq!(rejected.code(), 63);

        let rejected = RedefinitionRejected::new(RedefinitionError::InvalidClassFormat);
        assert_eq!(rejected.message(), None);

        let rejected: RedefinitionRejected = jvm::Error::BadMagic(0).into();
        assert_eq!(rejected.error, RedefinitionError::InvalidClassFormat);
        assert!(rejected.message().unwrap().contains("magic"));
    }
}
