use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in internal form (eg. `java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

pub trait Name: Sized {
    /// Check that a string is a valid name of this kind
    fn check_valid(name: &str) -> Result<(), String>;

    /// Validate and wrap a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            Err(String::from("empty unqualified name"))
        } else if let Some(c) = name.chars().find(|c| matches!(c, '.' | ';' | '[' | '/')) {
            Err(format!("unqualified name {:?} contains '{}'", name, c))
        } else {
            Ok(())
        }
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("empty binary name"));
        }
        for segment in name.split('/') {
            UnqualifiedName::check_valid(segment)
                .map_err(|err| format!("in binary name {:?}: {}", name, err))?;
        }
        Ok(())
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.0)
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.0)
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(&self.0)
    }
}

impl UnqualifiedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Only these special names may contain angle brackets
    pub const INIT: Self = UnqualifiedName(Cow::Borrowed("<init>"));
    pub const CLINIT: Self = UnqualifiedName(Cow::Borrowed("<clinit>"));
}

impl BinaryName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append to the simple name (eg. `a/Outer` and `$1` make `a/Outer$1`)
    pub fn concat(&self, suffix: &str) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}{}", self.0, suffix)))
    }

    /// Name of the enclosing class according to the `$` nesting convention
    ///
    /// `a/b/Outer$1$2` is nested in `a/b/Outer$1`. A `$` at the very start of the simple name is
    /// part of the name and not a nesting separator.
    pub fn outer_class(&self) -> Option<BinaryName> {
        let simple_start = self.0.rfind('/').map_or(0, |slash| slash + 1);
        match self.0[simple_start..].rfind('$') {
            Some(0) | None => None,
            Some(dollar) => {
                let outer = &self.0[..simple_start + dollar];
                Some(BinaryName(Cow::Owned(outer.to_owned())))
            }
        }
    }

    pub const ENUM: Self = BinaryName(Cow::Borrowed("java/lang/Enum"));
    pub const OBJECT: Self = BinaryName(Cow::Borrowed("java/lang/Object"));
}
