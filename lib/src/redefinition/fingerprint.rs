use super::MatchWeights;
use crate::jvm::class_file::{ClassFile, ConstantsReader, EnclosingMethod};
use crate::jvm::{self, BinaryName, Constant, Name};

/// Structural summary of a class, used only to pair anonymous inner classes across versions
///
/// Each part is a plain string built from names in declaration order. Two classes agree on a part
/// exactly when the strings are equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// `super;interface;...;`
    pub class: String,

    /// `name;descriptor;` for every declared method
    pub methods: String,

    /// `descriptor;name;` for every declared field
    pub fields: String,

    /// `name;descriptor` of the enclosing method (empty when there is none)
    pub enclosing_method: String,
}

impl Fingerprint {
    pub fn of(class: &ClassFile) -> Result<Fingerprint, jvm::Error> {
        let constants = &class.constants;

        let mut class_part = String::new();
        if let Some(super_name) = class.super_name()? {
            class_part.push_str(super_name);
        }
        class_part.push(';');
        for interface in class.interface_names()? {
            class_part.push_str(interface);
            class_part.push(';');
        }

        let mut methods = String::new();
        for method in &class.methods {
            methods.push_str(method.name(constants)?);
            methods.push(';');
            methods.push_str(method.descriptor(constants)?);
            methods.push(';');
        }

        let mut fields = String::new();
        for field in &class.fields {
            fields.push_str(field.descriptor(constants)?);
            fields.push(';');
            fields.push_str(field.name(constants)?);
            fields.push(';');
        }

        let enclosing_method = match class.attribute::<EnclosingMethod>()? {
            Some(EnclosingMethod {
                method: Some(method),
                ..
            }) => {
                let (name, descriptor) = constants.get_name_and_type(method)?;
                format!("{};{}", name, descriptor)
            }
            _ => String::new(),
        };

        Ok(Fingerprint {
            class: class_part,
            methods,
            fields,
            enclosing_method,
        })
    }

    /// Score how well a previous class matches this one
    ///
    /// Classes with different hierarchies never match (score `0`). Otherwise every agreeing signal
    /// adds its weight.
    pub fn match_score(
        &self,
        inner_count: usize,
        previous: &Fingerprint,
        previous_inner_count: usize,
        weights: &MatchWeights,
    ) -> u32 {
        if self.class != previous.class {
            return 0;
        }
        let mut score = 0;
        if self.methods == previous.methods {
            score += weights.methods;
        }
        if self.enclosing_method == previous.enclosing_method {
            score += weights.enclosing_method;
        }
        if self.fields == previous.fields {
            score += weights.fields;
        }
        if inner_count == previous_inner_count {
            score += weights.inner_class_count;
        }
        score
    }
}

/// Whether the simple name segment after the last `$` starts with a digit (`Outer$1`,
/// `Outer$2Local`), or with the hot class marker (`Outer$hotswap3`)
pub fn is_anonymous_name(name: &BinaryName, hot_class_marker: &str) -> bool {
    match (name.outer_class(), name.as_str().rfind('$')) {
        (Some(_), Some(dollar)) => {
            let segment = &name.as_str()[dollar..];
            segment[1..].starts_with(|c: char| c.is_ascii_digit())
                || is_hot_class_segment(segment, hot_class_marker)
        }
        _ => false,
    }
}

fn is_hot_class_segment(segment: &str, hot_class_marker: &str) -> bool {
    hot_class_marker.starts_with('$')
        && segment.starts_with(hot_class_marker)
        && segment.len() > hot_class_marker.len()
        && segment[hot_class_marker.len()..]
            .chars()
            .all(|c| c.is_ascii_digit())
}

/// Anonymous or local classes nested directly in `outer`
pub fn is_direct_local_inner(
    outer: &BinaryName,
    name: &BinaryName,
    hot_class_marker: &str,
) -> bool {
    name.outer_class().as_ref() == Some(outer) && is_anonymous_name(name, hot_class_marker)
}

/// Anonymous classes nested directly in `outer` that the class refers to through its constant pool
pub fn referenced_local_inners(
    outer: &BinaryName,
    class: &ClassFile,
    hot_class_marker: &str,
) -> Result<Vec<BinaryName>, jvm::Error> {
    let mut inners = vec![];
    for constant in class.constants.values() {
        if let Constant::Class(name) = constant {
            let name = class.constants.get_utf8(*name)?;
            if let Ok(name) = BinaryName::from_string(name.to_owned()) {
                if is_direct_local_inner(outer, &name, hot_class_marker) && !inners.contains(&name)
                {
                    inners.push(name);
                }
            }
        }
    }
    Ok(inners)
}

/// Synthetic classes javac generates to hold `switch` tables over enums of other classes
///
/// Their fields are all named `$SwitchMap$...`.
pub fn is_enum_switch_helper(class: &ClassFile) -> Result<bool, jvm::Error> {
    if class.fields.is_empty() {
        return Ok(false);
    }
    for field in &class.fields {
        if !field.name(&class.constants)?.starts_with("$SwitchMap$") {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    #[test]
    fn anonymous_names() {
        assert!(is_anonymous_name(&name("a/Outer$1"), "$hotswap"));
        assert!(is_anonymous_name(&name("a/Outer$2Local"), "$hotswap"));
        assert!(is_anonymous_name(&name("a/Outer$1$3"), "$hotswap"));
        assert!(is_anonymous_name(&name("a/Outer$hotswap2"), "$hotswap"));
        assert!(!is_anonymous_name(&name("a/Outer$hotswapper"), "$hotswap"));
        assert!(!is_anonymous_name(&name("a/Outer$Inner"), "$hotswap"));
        assert!(!is_anonymous_name(&name("a/Outer"), "$hotswap"));
        assert!(!is_anonymous_name(&name("$1"), "$hotswap"));
    }

    #[test]
    fn direct_inners() {
        let outer = name("a/Outer");
        assert!(is_direct_local_inner(&outer, &name("a/Outer$1"), "$hotswap"));
        assert!(!is_direct_local_inner(&outer, &name("a/Outer$1$1"), "$hotswap"));
        assert!(!is_direct_local_inner(&outer, &name("a/Other$1"), "$hotswap"));
    }

    #[test]
    fn scores() {
        let weights = MatchWeights::default();
        let fingerprint = Fingerprint {
            class: "java/lang/Object;java/lang/Runnable;".to_owned(),
            methods: "<init>;()V;run;()V;".to_owned(),
            fields: String::new(),
            enclosing_method: "main;()V".to_owned(),
        };
        assert_eq!(
            fingerprint.match_score(0, &fingerprint, 0, &weights),
            weights.max_score()
        );
        assert_eq!(fingerprint.match_score(1, &fingerprint, 0, &weights), 14);

        let other_hierarchy = Fingerprint {
            class: "java/lang/Object;".to_owned(),
            ..fingerprint.clone()
        };
        assert_eq!(fingerprint.match_score(0, &other_hierarchy, 0, &weights), 0);

        let other_methods = Fingerprint {
            methods: "<init>;()V;".to_owned(),
            enclosing_method: String::new(),
            ..fingerprint.clone()
        };
        assert_eq!(fingerprint.match_score(0, &other_methods, 0, &weights), 3);
    }
}
