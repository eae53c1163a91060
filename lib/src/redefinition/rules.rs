use crate::jvm::class_file::ClassFile;
use crate::jvm::{
    BinaryName, Constant, FieldType, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor,
};
use std::collections::BTreeMap;

/// Class renames decided by inner class matching, and the constant pool substitutions they imply
///
/// Each rename contributes three exact substitutions: the bare class name, its type descriptor,
/// and the descriptor of a constructor taking just that type (the constructor javac generates for
/// an anonymous class capturing its outer instance). Other descriptors and generic signatures
/// mentioning a renamed class are rewritten too (see [`RenameRules::substitute`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameRules {
    classes: BTreeMap<String, String>,
    exact: BTreeMap<String, String>,
}

impl RenameRules {
    pub fn new() -> RenameRules {
        RenameRules::default()
    }

    pub fn add_class_rename(&mut self, from: &BinaryName, to: &BinaryName) {
        let (from, to) = (from.as_str(), to.as_str());
        log::debug!("Renaming {} to {}", from, to);
        self.classes.insert(from.to_owned(), to.to_owned());
        self.exact.insert(from.to_owned(), to.to_owned());
        self.exact.insert(format!("L{};", from), format!("L{};", to));
        self.exact.insert(format!("(L{};)V", from), format!("(L{};)V", to));
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// New name of a renamed class
    pub fn renamed(&self, class: &str) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    /// Exact substitutions, from old to new
    pub fn exact_rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exact.iter().map(|(from, to)| (from.as_str(), to.as_str()))
    }

    /// Rewritten form of a constant pool string, if any rename applies to it
    pub fn substitute(&self, utf8: &str) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        if let Some(exact) = self.exact.get(utf8) {
            return Some(exact.clone());
        }

        let rename = |class: &BinaryName| {
            self.renamed(class.as_str())
                .and_then(|renamed| BinaryName::from_string(renamed.to_owned()).ok())
                .unwrap_or_else(|| class.clone())
        };
        let rewritten = if utf8.starts_with('(') {
            MethodDescriptor::<BinaryName>::parse(utf8)
                .ok()
                .map(|descriptor| descriptor.map(rename).render())
        } else if utf8.starts_with('L') || utf8.starts_with('[') {
            FieldType::<BinaryName>::parse(utf8)
                .ok()
                .map(|descriptor| descriptor.map(rename).render())
        } else {
            None
        };

        match rewritten {
            Some(rewritten) if rewritten != utf8 => Some(rewritten),
            Some(_) => None,
            None => self.substitute_in_signature(utf8),
        }
    }

    /// Rewrite class types (`Lname;`, `Lname<`, `Lname.`) embedded in a generic signature
    fn substitute_in_signature(&self, signature: &str) -> Option<String> {
        let mut rewritten = String::with_capacity(signature.len());
        let mut changed = false;
        let mut rest = signature;
        let mut previous: Option<char> = None;

        while let Some(c) = rest.chars().next() {
            let at_type_start = c == 'L'
                && matches!(
                    previous,
                    None | Some('(' | ')' | ';' | '<' | '>' | '[' | ':' | '^' | '+' | '-')
                );
            if at_type_start {
                let name_end = rest[1..]
                    .find(|c: char| matches!(c, ';' | '<' | '.'))
                    .map(|end| end + 1);
                if let Some(name_end) = name_end {
                    let class = &rest[1..name_end];
                    if let Some(renamed) = self.renamed(class) {
                        rewritten.push('L');
                        rewritten.push_str(renamed);
                        changed = true;
                        previous = renamed.chars().last();
                        rest = &rest[name_end..];
                        continue;
                    }
                }
            }
            rewritten.push(c);
            previous = Some(c);
            rest = &rest[c.len_utf8()..];
        }

        if changed {
            Some(rewritten)
        } else {
            None
        }
    }

    /// Whether any rename touches the constant pool of this class
    pub fn references(&self, class: &ClassFile) -> bool {
        !self.is_empty()
            && class.constants.values().any(|constant| match constant {
                Constant::Utf8(utf8) => self.substitute(utf8).is_some(),
                _ => false,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rules() -> RenameRules {
        let mut rules = RenameRules::new();
        rules.add_class_rename(
            &BinaryName::from_string("a/Outer$2".to_owned()).unwrap(),
            &BinaryName::from_string("a/Outer$1".to_owned()).unwrap(),
        );
        rules
    }

    #[test]
    fn exact_substitutions() {
        let rules = rules();
        assert_eq!(rules.exact_rules().count(), 3);
        assert_eq!(rules.substitute("a/Outer$2").as_deref(), Some("a/Outer$1"));
        assert_eq!(rules.substitute("La/Outer$2;").as_deref(), Some("La/Outer$1;"));
        assert_eq!(
            rules.substitute("(La/Outer$2;)V").as_deref(),
            Some("(La/Outer$1;)V")
        );
        assert_eq!(rules.substitute("a/Outer$21"), None);
        assert_eq!(rules.substitute("a/Outer"), None);
    }

    #[test]
    fn descriptors_and_signatures() {
        let rules = rules();
        assert_eq!(
            rules.substitute("(ILa/Outer$2;[La/Outer$2;)La/Outer$2;").as_deref(),
            Some("(ILa/Outer$1;[La/Outer$1;)La/Outer$1;")
        );
        assert_eq!(
            rules.substitute("[[La/Outer$2;").as_deref(),
            Some("[[La/Outer$1;")
        );
        assert_eq!(
            rules.substitute("Ljava/util/List<La/Outer$2;>;").as_deref(),
            Some("Ljava/util/List<La/Outer$1;>;")
        );
        assert_eq!(rules.substitute("(La/Outer$22;)V"), None);
        assert_eq!(rules.substitute("Last"), None);
    }
}
