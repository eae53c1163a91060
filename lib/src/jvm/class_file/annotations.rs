use crate::jvm::class_file::{ConstantsReader, Deserialize, SymbolicConstant};
use crate::jvm::{Constant, ConstantIndex, Error};
use crate::util::OffsetVec;

/// Attributes holding annotations (type annotations are not included)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.16
pub const ANNOTATION_ATTRIBUTES: [&str; 5] = [
    "RuntimeVisibleAnnotations",
    "RuntimeInvisibleAnnotations",
    "RuntimeVisibleParameterAnnotations",
    "RuntimeInvisibleParameterAnnotations",
    "AnnotationDefault",
];

/// One step of an annotation attribute body, with constant pool indices resolved
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnnotationToken {
    Tag(u8),
    Count(u16),
    Constant(SymbolicConstant),
}

/// Flatten an annotation attribute into tokens that can be compared across constant pools
pub fn symbolic_annotations(
    attribute_name: &str,
    info: &[u8],
    constants: &OffsetVec<Constant>,
) -> Result<Vec<AnnotationToken>, Error> {
    let name = ANNOTATION_ATTRIBUTES
        .iter()
        .copied()
        .find(|name| *name == attribute_name)
        .ok_or(Error::MalformedAttribute("annotations"))?;

    let mut walker = AnnotationWalker {
        reader: info,
        constants,
        tokens: vec![],
    };
    let walked = if name == "AnnotationDefault" {
        walker.element_value()
    } else if name.contains("Parameter") {
        walker.parameter_annotations()
    } else {
        walker.annotations()
    };
    match walked {
        Ok(()) if walker.reader.is_empty() => Ok(walker.tokens),
        Ok(()) | Err(Error::IoError(_)) => Err(Error::MalformedAttribute(name)),
        Err(other) => Err(other),
    }
}

struct AnnotationWalker<'a> {
    reader: &'a [u8],
    constants: &'a OffsetVec<Constant>,
    tokens: Vec<AnnotationToken>,
}

impl<'a> AnnotationWalker<'a> {
    fn count(&mut self) -> Result<u16, Error> {
        let count = u16::deserialize(&mut self.reader)?;
        self.tokens.push(AnnotationToken::Count(count));
        Ok(count)
    }

    fn constant(&mut self) -> Result<(), Error> {
        let index = ConstantIndex(u16::deserialize(&mut self.reader)?);
        let symbolic = self.constants.get_symbolic(index)?;
        self.tokens.push(AnnotationToken::Constant(symbolic));
        Ok(())
    }

    fn parameter_annotations(&mut self) -> Result<(), Error> {
        let parameters = u8::deserialize(&mut self.reader)?;
        self.tokens.push(AnnotationToken::Count(parameters as u16));
        for _ in 0..parameters {
            self.annotations()?;
        }
        Ok(())
    }

    fn annotations(&mut self) -> Result<(), Error> {
        for _ in 0..self.count()? {
            self.annotation()?;
        }
        Ok(())
    }

    fn annotation(&mut self) -> Result<(), Error> {
        self.constant()?;
        for _ in 0..self.count()? {
            self.constant()?;
            self.element_value()?;
        }
        Ok(())
    }

    fn element_value(&mut self) -> Result<(), Error> {
        let tag = u8::deserialize(&mut self.reader)?;
        self.tokens.push(AnnotationToken::Tag(tag));
        match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => self.constant(),
            b'e' => {
                self.constant()?;
                self.constant()
            }
            b'@' => self.annotation(),
            b'[' => {
                for _ in 0..self.count()? {
                    self.element_value()?;
                }
                Ok(())
            }
            _ => Err(Error::MalformedAttribute("element_value")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;

    fn deprecated_with_since(pool: &mut ConstantsPool, since: &str) -> Vec<u8> {
        let annotation_type = pool.get_utf8("Ljava/lang/Deprecated;").unwrap();
        let element = pool.get_utf8("since").unwrap();
        let value = pool.get_utf8(since).unwrap();

        let mut info = vec![0, 1];
        info.extend_from_slice(&annotation_type.0 .0.to_be_bytes());
        info.extend_from_slice(&[0, 1]);
        info.extend_from_slice(&element.0 .0.to_be_bytes());
        info.push(b's');
        info.extend_from_slice(&value.0 .0.to_be_bytes());
        info
    }

    #[test]
    fn resolves_across_pools() {
        let mut first = ConstantsPool::new();
        first.get_utf8("unrelated").unwrap();
        let first_info = deprecated_with_since(&mut first, "9");
        let first = first.into_offset_vec();

        let mut second = ConstantsPool::new();
        let second_info = deprecated_with_since(&mut second, "9");
        let second_changed = deprecated_with_since(&mut second, "11");
        let second = second.into_offset_vec();

        assert_ne!(first_info, second_info);
        let tokens = |info: &[u8], pool: &OffsetVec<Constant>| {
            symbolic_annotations("RuntimeVisibleAnnotations", info, pool).unwrap()
        };
        assert_eq!(tokens(&first_info, &first), tokens(&second_info, &second));
        assert_ne!(tokens(&first_info, &first), tokens(&second_changed, &second));
    }

    #[test]
    fn truncated_body() {
        let pool = ConstantsPool::new().into_offset_vec();
        assert!(matches!(
            symbolic_annotations("RuntimeVisibleAnnotations", &[0, 1, 0], &pool),
            Err(Error::MalformedAttribute("RuntimeVisibleAnnotations"))
        ));
        assert!(symbolic_annotations("AnnotationDefault", &[b'x'], &pool).is_err());
    }
}
