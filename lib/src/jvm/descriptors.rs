use super::{BinaryName, Name};
use std::iter::Peekable;
use std::str::Chars;

/// Maximum number of array dimensions a descriptor may have
const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Descriptors that can be written back in their class file form
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut rendered = String::new();
        self.render_to(&mut rendered);
        rendered
    }

    fn render_to(&self, out: &mut String);
}

/// Descriptors that can be read from their class file form
pub trait ParseDescriptor: Sized {
    /// Parse a whole string as a descriptor
    fn parse(source: &str) -> Result<Self, String> {
        let mut chars = source.chars().peekable();
        let parsed = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(parsed),
            Some(c) => Err(format!("unexpected '{}' after descriptor in {:?}", c, source)),
        }
    }

    /// Parse a descriptor from the front of the input, leaving the rest
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String>;
}

/// Primitive types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn from_char(c: char) -> Option<BaseType> {
        match c {
            'B' => Some(BaseType::Byte),
            'C' => Some(BaseType::Char),
            'D' => Some(BaseType::Double),
            'F' => Some(BaseType::Float),
            'I' => Some(BaseType::Int),
            'J' => Some(BaseType::Long),
            'S' => Some(BaseType::Short),
            'Z' => Some(BaseType::Boolean),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

/// `Lname;` form of a class type
impl RenderDescriptor for BinaryName {
    fn render_to(&self, out: &mut String) {
        out.push('L');
        out.push_str(self.as_str());
        out.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        if source.next() != Some('L') {
            return Err(String::from("class type must start with 'L'"));
        }
        let mut name = String::new();
        for c in source.by_ref() {
            if c == ';' {
                return BinaryName::from_string(name);
            }
            name.push(c);
        }
        Err(format!("class type 'L{}' is missing its ';'", name))
    }
}

/// Type of a field, a parameter, or a return value (eg. `I`, `Ljava/lang/String;`, `[[D`)
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Object(Class),
    Array(Box<FieldType<Class>>),
}

impl<C> FieldType<C> {
    pub const fn object(class: C) -> FieldType<C> {
        FieldType::Object(class)
    }

    pub fn array(element: FieldType<C>) -> FieldType<C> {
        FieldType::Array(Box::new(element))
    }

    /// Same type, with every class replaced
    pub fn map<C2>(&self, mut map_class: impl FnMut(&C) -> C2) -> FieldType<C2> {
        self.map_with(&mut map_class)
    }

    fn map_with<C2, F: FnMut(&C) -> C2>(&self, map_class: &mut F) -> FieldType<C2> {
        match self {
            FieldType::Base(base) => FieldType::Base(*base),
            FieldType::Object(class) => FieldType::Object(map_class(class)),
            FieldType::Array(element) => FieldType::array(element.map_with(map_class)),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base) => out.push(base.as_char()),
            FieldType::Object(class) => class.render_to(out),
            FieldType::Array(element) => {
                out.push('[');
                element.render_to(out);
            }
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        let mut dimensions = 0;
        while source.next_if_eq(&'[').is_some() {
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(format!("array type has {} dimensions", dimensions));
        }

        let mut parsed = match source.peek().copied() {
            Some('L') => FieldType::Object(C::parse_from(source)?),
            Some(c) => {
                source.next();
                let base = BaseType::from_char(c)
                    .ok_or_else(|| format!("'{}' does not start a field type", c))?;
                FieldType::Base(base)
            }
            None => return Err(String::from("missing field type")),
        };
        for _ in 0..dimensions {
            parsed = FieldType::array(parsed);
        }
        Ok(parsed)
    }
}

/// Parameter and return types of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Same descriptor, with every class replaced
    pub fn map<C2>(&self, mut map_class: impl FnMut(&C) -> C2) -> MethodDescriptor<C2> {
        let parameters = self
            .parameters
            .iter()
            .map(|parameter| parameter.map_with(&mut map_class))
            .collect();
        let return_type = self
            .return_type
            .as_ref()
            .map(|return_type| return_type.map_with(&mut map_class));
        MethodDescriptor {
            parameters,
            return_type,
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        for parameter in &self.parameters {
            parameter.render_to(out);
        }
        out.push(')');
        match &self.return_type {
            Some(return_type) => return_type.render_to(out),
            None => out.push('V'),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, String> {
        if source.next() != Some('(') {
            return Err(String::from("method descriptor must start with '('"));
        }
        let mut parameters = vec![];
        loop {
            match source.peek() {
                Some(')') => break,
                Some(_) => parameters.push(FieldType::parse_from(source)?),
                None => return Err(String::from("method descriptor is missing its ')'")),
            }
        }
        source.next();

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type Field = FieldType<BinaryName>;
    type Method = MethodDescriptor<BinaryName>;

    fn class(name: &str) -> Field {
        FieldType::object(BinaryName::from_string(name.to_owned()).unwrap())
    }

    #[test]
    fn field_types() {
        assert_eq!(Field::parse("J").unwrap(), FieldType::Base(BaseType::Long));
        assert_eq!(Field::parse("La/Point;").unwrap(), class("a/Point"));

        let matrix = Field::parse("[[D").unwrap();
        assert_eq!(
            matrix,
            FieldType::array(FieldType::array(FieldType::Base(BaseType::Double)))
        );
        assert_eq!(matrix.render(), "[[D");

        assert!(Field::parse("V").is_err());
        assert!(Field::parse("La/Point").is_err());
        assert!(Field::parse("II").is_err());
        assert!(Field::parse(&"[".repeat(256)).is_err());
    }

    #[test]
    fn method_descriptors() {
        let method = Method::parse("(I[La/Point;)La/Line;").unwrap();
        assert_eq!(method.parameters.len(), 2);
        assert_eq!(method.return_type, Some(class("a/Line")));
        assert_eq!(method.render(), "(I[La/Point;)La/Line;");

        let void = Method::parse("()V").unwrap();
        assert!(void.parameters.is_empty());
        assert_eq!(void.return_type, None);

        assert!(Method::parse("(I").is_err());
        assert!(Method::parse("(I)VV").is_err());
        assert!(Method::parse("I)V").is_err());
    }

    #[test]
    fn renaming_classes() {
        let hot = BinaryName::from_string("a/Outer$hotswap1".to_owned()).unwrap();
        let renamed = Method::parse("(La/Outer$1;[La/Outer$1;I)La/Outer;")
            .unwrap()
            .map(|name| {
                if name.as_str() == "a/Outer$1" {
                    hot.clone()
                } else {
                    name.clone()
                }
            });
        assert_eq!(renamed.render(), "(La/Outer$hotswap1;[La/Outer$hotswap1;I)La/Outer;");
    }
}
