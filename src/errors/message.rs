//! Error messages built from plain and highlighted fragments

use std::fmt;

use crate::evaluator::value::ValueType;

/// One fragment of an error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Plain(String),
    /// Text a renderer may emphasize (names, types, paths)
    Highlighted(String),
}

impl MessagePart {
    pub fn text(&self) -> &str {
        match self {
            MessagePart::Plain(text) | MessagePart::Highlighted(text) => text,
        }
    }
}

/// An ordered sequence of message fragments
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorMessage {
    parts: Vec<MessagePart>,
}

impl ErrorMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plain(mut self, text: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Plain(text.into()));
        self
    }

    pub fn highlighted(mut self, text: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Highlighted(text.into()));
        self
    }

    /// Append a highlighted human-readable type ("an int")
    pub fn value_type(self, ty: ValueType) -> Self {
        self.highlighted(ty.human_readable())
    }

    /// Append a list of types: `A`, `A or B`, or `A, B, or C`
    pub fn value_types(mut self, types: &[ValueType]) -> Self {
        let last = types.len().saturating_sub(1);
        for (i, ty) in types.iter().enumerate() {
            if i > 0 {
                if types.len() > 2 {
                    self = self.plain(",");
                }
                self = self.plain(" ");
                if i == last {
                    self = self.plain("or ");
                }
            }
            self = self.value_type(*ty);
        }
        self
    }

    /// Append all fragments of another message
    pub fn append(mut self, other: ErrorMessage) -> Self {
        self.parts.extend(other.parts);
        self
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            f.write_str(part.text())?;
        }
        Ok(())
    }
}
