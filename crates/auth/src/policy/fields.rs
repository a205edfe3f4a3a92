//! Request field validation used by `create` rules on write-only collections.

use serde_json::{Map, Value};
use thiserror::Error;

/// Expected type and bounds of a request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text {
        min_chars: usize,
        max_chars: usize,
        must_contain: Option<char>,
    },
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

/// Named set of field specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
    /// Whether keys not listed in `fields` are tolerated.
    pub allow_unknown: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldViolation {
    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),

    #[error("field '{0}' is out of bounds")]
    OutOfBounds(&'static str),

    #[error("field '{0}' is malformed")]
    Malformed(&'static str),

    #[error("unexpected field '{0}'")]
    Unexpected(String),
}

impl Schema {
    pub fn validate(&self, request: &Map<String, Value>) -> Result<(), FieldViolation> {
        if !self.allow_unknown {
            if let Some(extra) = request
                .keys()
                .find(|k| !self.fields.iter().any(|f| f.name == k.as_str()))
            {
                return Err(FieldViolation::Unexpected(extra.clone()));
            }
        }

        for spec in self.fields {
            match request.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(FieldViolation::Missing(spec.name));
                }
                None | Some(Value::Null) => {}
                Some(value) => spec.check(value)?,
            }
        }
        Ok(())
    }
}

impl FieldSpec {
    fn check(&self, value: &Value) -> Result<(), FieldViolation> {
        match self.kind {
            FieldKind::Text {
                min_chars,
                max_chars,
                must_contain,
            } => {
                let s = value.as_str().ok_or(FieldViolation::WrongType(self.name))?;
                let len = s.trim().chars().count();
                if len < min_chars || len > max_chars {
                    return Err(FieldViolation::OutOfBounds(self.name));
                }
                if let Some(c) = must_contain {
                    if !s.contains(c) {
                        return Err(FieldViolation::Malformed(self.name));
                    }
                }
                Ok(())
            }
            FieldKind::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(FieldViolation::WrongType(self.name))
                }
            }
        }
    }
}

const fn text(name: &'static str, required: bool, max_chars: usize) -> FieldSpec {
    FieldSpec {
        name,
        required,
        kind: FieldKind::Text {
            min_chars: 1,
            max_chars,
            must_contain: None,
        },
    }
}

/// Inbound contact message.
pub static MESSAGE_SCHEMA: Schema = Schema {
    name: "message",
    fields: &[
        text("name", true, 100),
        FieldSpec {
            name: "email",
            required: true,
            kind: FieldKind::Text {
                min_chars: 3,
                max_chars: 254,
                must_contain: Some('@'),
            },
        },
        text("subject", false, 200),
        text("message", true, 5000),
    ],
    allow_unknown: false,
};
