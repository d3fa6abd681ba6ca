//! Typed property model
//!
//! Properties flow through three surfaces with one representation: component
//! configuration, exec parameters handed to a device's `execute`, and
//! allocation request properties sent to the allocation manager.
//!
//! Descriptor files reference properties through four variants (simple,
//! simple sequence, struct, struct sequence); [`PropertyRef::to_property`] is
//! the single cast point from a reference to a typed property.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single id/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(id: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

/// A property value, preserving the numeric width declared by the component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// No value set; filtered out before `configure` calls
    Nil,
    Boolean(bool),
    Short(i16),
    Long(i32),
    LongLong(i64),
    UShort(u16),
    ULong(u32),
    ULongLong(u64),
    Float(f32),
    Double(f64),
    Str(String),
    /// Homogeneous sequence of values
    Sequence(Vec<PropertyValue>),
    /// Nested property table (struct values, struct-sequence members)
    Table(Vec<Property>),
}

impl PropertyValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, PropertyValue::Nil)
    }

    /// Numeric reading of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Short(v) => Some(f64::from(*v)),
            PropertyValue::Long(v) => Some(f64::from(*v)),
            PropertyValue::LongLong(v) => Some(*v as f64),
            PropertyValue::UShort(v) => Some(f64::from(*v)),
            PropertyValue::ULong(v) => Some(f64::from(*v)),
            PropertyValue::ULongLong(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(f64::from(*v)),
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Rebuild a value of the same numeric variant from `value`.
    ///
    /// Returns `None` for non-numeric variants. The cast truncates the way
    /// a C-style conversion would; callers that need stricter behavior must
    /// range-check first.
    pub fn with_numeric(&self, value: f64) -> Option<PropertyValue> {
        match self {
            PropertyValue::Short(_) => Some(PropertyValue::Short(value as i16)),
            PropertyValue::Long(_) => Some(PropertyValue::Long(value as i32)),
            PropertyValue::LongLong(_) => Some(PropertyValue::LongLong(value as i64)),
            PropertyValue::UShort(_) => Some(PropertyValue::UShort(value as u16)),
            PropertyValue::ULong(_) => Some(PropertyValue::ULong(value as u32)),
            PropertyValue::ULongLong(_) => Some(PropertyValue::ULongLong(value as u64)),
            PropertyValue::Float(_) => Some(PropertyValue::Float(value as f32)),
            PropertyValue::Double(_) => Some(PropertyValue::Double(value)),
            _ => None,
        }
    }

    /// The string content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Nil => write!(f, "<nil>"),
            PropertyValue::Boolean(v) => write!(f, "{}", v),
            PropertyValue::Short(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::LongLong(v) => write!(f, "{}", v),
            PropertyValue::UShort(v) => write!(f, "{}", v),
            PropertyValue::ULong(v) => write!(f, "{}", v),
            PropertyValue::ULongLong(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => write!(f, "{}", v),
            PropertyValue::Sequence(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            PropertyValue::Table(props) => {
                write!(f, "{{")?;
                for (i, p) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", p.id, p.value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A property reference from a descriptor dependency or usesdevice element.
///
/// Reference values are uninterpreted strings (they may carry `__MATH__`
/// expressions); the allocation manager performs type coercion against the
/// target device's property definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyRef {
    Simple {
        id: String,
        value: String,
    },
    SimpleSequence {
        id: String,
        values: Vec<String>,
    },
    Struct {
        id: String,
        fields: Vec<(String, String)>,
    },
    StructSequence {
        id: String,
        structs: Vec<Vec<(String, String)>>,
    },
}

impl PropertyRef {
    pub fn property_id(&self) -> &str {
        match self {
            PropertyRef::Simple { id, .. }
            | PropertyRef::SimpleSequence { id, .. }
            | PropertyRef::Struct { id, .. }
            | PropertyRef::StructSequence { id, .. } => id,
        }
    }

    /// Cast this reference to a typed property for an allocation request
    pub fn to_property(&self) -> Property {
        match self {
            PropertyRef::Simple { id, value } => {
                Property::new(id.clone(), PropertyValue::Str(value.clone()))
            }
            PropertyRef::SimpleSequence { id, values } => Property::new(
                id.clone(),
                PropertyValue::Sequence(
                    values.iter().cloned().map(PropertyValue::Str).collect(),
                ),
            ),
            PropertyRef::Struct { id, fields } => Property::new(
                id.clone(),
                PropertyValue::Table(
                    fields
                        .iter()
                        .map(|(fid, fval)| {
                            Property::new(fid.clone(), PropertyValue::Str(fval.clone()))
                        })
                        .collect(),
                ),
            ),
            PropertyRef::StructSequence { id, structs } => Property::new(
                id.clone(),
                PropertyValue::Sequence(
                    structs
                        .iter()
                        .map(|fields| {
                            PropertyValue::Table(
                                fields
                                    .iter()
                                    .map(|(fid, fval)| {
                                        Property::new(
                                            fid.clone(),
                                            PropertyValue::Str(fval.clone()),
                                        )
                                    })
                                    .collect(),
                            )
                        })
                        .collect(),
                ),
            ),
        }
    }
}
