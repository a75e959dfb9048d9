//! Field paths and field-scoped validation errors.
//!
//! Mirrors the Kubernetes apimachinery field error shape so rejections read
//! the same as the API server's own: `spec.location: Invalid value: "x": field is immutable`.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Dotted path to a field, e.g. `spec.dataDisks[2].cachingType`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    /// Path for `root.a.b.c`.
    pub fn from_parts(root: &str, parts: &[&str]) -> Self {
        parts.iter().fold(Self::new(root), |p, part| p.child(part))
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classification of a field error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorType {
    Invalid,
    Required,
    Forbidden,
    Duplicate,
    NotSupported,
    TooMany,
    Internal,
}

impl ErrorType {
    fn label(self) -> &'static str {
        match self {
            ErrorType::Invalid => "Invalid value",
            ErrorType::Required => "Required value",
            ErrorType::Forbidden => "Forbidden",
            ErrorType::Duplicate => "Duplicate value",
            ErrorType::NotSupported => "Unsupported value",
            ErrorType::TooMany => "Too many",
            ErrorType::Internal => "Internal error",
        }
    }
}

/// A single problem with one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    pub error_type: ErrorType,
    pub field: FieldPath,
    pub bad_value: Option<Value>,
    pub detail: String,
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl FieldError {
    pub fn invalid<T: Serialize + ?Sized>(
        field: FieldPath,
        value: &T,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_type: ErrorType::Invalid,
            field,
            bad_value: Some(to_value(value)),
            detail: detail.into(),
        }
    }

    pub fn required(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Required,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn forbidden(field: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Forbidden,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn duplicate<T: Serialize + ?Sized>(field: FieldPath, value: &T) -> Self {
        Self {
            error_type: ErrorType::Duplicate,
            field,
            bad_value: Some(to_value(value)),
            detail: String::new(),
        }
    }

    pub fn not_supported<T: Serialize + ?Sized>(
        field: FieldPath,
        value: &T,
        supported: &[&str],
    ) -> Self {
        let quoted: Vec<String> = supported.iter().map(|s| format!("{:?}", s)).collect();
        Self {
            error_type: ErrorType::NotSupported,
            field,
            bad_value: Some(to_value(value)),
            detail: format!("supported values: {}", quoted.join(", ")),
        }
    }

    pub fn too_many(field: FieldPath, actual: usize, max: usize) -> Self {
        Self {
            error_type: ErrorType::TooMany,
            field,
            bad_value: Some(Value::from(actual)),
            detail: format!("must have at most {} items", max),
        }
    }

    pub fn internal(field: FieldPath, err: impl fmt::Display) -> Self {
        Self {
            error_type: ErrorType::Internal,
            field,
            bad_value: None,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error_type.label())?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {}", value)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Ordered aggregate of field errors from one validation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorList(Vec<FieldError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    pub fn append(&mut self, mut other: ErrorList) {
        self.0.append(&mut other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error is reported against exactly this path.
    pub fn has_field(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.field.as_str() == path)
    }
}

impl From<Vec<FieldError>> for ErrorList {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl From<FieldError> for ErrorList {
    fn from(err: FieldError) -> Self {
        Self(vec![err])
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<I: IntoIterator<Item = FieldError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{}", single),
            many => {
                let rendered: Vec<String> = many.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}
