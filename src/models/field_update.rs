//! Typed column updates for a form.
//!
//! Inbound field-update requests carry a JSON object of `{column: value}`.
//! [`FieldSet::try_from_map`] turns it into a closed set of typed updates,
//! rejecting unknown columns and wrongly typed values before anything
//! reaches persistence.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One column assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "column", content = "value", rename_all = "snake_case")]
pub enum FormFieldUpdate {
    Title(String),
    Description(String),
    Author(String),
    Closed(bool),
}

impl FormFieldUpdate {
    /// Column name in the `forms` table
    pub fn column(&self) -> &'static str {
        match self {
            FormFieldUpdate::Title(_) => "title",
            FormFieldUpdate::Description(_) => "description",
            FormFieldUpdate::Author(_) => "author",
            FormFieldUpdate::Closed(_) => "closed",
        }
    }

    fn parse(column: &str, value: &Value) -> Result<Self, FieldUpdateError> {
        let text = |value: &Value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| FieldUpdateError::type_mismatch(column, "string", value))
        };

        match column {
            "title" => Ok(FormFieldUpdate::Title(text(value)?)),
            "description" => Ok(FormFieldUpdate::Description(text(value)?)),
            "author" => Ok(FormFieldUpdate::Author(text(value)?)),
            "closed" => value
                .as_bool()
                .map(FormFieldUpdate::Closed)
                .ok_or_else(|| FieldUpdateError::type_mismatch(column, "boolean", value)),
            other => Err(FieldUpdateError::UnknownColumn(other.to_string())),
        }
    }
}

impl fmt::Display for FormFieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormFieldUpdate::Title(v) => write!(f, "title={v:?}"),
            FormFieldUpdate::Description(v) => write!(f, "description={v:?}"),
            FormFieldUpdate::Author(v) => write!(f, "author={v:?}"),
            FormFieldUpdate::Closed(v) => write!(f, "closed={v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldUpdateError {
    #[error("unknown form column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' expects a {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: String,
    },

    #[error("field set is empty")]
    Empty,
}

impl FieldUpdateError {
    fn type_mismatch(column: &str, expected: &'static str, actual: &Value) -> Self {
        Self::TypeMismatch {
            column: column.to_string(),
            expected,
            actual: actual.to_string(),
        }
    }
}

/// Non-empty list of column assignments; a later update of the same column
/// replaces an earlier one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldSet(Vec<FormFieldUpdate>);

impl FieldSet {
    pub fn new(updates: Vec<FormFieldUpdate>) -> Result<Self, FieldUpdateError> {
        let mut deduped: Vec<FormFieldUpdate> = Vec::with_capacity(updates.len());
        for update in updates {
            match deduped.iter_mut().find(|u| u.column() == update.column()) {
                Some(existing) => *existing = update,
                None => deduped.push(update),
            }
        }
        if deduped.is_empty() {
            return Err(FieldUpdateError::Empty);
        }
        Ok(Self(deduped))
    }

    pub fn single(update: FormFieldUpdate) -> Self {
        Self(vec![update])
    }

    /// Validate a `{column: value}` object
    pub fn try_from_map(map: &Map<String, Value>) -> Result<Self, FieldUpdateError> {
        let updates = map
            .iter()
            .map(|(column, value)| FormFieldUpdate::parse(column, value))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(updates)
    }

    pub fn updates(&self) -> &[FormFieldUpdate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.0.iter().map(FormFieldUpdate::column).collect()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FormFieldUpdate;
    type IntoIter = std::slice::Iter<'a, FormFieldUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
