//! Form and question entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::FORM_CACHE_KEY_PREFIX;

/// Form identifier. Generated ids are UUID v4 strings; any non-empty string
/// is accepted from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId(String);

impl FormId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Key of the cached form (`form:<id>`)
    pub fn cache_key(&self) -> String {
        format!("{FORM_CACHE_KEY_PREFIX}{}", self.0)
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FormId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for FormId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for FormId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// A questionnaire with ordered questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Sorted by `order_number` when read from persistence
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Form {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: FormId::generate(),
            title: title.into(),
            description: description.into(),
            author: author.into(),
            closed: false,
            created_at: Utc::now(),
            questions: Vec::new(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.id.cache_key()
    }

    pub fn sort_questions(&mut self) {
        self.questions.sort_by_key(|q| q.order_number);
    }
}

/// A single question; `order_number` is unique within its form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Assigned by persistence, 0 before insert
    #[serde(default)]
    pub id: i64,
    pub form_id: FormId,
    pub content: String,
    pub order_number: u32,
}

impl Question {
    pub fn new(form_id: FormId, content: impl Into<String>, order_number: u32) -> Self {
        Self {
            id: 0,
            form_id,
            content: content.into(),
            order_number,
        }
    }
}

/// Inbound creation payload; the id is optional and generated when absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDraft {
    #[serde(default)]
    pub id: Option<FormId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

/// Question inside a [`FormDraft`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub content: String,
    pub order_number: u32,
}

impl FormDraft {
    pub fn into_form(self) -> Form {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(FormId::generate);
        let mut form = Form {
            questions: self
                .questions
                .into_iter()
                .map(|q| Question::new(id.clone(), q.content, q.order_number))
                .collect(),
            id,
            title: self.title,
            description: self.description,
            author: self.author,
            closed: self.closed,
            created_at: Utc::now(),
        };
        form.sort_questions();
        form
    }
}
