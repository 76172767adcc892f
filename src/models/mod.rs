//! # Domain Models
//!
//! - [`Form`] / [`Question`] - the persisted aggregate
//! - [`FormDraft`] - inbound creation payload
//! - [`FieldSet`] - validated column updates

pub mod field_update;
pub mod form;

pub use field_update::{FieldSet, FieldUpdateError, FormFieldUpdate};
pub use form::{Form, FormDraft, FormId, Question, QuestionDraft};
