//! # PostgreSQL Form Repository
//!
//! `sqlx` implementation of [`FormRepository`] over two tables:
//!
//! ```text
//! forms(id TEXT PK, title, description, author, closed, created_at)
//! questions(id BIGSERIAL PK, form_id -> forms.id ON DELETE/UPDATE CASCADE,
//!           content, order_number, UNIQUE(form_id, order_number))
//! ```
//!
//! Queries are checked at runtime (`query_as::<_, Row>`), so the crate
//! builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::{pg_error_code, PersistenceError, PersistenceResult};
use super::traits::FormRepository;
use crate::config::{redact_url, DatabaseConfig};
use crate::models::{FieldSet, Form, FormFieldUpdate, FormId, Question};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS forms (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        author TEXT NOT NULL DEFAULT '',
        closed BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS questions (
        id BIGSERIAL PRIMARY KEY,
        form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE ON UPDATE CASCADE,
        content TEXT NOT NULL,
        order_number INTEGER NOT NULL CHECK (order_number >= 0),
        UNIQUE (form_id, order_number)
    )
    "#,
];

#[derive(Debug, FromRow)]
struct FormRow {
    id: String,
    title: String,
    description: String,
    author: String,
    closed: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i64,
    form_id: String,
    content: String,
    order_number: i32,
}

impl QuestionRow {
    fn into_question(self) -> PersistenceResult<Question> {
        let order_number = u32::try_from(self.order_number)
            .map_err(|_| PersistenceError::invalid_data("order_number", self.order_number.to_string()))?;
        Ok(Question {
            id: self.id,
            form_id: FormId::new(self.form_id),
            content: self.content,
            order_number,
        })
    }
}

fn order_to_db(order_number: u32) -> PersistenceResult<i32> {
    i32::try_from(order_number)
        .map_err(|_| PersistenceError::invalid_data("order_number", format!("{order_number} is out of range")))
}

#[derive(Debug, Clone)]
pub struct PostgresFormRepository {
    pool: PgPool,
}

impl PostgresFormRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config.url`
    pub async fn connect(config: &DatabaseConfig) -> PersistenceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        info!(url = %redact_url(&config.url), max_connections = config.max_connections, "🐘 PostgreSQL pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist
    pub async fn ensure_schema(&self) -> PersistenceResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::from_sqlx("ensure_schema", e))?;
        }
        debug!("Form schema ensured");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl FormRepository for PostgresFormRepository {
    async fn create_form(&self, form: &Form) -> PersistenceResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::from_sqlx("create_form", e))?;

        sqlx::query(
            r#"
            INSERT INTO forms (id, title, description, author, closed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(form.id.as_str())
        .bind(&form.title)
        .bind(&form.description)
        .bind(&form.author)
        .bind(form.closed)
        .bind(form.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| PersistenceError::from_sqlx("create_form", e))?;

        for question in &form.questions {
            sqlx::query(
                r#"
                INSERT INTO questions (form_id, content, order_number)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(form.id.as_str())
            .bind(&question.content)
            .bind(order_to_db(question.order_number)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::from_sqlx("create_form", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| PersistenceError::from_sqlx("create_form", e))?;

        debug!(form_id = %form.id, questions = form.questions.len(), "Form inserted");
        Ok(())
    }

    async fn create_question(&self, question: &Question) -> PersistenceResult<Question> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            INSERT INTO questions (form_id, content, order_number)
            VALUES ($1, $2, $3)
            RETURNING id, form_id, content, order_number
            "#,
        )
        .bind(question.form_id.as_str())
        .bind(&question.content)
        .bind(order_to_db(question.order_number)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(pg_error_code::FOREIGN_KEY_VIOLATION) =>
            {
                PersistenceError::not_found(&question.form_id)
            }
            _ => PersistenceError::from_sqlx("create_question", e),
        })?;

        row.into_question()
    }

    async fn get(&self, id: &FormId) -> PersistenceResult<Form> {
        let row = sqlx::query_as::<_, FormRow>(
            r#"
            SELECT id, title, description, author, closed, created_at
            FROM forms
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::from_sqlx("get", e))?
        .ok_or_else(|| PersistenceError::not_found(id))?;

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, form_id, content, order_number
            FROM questions
            WHERE form_id = $1
            ORDER BY order_number
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::from_sqlx("get", e))?
        .into_iter()
        .map(QuestionRow::into_question)
        .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(Form {
            id: FormId::new(row.id),
            title: row.title,
            description: row.description,
            author: row.author,
            closed: row.closed,
            created_at: row.created_at,
            questions,
        })
    }

    async fn update_field(&self, id: &FormId, update: &FormFieldUpdate) -> PersistenceResult<()> {
        self.update_fields(id, &FieldSet::single(update.clone())).await
    }

    async fn update_fields(&self, id: &FormId, fields: &FieldSet) -> PersistenceResult<()> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE forms SET ");
        let mut assignments = builder.separated(", ");
        for update in fields {
            assignments.push(format!("{} = ", update.column()));
            match update {
                FormFieldUpdate::Title(value)
                | FormFieldUpdate::Description(value)
                | FormFieldUpdate::Author(value) => {
                    assignments.push_bind_unseparated(value.clone());
                }
                FormFieldUpdate::Closed(value) => {
                    assignments.push_bind_unseparated(*value);
                }
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.as_str().to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::from_sqlx("update_fields", e))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found(id));
        }
        debug!(form_id = %id, columns = ?fields.columns(), "Form updated");
        Ok(())
    }

    async fn delete_form(&self, id: &FormId) -> PersistenceResult<()> {
        let result = sqlx::query("DELETE FROM forms WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::from_sqlx("delete_form", e))?;

        debug!(form_id = %id, removed = result.rows_affected(), "Form deleted");
        Ok(())
    }

    async fn delete_question(&self, id: &FormId, order_number: u32) -> PersistenceResult<()> {
        let result = sqlx::query("DELETE FROM questions WHERE form_id = $1 AND order_number = $2")
            .bind(id.as_str())
            .bind(order_to_db(order_number)?)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::from_sqlx("delete_question", e))?;

        debug!(
            form_id = %id,
            order_number = order_number,
            removed = result.rows_affected(),
            "Question deleted"
        );
        Ok(())
    }

    async fn health_check(&self) -> PersistenceResult<bool> {
        let one: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::from_sqlx("health_check", e))?;
        Ok(one == 1)
    }
}
