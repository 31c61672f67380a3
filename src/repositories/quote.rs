use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::quote::{PersonRef, Quote},
};

fn column<'a, T: tokio_postgres::types::FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name).map_err(|_| AppError::MissingData(name.to_string()))
}

pub(crate) fn row_to_quote(row: &Row) -> Result<Quote> {
    Ok(Quote {
        id: column(row, "id")?,
        text: column(row, "text")?,
        date: column(row, "date")?,
        origin: column(row, "origin")?,
        origin_name: column(row, "origin_name")?,
        upvotes: column(row, "upvotes")?,
        downvotes: column(row, "downvotes")?,
        created_at: column(row, "created_at")?,
        person: PersonRef {
            id: column(row, "person_id")?,
            name: column(row, "person_name")?,
            category: column(row, "person_category")?,
        },
    })
}

/// Finds a quote and its person by the quote's ID.
pub async fn find_by_id(pool: &Pool, quote_id: &Uuid) -> Result<Option<Quote>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT q.id, q.text, q.date, q.origin, q.origin_name, q.upvotes, q.downvotes,
                   q.created_at, p.id AS person_id, p.name AS person_name,
                   p.category AS person_category
            FROM quotes q
            JOIN persons p ON p.id = q.person_id
            WHERE q.id = $1
            "#,
            &[quote_id],
        )
        .await?;
    row.map(|r| row_to_quote(&r)).transpose()
}

/// Whether a quote with this ID exists.
pub async fn exists(pool: &Pool, quote_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM quotes WHERE id = $1) AS found",
            &[quote_id],
        )
        .await?;
    column(&row, "found")
}
