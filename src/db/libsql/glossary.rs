use chrono::Utc;
use libsql::params;

use crate::db::{
    GlossaryEntry, GlossaryMergeOutcome, GlossarySource, GlossaryStore, GlossaryTermParams,
    normalize_term,
};
use crate::error::DatabaseError;

use super::tenant::TenantStore;
use super::{fmt_ts, get_opt_text, get_text, get_ts, opt_text};

const GLOSSARY_COLUMNS: &str = "term, definition, category, source, created_at";

fn row_to_entry(row: &libsql::Row) -> Result<GlossaryEntry, DatabaseError> {
    let source_raw = get_text(row, 3);
    let source = GlossarySource::from_db_value(&source_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid glossary source '{source_raw}'"))
    })?;
    Ok(GlossaryEntry {
        term: get_text(row, 0),
        definition: get_text(row, 1),
        category: get_opt_text(row, 2),
        source,
        created_at: get_ts(row, 4)?,
    })
}

/// Normalize and validate a term/definition pair.
fn clean_input(input: &GlossaryTermParams) -> Result<(String, String, Option<String>), DatabaseError> {
    let term = normalize_term(&input.term);
    if term.is_empty() {
        return Err(DatabaseError::InvalidInput(
            "glossary term cannot be empty".to_string(),
        ));
    }
    let definition = input.definition.trim();
    if definition.is_empty() {
        return Err(DatabaseError::InvalidInput(format!(
            "definition for '{term}' cannot be empty"
        )));
    }
    let category = input
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok((term, definition.to_string(), category))
}

impl TenantStore {
    async fn fetch_entry(
        conn: &libsql::Connection,
        term: &str,
    ) -> Result<Option<GlossaryEntry>, DatabaseError> {
        let row = conn
            .query(
                &format!("SELECT {GLOSSARY_COLUMNS} FROM glossary WHERE term = ?1"),
                params![term],
            )
            .await?
            .next()
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }
}

#[async_trait::async_trait]
impl GlossaryStore for TenantStore {
    async fn list_glossary(&self) -> Result<Vec<GlossaryEntry>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {GLOSSARY_COLUMNS} FROM glossary ORDER BY term"),
                (),
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn get_glossary_term(&self, term: &str) -> Result<Option<GlossaryEntry>, DatabaseError> {
        let conn = self.backend.connect().await?;
        Self::fetch_entry(&conn, &normalize_term(term)).await
    }

    async fn upsert_glossary_term(
        &self,
        input: &GlossaryTermParams,
    ) -> Result<GlossaryEntry, DatabaseError> {
        let (term, definition, category) = clean_input(input)?;
        let conn = self.backend.connect().await?;
        conn.execute(
            "INSERT INTO glossary (term, definition, category, source, created_at) \
             VALUES (?1, ?2, ?3, 'manual', ?4) \
             ON CONFLICT(term) DO UPDATE SET \
                definition = excluded.definition, \
                category = excluded.category, \
                source = 'manual', \
                created_at = excluded.created_at",
            params![
                term.as_str(),
                definition.as_str(),
                opt_text(category.as_deref()),
                fmt_ts(&Utc::now())
            ],
        )
        .await?;

        Self::fetch_entry(&conn, &term)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to resolve upserted term".to_string()))
    }

    async fn create_glossary_term(
        &self,
        input: &GlossaryTermParams,
    ) -> Result<GlossaryEntry, DatabaseError> {
        let (term, definition, category) = clean_input(input)?;
        let conn = self.backend.connect().await?;
        let inserted = conn
            .execute(
                "INSERT INTO glossary (term, definition, category, source, created_at) \
                 VALUES (?1, ?2, ?3, 'manual', ?4) \
                 ON CONFLICT(term) DO NOTHING",
                params![
                    term.as_str(),
                    definition.as_str(),
                    opt_text(category.as_deref()),
                    fmt_ts(&Utc::now())
                ],
            )
            .await?;
        if inserted == 0 {
            return Err(DatabaseError::Conflict {
                entity: "glossary term".to_string(),
                key: term,
            });
        }

        Self::fetch_entry(&conn, &term)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to resolve inserted term".to_string()))
    }

    async fn delete_glossary_term(&self, term: &str) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM glossary WHERE term = ?1",
                params![normalize_term(term)],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn merge_detected_term(
        &self,
        term: &str,
        definition: &str,
        found: bool,
    ) -> Result<GlossaryMergeOutcome, DatabaseError> {
        let term = normalize_term(term);
        if term.is_empty() {
            return Err(DatabaseError::InvalidInput(
                "glossary term cannot be empty".to_string(),
            ));
        }

        let conn = self.backend.connect().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let merge_result = async {
            let existing = conn
                .query("SELECT source FROM glossary WHERE term = ?1", params![term.as_str()])
                .await?
                .next()
                .await?
                .map(|row| get_text(&row, 0));

            // The WHERE guard repeats the decision so the statement is safe on its own.
            let written = conn
                .execute(
                    "INSERT INTO glossary (term, definition, category, source, created_at) \
                     VALUES (?1, ?2, NULL, 'auto', ?3) \
                     ON CONFLICT(term) DO UPDATE SET \
                        definition = excluded.definition, \
                        source = 'auto', \
                        created_at = excluded.created_at \
                     WHERE ?4 = 1 OR glossary.source <> 'manual'",
                    params![term.as_str(), definition, fmt_ts(&Utc::now()), i64::from(found)],
                )
                .await?;

            Ok::<_, DatabaseError>(match (existing, written) {
                (_, 0) => GlossaryMergeOutcome::KeptManual,
                (None, _) => GlossaryMergeOutcome::Inserted,
                (Some(_), _) => GlossaryMergeOutcome::Updated,
            })
        }
        .await;

        match merge_result {
            Ok(outcome) => {
                conn.execute("COMMIT", ()).await?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }
}
