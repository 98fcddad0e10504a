use crate::error::CoreError;
use crate::models::{Event, Occurrence, OccurrenceKey};
use crate::pattern::RecurrenceRule;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

#[async_trait]
impl super::OccurrenceRepository for SqliteRepository {
    async fn fetch_overrides(&self, event_id: Uuid) -> Result<Vec<Occurrence>, CoreError> {
        let mut tx = self.pool().begin().await?;
        let overrides = Self::fetch_overrides_in_transaction(&mut tx, event_id).await?;
        tx.commit().await?;
        Ok(overrides)
    }

    async fn save_override(&self, occurrence: &Occurrence) -> Result<(), CoreError> {
        sqlx::query(
            r#"INSERT INTO occurrences (id, event_id, start, "end", original_start, original_end, cancelled, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (event_id, original_start, original_end) DO UPDATE SET
                start = excluded.start,
                "end" = excluded."end",
                cancelled = excluded.cancelled,
                description = excluded.description"#,
        )
        .bind(occurrence.id)
        .bind(occurrence.event_id)
        .bind(occurrence.start)
        .bind(occurrence.end)
        .bind(occurrence.original_start)
        .bind(occurrence.original_end)
        .bind(occurrence.cancelled)
        .bind(&occurrence.description)
        .bind(occurrence.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove_override(&self, key: &OccurrenceKey) -> Result<(), CoreError> {
        let result = sqlx::query(
            "DELETE FROM occurrences WHERE event_id = $1 AND original_start = $2 AND original_end = $3",
        )
        .bind(key.event_id)
        .bind(key.original_start)
        .bind(key.original_end)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "No override for event {} at {}",
                key.event_id, key.original_start
            )));
        }

        Ok(())
    }

    async fn event_occurrences(
        &self,
        event_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        // One transaction: the event, its rule and the overrides form a
        // single consistent snapshot even under concurrent writes.
        let mut tx = self.pool().begin().await?;

        let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Event with id {} not found", event_id)))?;

        let rule: Option<RecurrenceRule> = match event.rule_id {
            Some(rule_id) => Some(
                sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
                    .bind(rule_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("Rule with id {} not found", rule_id))
                    })?,
            ),
            None => None,
        };

        let overrides = Self::fetch_overrides_in_transaction(&mut tx, event_id).await?;
        tx.commit().await?;

        crate::recurrence::reconcile(&event, rule.as_ref(), window_start, window_end, overrides)
    }

    async fn move_occurrence(
        &self,
        key: &OccurrenceKey,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Occurrence, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut occurrence = Self::get_or_create_override_in_transaction(&mut tx, key).await?;
        occurrence.move_to(new_start, new_end);

        sqlx::query(r#"UPDATE occurrences SET start = $1, "end" = $2 WHERE id = $3"#)
            .bind(occurrence.start)
            .bind(occurrence.end)
            .bind(occurrence.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(occurrence)
    }

    async fn cancel_occurrence(&self, key: &OccurrenceKey) -> Result<Occurrence, CoreError> {
        self.set_cancelled(key, true).await
    }

    async fn uncancel_occurrence(&self, key: &OccurrenceKey) -> Result<Occurrence, CoreError> {
        self.set_cancelled(key, false).await
    }
}

impl SqliteRepository {
    async fn set_cancelled(
        &self,
        key: &OccurrenceKey,
        cancelled: bool,
    ) -> Result<Occurrence, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut occurrence = Self::get_or_create_override_in_transaction(&mut tx, key).await?;
        if cancelled {
            occurrence.cancel();
        } else {
            occurrence.uncancel();
        }

        sqlx::query("UPDATE occurrences SET cancelled = $1 WHERE id = $2")
            .bind(occurrence.cancelled)
            .bind(occurrence.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(occurrence)
    }

    pub(crate) async fn fetch_overrides_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        event_id: Uuid,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let overrides = sqlx::query_as(
            "SELECT * FROM occurrences WHERE event_id = $1 ORDER BY original_start",
        )
        .bind(event_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(overrides)
    }

    /// Fetches the persisted override for an identity tuple, creating it
    /// from the generated slot on first mutation. The original instants are
    /// taken at face value; whether they actually lie on the event's
    /// pattern is not verified here.
    pub(crate) async fn get_or_create_override_in_transaction(
        tx: &mut Transaction<'_, Sqlite>,
        key: &OccurrenceKey,
    ) -> Result<Occurrence, CoreError> {
        let existing: Option<Occurrence> = sqlx::query_as(
            "SELECT * FROM occurrences WHERE event_id = $1 AND original_start = $2 AND original_end = $3",
        )
        .bind(key.event_id)
        .bind(key.original_start)
        .bind(key.original_end)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(occurrence) = existing {
            return Ok(occurrence);
        }

        let event: Option<Event> = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(key.event_id)
            .fetch_optional(&mut **tx)
            .await?;
        if event.is_none() {
            return Err(CoreError::NotFound(format!(
                "Event with id {} not found",
                key.event_id
            )));
        }

        let occurrence = Occurrence {
            id: Uuid::now_v7(),
            event_id: key.event_id,
            start: key.original_start,
            end: key.original_end,
            original_start: key.original_start,
            original_end: key.original_end,
            cancelled: false,
            description: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO occurrences (id, event_id, start, "end", original_start, original_end, cancelled, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(occurrence.id)
        .bind(occurrence.event_id)
        .bind(occurrence.start)
        .bind(occurrence.end)
        .bind(occurrence.original_start)
        .bind(occurrence.original_end)
        .bind(occurrence.cancelled)
        .bind(&occurrence.description)
        .bind(occurrence.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(occurrence)
    }
}
