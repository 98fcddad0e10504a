use crate::error::CoreError;
use crate::models::{Event, NewEventData, UpdateEventData};
use crate::pattern::RecurrenceRule;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

#[async_trait]
impl super::EventRepository for SqliteRepository {
    async fn add_event(&self, data: NewEventData) -> Result<Event, CoreError> {
        let timezone = data.timezone.unwrap_or_else(|| "UTC".to_string());
        crate::timezone::validate_timezone(&timezone)?;

        let mut tx = self.pool().begin().await?;

        // The referenced rule must exist before an event can recur by it.
        if let Some(rule_id) = data.rule_id {
            let rule: Option<RecurrenceRule> =
                sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
                    .bind(rule_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if rule.is_none() {
                return Err(CoreError::NotFound(format!(
                    "Rule with id {} not found",
                    rule_id
                )));
            }
        }

        let event = Event {
            id: Uuid::now_v7(),
            title: data.title,
            description: data.description,
            start: data.start,
            end: data.end,
            timezone,
            rule_id: data.rule_id,
            end_recurring: data.end_recurring,
            creator: data.creator,
            created_on: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO events (id, title, description, start, "end", timezone, rule_id, end_recurring, creator, created_on)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start)
        .bind(event.end)
        .bind(&event.timezone)
        .bind(event.rule_id)
        .bind(event.end_recurring)
        .bind(&event.creator)
        .bind(event.created_on)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event)
    }

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError> {
        let event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(event)
    }

    async fn find_events_by_rule(&self, rule_id: Uuid) -> Result<Vec<Event>, CoreError> {
        let events = sqlx::query_as("SELECT * FROM events WHERE rule_id = $1 ORDER BY start")
            .bind(rule_id)
            .fetch_all(self.pool())
            .await?;
        Ok(events)
    }

    async fn update_event(&self, id: Uuid, data: UpdateEventData) -> Result<Event, CoreError> {
        let mut tx = self.pool().begin().await?;

        let existing: Option<Event> = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_none() {
            return Err(CoreError::NotFound(format!(
                "Event with id {} not found",
                id
            )));
        }

        if let Some(timezone) = &data.timezone {
            crate::timezone::validate_timezone(timezone)?;
        }

        if let Some(Some(rule_id)) = data.rule_id {
            let rule: Option<RecurrenceRule> =
                sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
                    .bind(rule_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if rule.is_none() {
                return Err(CoreError::NotFound(format!(
                    "Rule with id {} not found",
                    rule_id
                )));
            }
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE events SET ");
        let mut updated = false;

        if let Some(title) = &data.title {
            qb.push("title = ");
            qb.push_bind(title);
            updated = true;
        }

        if let Some(description) = &data.description {
            if updated {
                qb.push(", ");
            }
            qb.push("description = ");
            qb.push_bind(description.clone());
            updated = true;
        }

        if let Some(start) = data.start {
            if updated {
                qb.push(", ");
            }
            qb.push("start = ");
            qb.push_bind(start);
            updated = true;
        }

        if let Some(end) = data.end {
            if updated {
                qb.push(", ");
            }
            qb.push("\"end\" = ");
            qb.push_bind(end);
            updated = true;
        }

        if let Some(timezone) = &data.timezone {
            if updated {
                qb.push(", ");
            }
            qb.push("timezone = ");
            qb.push_bind(timezone);
            updated = true;
        }

        if let Some(rule_id) = &data.rule_id {
            if updated {
                qb.push(", ");
            }
            qb.push("rule_id = ");
            qb.push_bind(*rule_id);
            updated = true;
        }

        if let Some(end_recurring) = &data.end_recurring {
            if updated {
                qb.push(", ");
            }
            qb.push("end_recurring = ");
            qb.push_bind(*end_recurring);
            updated = true;
        }

        if updated {
            qb.push(" WHERE id = ");
            qb.push_bind(id);
            qb.build().execute(&mut *tx).await?;
        }

        let updated_event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated_event)
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        // Persisted overrides reference the event and go with it.
        sqlx::query("DELETE FROM occurrences WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Event with id {} not found",
                id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
