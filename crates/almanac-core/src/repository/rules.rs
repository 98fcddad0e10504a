use crate::error::CoreError;
use crate::pattern::{NewRuleData, RecurrenceRule};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::RuleRepository for SqliteRepository {
    async fn add_rule(&self, data: NewRuleData) -> Result<RecurrenceRule, CoreError> {
        let rule = RecurrenceRule {
            id: Uuid::now_v7(),
            name: data.name,
            description: data.description,
            frequency: data.frequency,
            params: data.params,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO recurrence_rules (id, name, description, frequency, params, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.frequency)
        .bind(&rule.params)
        .bind(rule.created_at)
        .execute(self.pool())
        .await?;

        Ok(rule)
    }

    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError> {
        let rule = sqlx::query_as("SELECT * FROM recurrence_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(rule)
    }

    async fn find_rules(&self) -> Result<Vec<RecurrenceRule>, CoreError> {
        let rules = sqlx::query_as("SELECT * FROM recurrence_rules ORDER BY created_at")
            .fetch_all(self.pool())
            .await?;
        Ok(rules)
    }

    async fn delete_rule(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        // Events referencing the rule fall back to one-shot behavior.
        sqlx::query("UPDATE events SET rule_id = NULL WHERE rule_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM recurrence_rules WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Rule with id {} not found",
                id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
