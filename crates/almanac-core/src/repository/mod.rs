use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{Event, NewEventData, Occurrence, OccurrenceKey, UpdateEventData};
use crate::pattern::{NewRuleData, RecurrenceRule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Re-export domain modules
pub mod events;
pub mod occurrences;
pub mod rules;

// Traits are defined in this module and implemented in respective domain
// modules.

/// Domain-specific trait for event operations
#[async_trait]
pub trait EventRepository {
    async fn add_event(&self, data: NewEventData) -> Result<Event, CoreError>;
    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<Event>, CoreError>;
    async fn find_events_by_rule(&self, rule_id: Uuid) -> Result<Vec<Event>, CoreError>;
    async fn update_event(&self, id: Uuid, data: UpdateEventData) -> Result<Event, CoreError>;
    async fn delete_event(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for recurrence rule operations
#[async_trait]
pub trait RuleRepository {
    async fn add_rule(&self, data: NewRuleData) -> Result<RecurrenceRule, CoreError>;
    async fn find_rule_by_id(&self, id: Uuid) -> Result<Option<RecurrenceRule>, CoreError>;
    async fn find_rules(&self) -> Result<Vec<RecurrenceRule>, CoreError>;
    async fn delete_rule(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for occurrence overrides and reconciled queries
#[async_trait]
pub trait OccurrenceRepository {
    /// All persisted overrides for an event, regardless of where their
    /// current start/end lies.
    async fn fetch_overrides(&self, event_id: Uuid) -> Result<Vec<Occurrence>, CoreError>;
    /// Upsert by identity tuple.
    async fn save_override(&self, occurrence: &Occurrence) -> Result<(), CoreError>;
    async fn remove_override(&self, key: &OccurrenceKey) -> Result<(), CoreError>;
    /// Expand the event over the window and substitute persisted overrides:
    /// the full reconciled occurrence sequence, in generation order.
    async fn event_occurrences(
        &self,
        event_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError>;
    async fn move_occurrence(
        &self,
        key: &OccurrenceKey,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Occurrence, CoreError>;
    async fn cancel_occurrence(&self, key: &OccurrenceKey) -> Result<Occurrence, CoreError>;
    async fn uncancel_occurrence(&self, key: &OccurrenceKey) -> Result<Occurrence, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository: EventRepository + RuleRepository + OccurrenceRepository {
    // This trait automatically composes all domain-specific repositories.
}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteRepository {}
