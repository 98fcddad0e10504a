//! # Almanac Core Library
//!
//! A calendar core that materializes concrete occurrences of recurring
//! events and reconciles them with user-modified (moved or cancelled)
//! instances over arbitrary query windows.
//!
//! ## Features
//!
//! - **Recurrence Expansion**: RFC 5545-backed generation of event
//!   occurrences from compact frequency/parameter rules, bounded by a query
//!   window and an optional recurrence end
//! - **Override Reconciliation**: persisted moves and cancellations are
//!   substituted into the generated sequence by a stable identity tuple,
//!   never by current position
//! - **Timezone Awareness**: IANA timezone anchoring for DST-correct
//!   local-time repetition; all stored instants are UTC
//! - **Pure Core**: expansion and reconciliation are synchronous, CPU-bound
//!   and deterministic; only the repository boundary touches storage
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and schema management
//! - [`models`]: Events, occurrences and transfer objects
//! - [`pattern`]: Recurrence rules and the parameter codec
//! - [`recurrence`]: Expansion and reconciliation engines
//! - [`repository`]: Data access layer with Repository pattern
//! - [`timezone`]: Timezone validation helpers
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use almanac_core::{
//!     db,
//!     models::NewEventData,
//!     pattern::{Frequency, NewRuleData},
//!     repository::{EventRepository, OccurrenceRepository, RuleRepository, SqliteRepository},
//! };
//! use chrono::{Duration, Utc};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("almanac.db").await?;
//!     let repo = SqliteRepository::new(pool);
//!
//!     let weekly = repo
//!         .add_rule(NewRuleData {
//!             name: "Weekly".to_string(),
//!             description: None,
//!             frequency: Frequency::Weekly,
//!             params: "".to_string(),
//!         })
//!         .await?;
//!
//!     let start = Utc::now();
//!     let event = repo
//!         .add_event(NewEventData {
//!             title: "Team sync".to_string(),
//!             start,
//!             end: start + Duration::hours(1),
//!             rule_id: Some(weekly.id),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     let occurrences = repo
//!         .event_occurrences(event.id, start, start + Duration::days(30))
//!         .await?;
//!     println!("{} occurrences in the next month", occurrences.len());
//!
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod pattern;
pub mod recurrence;
pub mod repository;
pub mod timezone;
