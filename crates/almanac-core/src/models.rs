use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A calendar event: the base entity that recurrence expansion operates on.
///
/// An event with no `rule_id` occurs exactly once, at `[start, end)`. An
/// event with a rule repeats according to the referenced
/// [`RecurrenceRule`](crate::pattern::RecurrenceRule), with `start` anchoring
/// the recurrence and `end - start` fixing the duration of every occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    #[serde(with = "uuid::serde::compact")]
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Start instant in UTC; origin of the recurrence when a rule is set.
    pub start: DateTime<Utc>,
    /// End instant in UTC; must not precede `start` (not enforced here).
    pub end: DateTime<Utc>,
    /// IANA timezone name anchoring local-time recurrence arithmetic.
    pub timezone: String,
    /// Optional foreign key to recurrence_rules.
    pub rule_id: Option<Uuid>,
    /// Inclusive upper bound on generated occurrence starts. Occurrences
    /// after this instant are never produced, regardless of the query window.
    pub end_recurring: Option<DateTime<Utc>>,
    pub creator: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl Default for Event {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title: "".to_string(),
            description: None,
            start: now,
            end: now + Duration::hours(1),
            timezone: "UTC".to_string(),
            rule_id: None,
            end_recurring: None,
            creator: None,
            created_on: now,
        }
    }
}

impl Event {
    /// Duration shared by the event and every occurrence generated from it.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Stable identity of an occurrence, independent of any move.
///
/// Two occurrences describe the same logical slot iff their keys are equal;
/// `start`/`end` may differ because the slot was rescheduled. Used as the
/// hash key when reconciling persisted overrides against generated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccurrenceKey {
    #[serde(with = "uuid::serde::compact")]
    pub event_id: Uuid,
    pub original_start: DateTime<Utc>,
    pub original_end: DateTime<Utc>,
}

/// A single occurrence of an event.
///
/// Occurrences come in two forms that share this type: *generated* ones,
/// produced transiently by [`RecurrenceExpander`](crate::recurrence::RecurrenceExpander)
/// on every expansion call, and *persisted overrides*, stored once a user
/// moves or cancels a specific occurrence. `original_start`/`original_end`
/// record the instants the occurrence had at generation time and never
/// change; `start`/`end` track the current (possibly moved) position.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Occurrence {
    #[serde(with = "uuid::serde::compact")]
    pub id: Uuid,
    #[serde(with = "uuid::serde::compact")]
    pub event_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub original_start: DateTime<Utc>,
    pub original_end: DateTime<Utc>,
    pub cancelled: bool,
    /// Optional override text for this occurrence only.
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    /// Creates a fresh generated occurrence for `event` at the given slot.
    pub fn generated(event: &Event, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_id: event.id,
            start,
            end,
            original_start: start,
            original_end: end,
            cancelled: false,
            description: None,
            created_at: Utc::now(),
        }
    }

    /// The identity tuple for this occurrence.
    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey {
            event_id: self.event_id,
            original_start: self.original_start,
            original_end: self.original_end,
        }
    }

    /// True iff this occurrence has been rescheduled away from its
    /// generated slot.
    pub fn moved(&self) -> bool {
        self.start != self.original_start || self.end != self.original_end
    }

    /// Reschedules the occurrence. The identity tuple is left untouched;
    /// no ordering constraint between `new_start` and `new_end` is enforced.
    pub fn move_to(&mut self, new_start: DateTime<Utc>, new_end: DateTime<Utc>) {
        self.start = new_start;
        self.end = new_end;
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn uncancel(&mut self) {
        self.cancelled = false;
    }
}

/// Equality is identity-tuple equality: same event, same original instants.
/// Current `start`/`end` are deliberately ignored so that a moved persisted
/// override still matches its freshly generated counterpart.
impl PartialEq for Occurrence {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Occurrence {}

// ============================================================================
// Data Transfer Objects (DTOs)
// ============================================================================

/// Data required to create a new event.
#[derive(Debug, Clone)]
pub struct NewEventData {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA timezone name; defaults to "UTC" when absent.
    pub timezone: Option<String>,
    /// Attach an existing recurrence rule.
    pub rule_id: Option<Uuid>,
    pub end_recurring: Option<DateTime<Utc>>,
    pub creator: Option<String>,
}

impl Default for NewEventData {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: "".to_string(),
            description: None,
            start: now,
            end: now + Duration::hours(1),
            timezone: None,
            rule_id: None,
            end_recurring: None,
            creator: None,
        }
    }
}

/// Data for modifying an existing event. Double-`Option` fields distinguish
/// "leave unchanged" (outer `None`) from "clear" (inner `None`).
#[derive(Debug, Clone, Default)]
pub struct UpdateEventData {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    /// Assign or clear the recurrence rule.
    pub rule_id: Option<Option<Uuid>>,
    /// Assign or clear the recurrence end bound.
    pub end_recurring: Option<Option<DateTime<Utc>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn sample_event() -> Event {
        Event {
            start: Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2008, 1, 2, 0, 0, 0).unwrap(),
            title: "Sample".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_generated_occurrence_identity() {
        let event = sample_event();
        let occ = Occurrence::generated(&event, event.start, event.end);
        assert_eq!(occ.original_start, occ.start);
        assert_eq!(occ.original_end, occ.end);
        assert!(!occ.moved());
        assert!(!occ.cancelled);
    }

    #[test]
    fn test_move_preserves_identity() {
        let event = sample_event();
        let mut occ = Occurrence::generated(&event, event.start, event.end);
        let original_key = occ.key();

        let new_start = Utc.with_ymd_and_hms(2008, 2, 15, 0, 0, 0).unwrap();
        let new_end = Utc.with_ymd_and_hms(2008, 2, 16, 0, 0, 0).unwrap();
        occ.move_to(new_start, new_end);

        assert!(occ.moved());
        assert_eq!(occ.key(), original_key);
        assert_eq!(occ.start, new_start);
        assert_eq!(occ.end, new_end);
    }

    #[test]
    fn test_moved_occurrence_equals_generated_counterpart() {
        let event = sample_event();
        let generated = Occurrence::generated(&event, event.start, event.end);
        let mut moved = generated.clone();
        moved.move_to(
            Utc.with_ymd_and_hms(2008, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2008, 3, 2, 0, 0, 0).unwrap(),
        );

        // Equality is identity equality, so a move changes nothing here.
        assert_eq!(generated, moved);
    }

    #[test]
    fn test_occurrences_of_different_events_are_unequal() {
        let event_a = sample_event();
        let event_b = sample_event();
        let occ_a = Occurrence::generated(&event_a, event_a.start, event_a.end);
        let occ_b = Occurrence::generated(&event_b, event_b.start, event_b.end);
        assert_ne!(occ_a, occ_b);
    }

    #[test]
    fn test_cancel_uncancel_round_trip() {
        let event = sample_event();
        let mut occ = Occurrence::generated(&event, event.start, event.end);
        let key = occ.key();

        occ.cancel();
        assert!(occ.cancelled);
        occ.uncancel();
        assert!(!occ.cancelled);
        assert_eq!(occ.key(), key);
    }

    #[test]
    fn test_key_usable_for_indexed_lookup() {
        let event = sample_event();
        let occ = Occurrence::generated(&event, event.start, event.end);

        let mut index = HashMap::new();
        index.insert(occ.key(), occ.clone());

        let probe = Occurrence::generated(&event, event.start, event.end);
        assert!(index.contains_key(&probe.key()));
    }
}
