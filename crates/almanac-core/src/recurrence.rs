use chrono::{DateTime, Duration, Utc};
use rrule::{RRuleSet, Tz as RRuleTz};
use std::collections::HashMap;

use crate::error::CoreError;
use crate::models::{Event, Occurrence, OccurrenceKey};
use crate::pattern::RecurrenceRule;

/// Hard cap on instants generated per expansion call. Hitting it is an
/// error, never a silently shortened sequence.
const MAX_GENERATED: u16 = 10_000;

/// Instants scanned when looking for the next occurrence after a point.
const NEXT_LOOKAHEAD: u16 = 8;

/// RecurrenceExpander: materializes the generated occurrences of one event
/// over a query window.
///
/// Responsibilities:
/// 1. Validate the event timezone and translate the rule into an engine
///    `RRuleSet`, anchored at the event start (`DTSTART;TZID=...`)
/// 2. Generate occurrence starts inside a window, never before the event
///    start and never after the event's recurrence end bound
/// 3. Preserve the event duration on every generated occurrence
/// 4. Find the next occurrence strictly after a given instant
///
/// Expansion is a pure function of the captured event snapshot and the
/// window: calling it twice yields identity-equal sequences.
#[derive(Debug)]
pub struct RecurrenceExpander {
    event: Event,
    /// None for one-shot events.
    rrule_set: Option<RRuleSet>,
}

impl RecurrenceExpander {
    /// Creates an expander from an event snapshot and its rule, if any.
    ///
    /// The rule argument is authoritative: callers resolve `event.rule_id`
    /// themselves and pass the matching record. Fails with `InvalidTimezone`
    /// for an unparseable event timezone and `InvalidRule` when the rule's
    /// parameters cannot be expressed to, or are rejected by, the
    /// recurrence engine.
    pub fn new(event: Event, rule: Option<&RecurrenceRule>) -> Result<Self, CoreError> {
        let tz = crate::timezone::parse_timezone(&event.timezone)?;

        let rrule_set = match rule {
            Some(rule) => {
                let dtstart_local = event.start.with_timezone(&tz);
                let source = format!(
                    "DTSTART;TZID={}:{}\nRRULE:{}",
                    event.timezone,
                    dtstart_local.format("%Y%m%dT%H%M%S"),
                    rule.to_rrule_line()?
                );
                let set = source.parse::<RRuleSet>().map_err(|e| {
                    CoreError::InvalidRule(format!("Failed to parse rule '{}': {}", source, e))
                })?;
                Some(set)
            }
            None => None,
        };

        Ok(Self { event, rrule_set })
    }

    /// The event snapshot this expander was built from.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Generates the occurrences of the event whose original start falls in
    /// the half-open window `[window_start, window_end)`, in chronological
    /// order.
    ///
    /// The window convention is half-open throughout: a one-shot event is
    /// included iff `[event.start, event.end)` intersects the window, and a
    /// generated instant is included iff `window_start <= start <
    /// window_end`. `end_recurring` remains an inclusive bound on generated
    /// starts. A window with `window_end < window_start` fails fast with
    /// `InvalidWindow`; an empty window yields an empty sequence.
    pub fn occurrences_between(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        if window_end < window_start {
            return Err(CoreError::InvalidWindow {
                start: window_start,
                end: window_end,
            });
        }

        let set = match &self.rrule_set {
            Some(set) => set,
            None => {
                // One-shot event: it is its own occurrence when the two
                // half-open intervals actually intersect.
                let overlaps = self.event.start.max(window_start) < self.event.end.min(window_end);
                if overlaps {
                    return Ok(vec![Occurrence::generated(
                        &self.event,
                        self.event.start,
                        self.event.end,
                    )]);
                }
                return Ok(Vec::new());
            }
        };

        let duration = self.event.duration();

        // Bound the engine scan by the window end or the recurrence end,
        // whichever comes first. The bounds handed to the engine are widened
        // by a second (falling back to the unwidened bound at the edge of
        // the representable range); the exact window edges are enforced by
        // the filter below.
        let upper = match self.event.end_recurring {
            Some(bound) if bound < window_end => bound,
            _ => window_end,
        };
        let engine_lower = window_start
            .checked_sub_signed(Duration::seconds(1))
            .unwrap_or(window_start);
        let engine_upper = upper
            .checked_add_signed(Duration::seconds(1))
            .unwrap_or(upper);

        let bounded = set
            .clone()
            .after(engine_lower.with_timezone(&RRuleTz::UTC))
            .before(engine_upper.with_timezone(&RRuleTz::UTC));
        let (dates, limited) = bounded.all(MAX_GENERATED);
        if limited {
            return Err(CoreError::InvalidInput(format!(
                "window expands to more than {} occurrences",
                MAX_GENERATED
            )));
        }

        let mut occurrences = Vec::with_capacity(dates.len());
        for dt in dates {
            let start = dt.with_timezone(&Utc);
            if start < window_start || start >= window_end {
                continue;
            }
            if let Some(bound) = self.event.end_recurring {
                if start > bound {
                    continue;
                }
            }
            occurrences.push(Occurrence::generated(&self.event, start, start + duration));
        }

        Ok(occurrences)
    }

    /// Finds the smallest generated occurrence with `original_start`
    /// strictly after `after`, or `None` when the recurrence has ended.
    pub fn next_occurrence_after(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Option<Occurrence>, CoreError> {
        let set = match &self.rrule_set {
            Some(set) => set,
            None => {
                if self.event.start > after {
                    return Ok(Some(Occurrence::generated(
                        &self.event,
                        self.event.start,
                        self.event.end,
                    )));
                }
                return Ok(None);
            }
        };

        let duration = self.event.duration();
        let bounded = set.clone().after(after.with_timezone(&RRuleTz::UTC));
        let (dates, _) = bounded.all(NEXT_LOOKAHEAD);

        for dt in dates {
            let start = dt.with_timezone(&Utc);
            // The engine's lower bound is inclusive; "next" is strict.
            if start <= after {
                continue;
            }
            if let Some(bound) = self.event.end_recurring {
                if start > bound {
                    return Ok(None);
                }
            }
            return Ok(Some(Occurrence::generated(&self.event, start, start + duration)));
        }

        Ok(None)
    }
}

/// OccurrenceReconciler: substitutes persisted overrides into a generated
/// occurrence sequence.
///
/// Overrides are indexed by [`OccurrenceKey`] for O(1) lookup, the same way
/// the store's records are matched: by original generation instants, not by
/// current position. Substitution never adds or removes entries, so the
/// output has the cardinality and order of the generated input. A persisted
/// occurrence that was moved outside the query window is therefore still
/// surfaced, at the position its generated counterpart occupies.
#[derive(Debug, Default)]
pub struct OccurrenceReconciler {
    overrides: HashMap<OccurrenceKey, Occurrence>,
}

impl OccurrenceReconciler {
    /// Builds the override index from all persisted occurrences of an event.
    pub fn new(overrides: Vec<Occurrence>) -> Self {
        let mut index = HashMap::with_capacity(overrides.len());
        for occurrence in overrides {
            index.insert(occurrence.key(), occurrence);
        }
        Self { overrides: index }
    }

    /// Number of persisted overrides in the index.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Replaces each generated occurrence that has a persisted counterpart
    /// with that counterpart, in place.
    pub fn merge(&self, generated: Vec<Occurrence>) -> Vec<Occurrence> {
        generated
            .into_iter()
            .map(|occurrence| {
                self.overrides
                    .get(&occurrence.key())
                    .cloned()
                    .unwrap_or(occurrence)
            })
            .collect()
    }
}

/// Expands `event` over `[window_start, window_end)` and substitutes the
/// given persisted overrides: the full generate-then-reconcile pipeline.
pub fn reconcile(
    event: &Event,
    rule: Option<&RecurrenceRule>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    overrides: Vec<Occurrence>,
) -> Result<Vec<Occurrence>, CoreError> {
    let expander = RecurrenceExpander::new(event.clone(), rule)?;
    let generated = expander.occurrences_between(window_start, window_end)?;
    Ok(OccurrenceReconciler::new(overrides).merge(generated))
}
