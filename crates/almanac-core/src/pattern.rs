use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// Recurrence frequency, stored as uppercase TEXT.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Yearly => write!(f, "YEARLY"),
            Frequency::Monthly => write!(f, "MONTHLY"),
            Frequency::Weekly => write!(f, "WEEKLY"),
            Frequency::Daily => write!(f, "DAILY"),
            Frequency::Hourly => write!(f, "HOURLY"),
            Frequency::Minutely => write!(f, "MINUTELY"),
            Frequency::Secondly => write!(f, "SECONDLY"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "YEARLY" => Ok(Frequency::Yearly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "WEEKLY" => Ok(Frequency::Weekly),
            "DAILY" => Ok(Frequency::Daily),
            "HOURLY" => Ok(Frequency::Hourly),
            "MINUTELY" => Ok(Frequency::Minutely),
            "SECONDLY" => Ok(Frequency::Secondly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

/// Closed set of constraint parameter names a pattern may carry.
///
/// `Ord` gives the canonical ordering used by [`encode_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleParam {
    Count,
    Bysetpos,
    Bymonth,
    Bymonthday,
    Byyearday,
    Byweekno,
    Byweekday,
    Byhour,
    Byminute,
    Bysecond,
    Byeaster,
}

impl RuleParam {
    /// The RFC 5545 RRULE part name for this parameter, if one exists.
    fn rrule_name(&self) -> Option<&'static str> {
        match self {
            RuleParam::Count => Some("COUNT"),
            RuleParam::Bysetpos => Some("BYSETPOS"),
            RuleParam::Bymonth => Some("BYMONTH"),
            RuleParam::Bymonthday => Some("BYMONTHDAY"),
            RuleParam::Byyearday => Some("BYYEARDAY"),
            RuleParam::Byweekno => Some("BYWEEKNO"),
            RuleParam::Byweekday => Some("BYDAY"),
            RuleParam::Byhour => Some("BYHOUR"),
            RuleParam::Byminute => Some("BYMINUTE"),
            RuleParam::Bysecond => Some("BYSECOND"),
            RuleParam::Byeaster => None,
        }
    }
}

impl std::fmt::Display for RuleParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuleParam::Count => "count",
            RuleParam::Bysetpos => "bysetpos",
            RuleParam::Bymonth => "bymonth",
            RuleParam::Bymonthday => "bymonthday",
            RuleParam::Byyearday => "byyearday",
            RuleParam::Byweekno => "byweekno",
            RuleParam::Byweekday => "byweekday",
            RuleParam::Byhour => "byhour",
            RuleParam::Byminute => "byminute",
            RuleParam::Bysecond => "bysecond",
            RuleParam::Byeaster => "byeaster",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Unknown rule parameter: {0}")]
pub struct ParseRuleParamError(String);

impl FromStr for RuleParam {
    type Err = ParseRuleParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(RuleParam::Count),
            "bysetpos" => Ok(RuleParam::Bysetpos),
            "bymonth" => Ok(RuleParam::Bymonth),
            "bymonthday" => Ok(RuleParam::Bymonthday),
            "byyearday" => Ok(RuleParam::Byyearday),
            "byweekno" => Ok(RuleParam::Byweekno),
            "byweekday" => Ok(RuleParam::Byweekday),
            "byhour" => Ok(RuleParam::Byhour),
            "byminute" => Ok(RuleParam::Byminute),
            "bysecond" => Ok(RuleParam::Bysecond),
            "byeaster" => Ok(RuleParam::Byeaster),
            _ => Err(ParseRuleParamError(s.to_string())),
        }
    }
}

/// A parameter value: a key with exactly one encoded value decodes to
/// `Single`, a key with multiple comma-separated values to `Many`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Single(i32),
    Many(Vec<i32>),
}

impl ParamValue {
    fn to_csv(&self) -> String {
        match self {
            ParamValue::Single(n) => n.to_string(),
            ParamValue::Many(ns) => ns
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Decodes the persisted `key:v1,v2;key2:v` parameter blob into a typed map.
///
/// Segments that do not contain exactly one `:` are silently dropped; this
/// permissiveness is intentional and load-bearing for existing stored data.
/// Segments with an unrecognized key or a non-integer value get the same
/// treatment: decoding never fails, and semantic validation of the surviving
/// parameters is deferred to expansion time.
pub fn parse_params(raw: &str) -> BTreeMap<RuleParam, ParamValue> {
    let mut params = BTreeMap::new();
    for segment in raw.split(';') {
        let parts: Vec<&str> = segment.split(':').collect();
        if parts.len() != 2 {
            continue;
        }
        let key = match parts[0].trim().parse::<RuleParam>() {
            Ok(key) => key,
            Err(_) => continue,
        };
        let values: Result<Vec<i32>, _> = parts[1]
            .split(',')
            .map(|v| v.trim().parse::<i32>())
            .collect();
        let values = match values {
            Ok(values) => values,
            Err(_) => continue,
        };
        let value = if values.len() == 1 {
            ParamValue::Single(values[0])
        } else {
            ParamValue::Many(values)
        };
        params.insert(key, value);
    }
    params
}

/// Encodes a parameter map back into the persisted blob format, in the
/// canonical [`RuleParam`] ordering. `parse_params(&encode_params(&m)) == m`
/// for every map `m`.
pub fn encode_params(params: &BTreeMap<RuleParam, ParamValue>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}:{}", key, value.to_csv()))
        .collect::<Vec<_>>()
        .join(";")
}

/// A persisted recurrence rule: frequency plus the raw parameter blob.
///
/// The blob is stored verbatim as configuration (it is the one semi-stable
/// textual format this crate owns) and decoded on demand via
/// [`parse_params`]. A rule is immutable once created and may be shared by
/// any number of events.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurrenceRule {
    #[serde(with = "uuid::serde::compact")]
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    pub params: String,
    pub created_at: DateTime<Utc>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: "".to_string(),
            description: None,
            frequency: Frequency::Weekly,
            params: String::new(),
            created_at: Utc::now(),
        }
    }
}

impl RecurrenceRule {
    /// Decodes the stored parameter blob.
    pub fn get_params(&self) -> BTreeMap<RuleParam, ParamValue> {
        parse_params(&self.params)
    }

    /// Translates this rule into an RFC 5545 `RRULE` property value for the
    /// recurrence engine, e.g. `FREQ=WEEKLY;BYDAY=MO,WE`.
    ///
    /// Parameters the engine cannot express (`byeaster`, a list-valued
    /// `count`, out-of-range weekday ordinals) are rejected here, at
    /// expansion time, never at parse time.
    pub fn to_rrule_line(&self) -> Result<String, CoreError> {
        let mut line = format!("FREQ={}", self.frequency);
        for (key, value) in &self.get_params() {
            let name = key.rrule_name().ok_or_else(|| {
                CoreError::InvalidRule(format!(
                    "parameter '{}' is not supported by the recurrence engine",
                    key
                ))
            })?;
            let encoded = match key {
                RuleParam::Count => match value {
                    ParamValue::Single(n) => n.to_string(),
                    ParamValue::Many(_) => {
                        return Err(CoreError::InvalidRule(
                            "count takes a single integer, not a list".to_string(),
                        ))
                    }
                },
                RuleParam::Byweekday => weekday_csv(value)?,
                _ => value.to_csv(),
            };
            line.push_str(&format!(";{}={}", name, encoded));
        }
        Ok(line)
    }
}

/// Data required to create a new recurrence rule.
#[derive(Debug, Clone)]
pub struct NewRuleData {
    pub name: String,
    pub description: Option<String>,
    pub frequency: Frequency,
    /// Raw parameter blob in `key:v1,v2;key2:v` form; may be empty.
    pub params: String,
}

/// Maps numeric weekdays (0 = Monday .. 6 = Sunday) to RRULE `BYDAY` codes.
fn weekday_csv(value: &ParamValue) -> Result<String, CoreError> {
    const WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];
    let ordinals: Vec<i32> = match value {
        ParamValue::Single(n) => vec![*n],
        ParamValue::Many(ns) => ns.clone(),
    };
    let mut codes = Vec::with_capacity(ordinals.len());
    for ordinal in ordinals {
        let code = usize::try_from(ordinal)
            .ok()
            .and_then(|i| WEEKDAYS.get(i))
            .ok_or_else(|| {
                CoreError::InvalidRule(format!("byweekday value {} is out of range 0..=6", ordinal))
            })?;
        codes.push(*code);
    }
    Ok(codes.join(","))
}
