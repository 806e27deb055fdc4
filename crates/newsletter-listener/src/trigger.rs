// TriggerEvaluator: turns the `on:` block of a job definition into fire
// instants and trigger events.
//
// Schedules are standard five-field cron expressions evaluated in UTC, with
// day-of-week 0 or 7 meaning Sunday. They are rewritten into the seconds-first
// form the `cron` crate parses; day-of-week is spelled out by name because
// that crate numbers Sunday as 1.

use chrono::{DateTime, Utc};
use cron::Schedule;
use newsletter_common::{InputSpec, JobDefinition, JobError, TriggerEvent};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone)]
struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    schedules: Vec<CronSchedule>,
    /// `None` when manual dispatch is disabled.
    inputs: Option<BTreeMap<String, InputSpec>>,
}

impl TriggerEvaluator {
    pub fn new(definition: &JobDefinition) -> Result<Self, JobError> {
        let schedules = definition
            .on
            .schedule
            .iter()
            .map(|entry| {
                Ok(CronSchedule {
                    expression: entry.cron.clone(),
                    schedule: parse_cron(&entry.cron)?,
                })
            })
            .collect::<Result<Vec<_>, JobError>>()?;
        let inputs = definition
            .on
            .workflow_dispatch
            .as_ref()
            .map(|d| d.inputs.clone());
        Ok(Self { schedules, inputs })
    }

    pub fn has_schedule(&self) -> bool {
        !self.schedules.is_empty()
    }

    /// Earliest fire instant strictly after `after`, with the expression
    /// that produced it.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<(String, DateTime<Utc>)> {
        self.schedules
            .iter()
            .filter_map(|s| s.schedule.after(&after).next().map(|at| (s.expression.clone(), at)))
            .min_by_key(|(_, at)| *at)
    }

    /// The next `count` fire instants after `after`. Instants shared by
    /// several expressions are listed once.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<(String, DateTime<Utc>)> {
        let mut fires = Vec::with_capacity(count);
        let mut cursor = after;
        while fires.len() < count {
            let Some((expression, at)) = self.next_fire_after(cursor) else {
                break;
            };
            cursor = at;
            fires.push((expression, at));
        }
        fires
    }

    /// Declared inputs with their defaults; inputs without one are omitted.
    pub fn default_inputs(&self) -> BTreeMap<String, String> {
        self.inputs
            .iter()
            .flatten()
            .filter_map(|(name, spec)| spec.default.clone().map(|d| (name.clone(), d)))
            .collect()
    }

    /// Trigger event for a schedule firing at `at`.
    pub fn scheduled(&self, expression: &str, at: DateTime<Utc>) -> TriggerEvent {
        TriggerEvent::schedule(expression, at, self.default_inputs())
    }

    /// Trigger event for a manual run. Provided values pass through
    /// unchanged; missing ones fall back to their defaults.
    pub fn dispatch(&self, provided: BTreeMap<String, String>) -> Result<TriggerEvent, JobError> {
        let Some(declared) = &self.inputs else {
            return Err(JobError::InvalidDefinition(
                "manual dispatch is not enabled for this job".to_string(),
            ));
        };

        let unknown: Vec<&str> = provided
            .keys()
            .filter(|name| !declared.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(JobError::UnexpectedInput(unknown.join(", ")));
        }

        let mut inputs = BTreeMap::new();
        for (name, spec) in declared {
            match provided.get(name) {
                Some(value) => {
                    spec.check(name, value)?;
                    inputs.insert(name.clone(), value.clone());
                }
                None => match &spec.default {
                    Some(default) => {
                        inputs.insert(name.clone(), default.clone());
                    }
                    None if spec.required => return Err(JobError::MissingInput(name.clone())),
                    None => {}
                },
            }
        }
        Ok(TriggerEvent::workflow_dispatch(inputs))
    }
}

/// Parse a five-field cron expression.
pub fn parse_cron(expression: &str) -> Result<Schedule, JobError> {
    let invalid = |reason: String| JobError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };

    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, day_of_month, month, day_of_week] = fields[..] else {
        return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
    };
    let day_of_week = day_of_week_names(day_of_week).map_err(invalid)?;

    let normalized = format!("0 {} {} {} {} {}", minute, hour, day_of_month, month, day_of_week);
    Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

/// Rewrite a standard day-of-week field (0-7, names, lists, ranges, steps)
/// as `*` or a list of day names.
fn day_of_week_names(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok("*".to_string());
    }

    let mut days = BTreeSet::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| format!("invalid day-of-week step '{}'", step))?;
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((start, end)) => (parse_day(start)?, parse_day(end)?),
                // `5/2` means from 5 to the end of the week
                None if part.contains('/') => (parse_day(range)?, 7),
                None => {
                    let day = parse_day(range)?;
                    (day, day)
                }
            },
        };
        // `FRI-SUN` ends on Sunday
        let end = if end == 0 && start > 0 { 7 } else { end };
        if start > end {
            return Err(format!("invalid day-of-week range '{}'", range));
        }
        days.extend((start..=end).step_by(step as usize).map(|d| d % 7));
    }

    if days.len() == DAY_NAMES.len() {
        return Ok("*".to_string());
    }
    Ok(days
        .into_iter()
        .map(|d| DAY_NAMES[d as usize])
        .collect::<Vec<_>>()
        .join(","))
}

/// `0`-`7` (both Sunday, folded by the caller) or a three-letter English
/// name.
fn parse_day(token: &str) -> Result<u32, String> {
    if let Ok(number) = token.parse::<u32>() {
        return match number {
            0..=7 => Ok(number),
            _ => Err(format!("day-of-week {} is out of range 0-7", number)),
        };
    }
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .map(|index| index as u32)
        .ok_or_else(|| format!("invalid day-of-week '{}'", token))
}
