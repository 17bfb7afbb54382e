//! Trigger resolution: turns the raw [`crate::model::TriggerSpec`] the
//! control API accepts into a concrete, fireable schedule.
//!
//! Precedence: a truthy `interval` always wins, then `cron`, then a bare
//! `start_time` as a one-shot. Anything else is a missing-trigger error.

use crate::model::TriggerSpec;
use crate::SchedulerError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval {
        start_time: DateTime<Utc>,
        period: Duration,
        end_time: Option<DateTime<Utc>>,
    },
    Cron {
        expression: String,
        schedule: cron::Schedule,
        end_time: Option<DateTime<Utc>>,
    },
    Once {
        run_at: DateTime<Utc>,
    },
}

impl Trigger {
    pub fn from_spec(spec: &TriggerSpec) -> Result<Self, SchedulerError> {
        if let Some(interval) = spec.interval {
            if interval > 0 {
                let start_time = match spec.start_time.as_deref().filter(|s| !s.is_empty()) {
                    Some(s) => parse_time(s)?,
                    None => Utc::now(),
                };
                return Ok(Trigger::Interval {
                    start_time,
                    period: Duration::from_secs(interval),
                    end_time: parse_optional_time(spec.end_time.as_deref())?,
                });
            }
        }

        if let Some(cron_expr) = spec.cron.as_deref().filter(|c| !c.is_empty()) {
            let schedule = cron::Schedule::from_str(&normalize_cron(cron_expr)).map_err(|e| {
                SchedulerError::InvalidArgument(format!("invalid cron expression: {e}"))
            })?;
            return Ok(Trigger::Cron {
                expression: cron_expr.to_string(),
                schedule,
                end_time: parse_optional_time(spec.end_time.as_deref())?,
            });
        }

        if let Some(start_time) = spec.start_time.as_deref().filter(|s| !s.is_empty()) {
            let run_at = parse_time(start_time)?;
            return Ok(Trigger::Once { run_at });
        }

        Err(SchedulerError::InvalidArgument(
            "missing trigger configuration".to_string(),
        ))
    }

    /// Returns the next fire time strictly after `after`, or `None` if the
    /// trigger is exhausted (a one-shot that already fired, or a window
    /// whose `end_time` has passed).
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval {
                start_time,
                period,
                end_time,
            } => {
                let period = chrono::Duration::from_std(*period).ok()?;
                let next = if after < *start_time {
                    *start_time
                } else {
                    let elapsed = after.signed_duration_since(*start_time);
                    let periods_since_start = elapsed.num_milliseconds() / period.num_milliseconds() + 1;
                    *start_time + period * periods_since_start as i32
                };
                within_end(next, *end_time)
            }
            Trigger::Cron {
                schedule, end_time, ..
            } => {
                let next = schedule.after(&after).next()?;
                within_end(next, *end_time)
            }
            Trigger::Once { run_at } => {
                if *run_at > after {
                    Some(*run_at)
                } else {
                    None
                }
            }
        }
    }
}

fn within_end(candidate: DateTime<Utc>, end_time: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match end_time {
        Some(end) if candidate > end => None,
        _ => Some(candidate),
    }
}

fn parse_optional_time(s: Option<&str>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match s.filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(parse_time(v)?)),
        None => Ok(None),
    }
}

/// Accepts RFC 3339 timestamps and the zone-less `YYYY-MM-DDTHH:MM:SS` /
/// `YYYY-MM-DD HH:MM:SS` forms, which are interpreted in the scheduler's
/// local zone.
fn parse_time(s: &str) -> Result<DateTime<Utc>, SchedulerError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }
    Err(SchedulerError::InvalidArgument(format!(
        "invalid timestamp '{s}'"
    )))
}

/// `cron` crate schedules use 6 or 7 fields (seconds-first); the control API
/// accepts the conventional 5-field crontab form, so a missing seconds
/// field is filled in as `0`.
fn normalize_cron(expr: &str) -> String {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_wins_over_cron_and_start_time() {
        let spec = TriggerSpec {
            interval: Some(30),
            cron: Some("invalid cron".to_string()),
            start_time: Some("2026-01-01T00:00:00Z".to_string()),
            end_time: None,
        };
        let trigger = Trigger::from_spec(&spec).unwrap();
        assert!(matches!(trigger, Trigger::Interval { .. }));
    }

    #[test]
    fn zero_interval_falls_through_to_cron() {
        let spec = TriggerSpec {
            interval: Some(0),
            cron: Some("*/5 * * * *".to_string()),
            start_time: None,
            end_time: None,
        };
        let trigger = Trigger::from_spec(&spec).unwrap();
        assert!(matches!(trigger, Trigger::Cron { .. }));
    }

    #[test]
    fn invalid_cron_fails_fast() {
        let spec = TriggerSpec {
            interval: None,
            cron: Some("not a cron expression".to_string()),
            start_time: None,
            end_time: None,
        };
        assert!(Trigger::from_spec(&spec).is_err());
    }

    #[test]
    fn bare_start_time_is_one_shot() {
        let spec = TriggerSpec {
            interval: None,
            cron: None,
            start_time: Some("2026-01-01T00:00:00Z".to_string()),
            end_time: None,
        };
        let trigger = Trigger::from_spec(&spec).unwrap();
        assert!(matches!(trigger, Trigger::Once { .. }));
    }

    #[test]
    fn missing_everything_is_an_error() {
        let spec = TriggerSpec::default();
        let err = Trigger::from_spec(&spec).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    }

    #[test]
    fn once_trigger_exhausts_after_firing() {
        let run_at = Utc::now();
        let trigger = Trigger::Once { run_at };
        assert!(trigger.next_fire_after(run_at - chrono::Duration::seconds(1)).is_some());
        assert!(trigger.next_fire_after(run_at).is_none());
    }

    #[test]
    fn interval_respects_end_time() {
        let now = Utc::now();
        let trigger = Trigger::Interval {
            start_time: now,
            period: Duration::from_secs(60),
            end_time: Some(now + chrono::Duration::seconds(30)),
        };
        assert!(trigger.next_fire_after(now).is_none());
    }

    #[test]
    fn interval_fires_on_the_start_time_grid_not_relative_to_now() {
        let start_time = Utc::now() - chrono::Duration::seconds(95);
        let trigger = Trigger::Interval {
            start_time,
            period: Duration::from_secs(30),
            end_time: None,
        };
        let next = trigger.next_fire_after(Utc::now()).unwrap();
        let offset = next.signed_duration_since(start_time).num_seconds();
        assert_eq!(offset % 30, 0, "next fire must land on the start_time grid");
        assert!(next > Utc::now());
    }

    #[test]
    fn every_minute_cron_fires_on_minute_boundaries() {
        use chrono::Timelike;
        let spec = TriggerSpec {
            cron: Some("* * * * *".to_string()),
            ..Default::default()
        };
        let trigger = Trigger::from_spec(&spec).unwrap();
        let next = trigger.next_fire_after(Utc::now()).unwrap();
        assert_eq!(next.second(), 0);
        assert!(next > Utc::now());
    }

    #[test]
    fn zone_less_timestamps_parse_as_local_time() {
        let spec = TriggerSpec {
            start_time: Some("2099-05-01 12:00:00".to_string()),
            ..Default::default()
        };
        let trigger = Trigger::from_spec(&spec).unwrap();
        assert!(matches!(trigger, Trigger::Once { .. }));
        let spec = TriggerSpec {
            start_time: Some("2099-05-01T12:00:00".to_string()),
            ..Default::default()
        };
        assert!(Trigger::from_spec(&spec).is_ok());
    }

    #[test]
    fn interval_with_future_start_time_waits_for_it() {
        let start_time = Utc::now() + chrono::Duration::seconds(60);
        let trigger = Trigger::Interval {
            start_time,
            period: Duration::from_secs(30),
            end_time: None,
        };
        assert_eq!(trigger.next_fire_after(Utc::now()), Some(start_time));
    }
}
