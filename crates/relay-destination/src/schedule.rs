use relay_core::{DateTime, Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Schedule at which a destination action runs.
///
/// SaaS APIs can be used in realtime whereas data warehouses shall be loaded
/// only a few times per day. The schedule attached to a destination is the
/// default for all of its actions; an action can override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Whether freshly acknowledged jobs are published on the realtime bus
    /// instead of waiting for the next polling cycle
    pub realtime: bool,
    /// Interval or CRON expression at which jobs are loaded, and at which
    /// failed jobs are retried
    ///
    /// Examples: "@every 1h", "30m", "0 0 9 * * Mon-Fri"
    pub interval: String,
    /// Maximum number of retries per job. When exhausted, the next failure
    /// marks the job as discarded.
    pub max_retries: u32,
}

/// Platform defaults: an hourly interval for 3 days gives teams time to
/// notice failures and debug the destination.
impl Default for Schedule {
    fn default() -> Self {
        Self {
            realtime: false,
            interval: "@every 1h".to_string(),
            max_retries: 72,
        }
    }
}

impl Schedule {
    /// Resolve the schedule for an action: the action-level schedule wins,
    /// else the destination default, else the platform default. Empty or
    /// zero fields of the winner fall back to the platform default.
    pub fn resolve(
        action: Option<Schedule>,
        destination: Option<Schedule>,
        platform: &Schedule,
    ) -> Schedule {
        let mut resolved = action.or(destination).unwrap_or_else(|| platform.clone());

        if resolved.interval.is_empty() {
            resolved.interval = platform.interval.clone();
        }
        if resolved.max_retries == 0 {
            resolved.max_retries = platform.max_retries;
        }

        resolved
    }

    /// Parse the schedule's interval expression
    pub fn parse_interval(&self) -> Result<Interval> {
        self.interval.parse()
    }
}

/// A parsed interval expression: either a fixed duration or a CRON schedule.
#[derive(Debug, Clone)]
pub enum Interval {
    /// Fixed delay between runs
    Every(Duration),
    /// CRON expression resolving to discrete fire times
    Cron(Box<cron::Schedule>),
}

impl Interval {
    /// Next instant at which work is due, strictly after `after`. A fixed
    /// interval is due `after + delay`; a CRON expression resolves to its
    /// next fire time, or None when it has no future occurrence.
    pub fn next_after(&self, after: DateTime) -> Option<DateTime> {
        match self {
            Interval::Every(delay) => {
                let delay = chrono::Duration::from_std(*delay).ok()?;
                after.checked_add_signed(delay)
            }
            Interval::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(Error::schedule("Interval expression must not be empty"));
        }

        if let Some(duration) = expression.strip_prefix("@every ") {
            let duration = parse_duration(duration.trim())?;
            return Ok(Interval::Every(duration));
        }

        if let Ok(duration) = parse_duration(expression) {
            return Ok(Interval::Every(duration));
        }

        // The cron parser wants a seconds field; pad plain five-field
        // expressions so both forms are accepted.
        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };

        match cron::Schedule::from_str(&normalized) {
            Ok(schedule) => Ok(Interval::Cron(Box::new(schedule))),
            Err(err) => Err(Error::schedule(format!(
                "Invalid interval expression '{expression}': {err}"
            ))),
        }
    }
}

/// Parse a compound duration such as "1h", "30m", "90s", or "1h30m".
fn parse_duration(expression: &str) -> Result<Duration> {
    let invalid =
        || Error::schedule(format!("Invalid duration expression '{expression}'"));

    if expression.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut unit = String::new();

    let mut flush = |digits: &mut String, unit: &mut String| -> Result<()> {
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let part = match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            "d" => Duration::from_secs(value * 86_400),
            _ => return Err(invalid()),
        };
        total += part;
        digits.clear();
        unit.clear();
        Ok(())
    };

    for c in expression.chars() {
        if c.is_ascii_digit() {
            if !unit.is_empty() {
                flush(&mut digits, &mut unit)?;
            }
            digits.push(c);
        } else if c.is_ascii_alphabetic() {
            if digits.is_empty() {
                return Err(invalid());
            }
            unit.push(c);
        } else {
            return Err(invalid());
        }
    }

    if digits.is_empty() || unit.is_empty() {
        return Err(invalid());
    }
    flush(&mut digits, &mut unit)?;

    if total.is_zero() {
        return Err(Error::schedule(format!(
            "Duration expression '{expression}' must be greater than zero"
        )));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_schedule_default() {
        let actual = Schedule::default();
        assert!(!actual.realtime);
        assert_eq!(actual.interval, "@every 1h");
        assert_eq!(actual.max_retries, 72);
    }

    #[test]
    fn test_schedule_resolution_order() {
        let platform = Schedule::default();
        let destination = Schedule {
            realtime: false,
            interval: "@every 6h".to_string(),
            max_retries: 10,
        };
        let action = Schedule {
            realtime: true,
            interval: "@every 1m".to_string(),
            max_retries: 3,
        };

        let actual = Schedule::resolve(
            Some(action.clone()),
            Some(destination.clone()),
            &platform,
        );
        assert_eq!(actual, action);

        let actual = Schedule::resolve(None, Some(destination.clone()), &platform);
        assert_eq!(actual, destination);

        let actual = Schedule::resolve(None, None, &platform);
        assert_eq!(actual, platform);
    }

    #[test]
    fn test_schedule_resolution_fills_empty_fields() {
        let platform = Schedule::default();
        let partial = Schedule {
            realtime: true,
            interval: String::new(),
            max_retries: 0,
        };

        let actual = Schedule::resolve(Some(partial), None, &platform);

        assert!(actual.realtime);
        assert_eq!(actual.interval, "@every 1h");
        assert_eq!(actual.max_retries, 72);
    }

    #[test]
    fn test_interval_every() {
        let actual: Interval = "@every 1h".parse().unwrap();
        match actual {
            Interval::Every(duration) => assert_eq!(duration, Duration::from_secs(3600)),
            other => panic!("expected fixed interval, got {other:?}"),
        }
    }

    #[test]
    fn test_interval_bare_duration() {
        let actual: Interval = "30m".parse().unwrap();
        match actual {
            Interval::Every(duration) => assert_eq!(duration, Duration::from_secs(1800)),
            other => panic!("expected fixed interval, got {other:?}"),
        }
    }

    #[test]
    fn test_interval_compound_duration() {
        let actual: Interval = "@every 1h30m".parse().unwrap();
        match actual {
            Interval::Every(duration) => assert_eq!(duration, Duration::from_secs(5400)),
            other => panic!("expected fixed interval, got {other:?}"),
        }
    }

    #[test]
    fn test_interval_five_field_cron() {
        let actual: Interval = "0 9 * * *".parse().unwrap();
        assert!(matches!(actual, Interval::Cron(_)));
    }

    #[test]
    fn test_interval_six_field_cron() {
        let actual: Interval = "0 30 9 * * Mon-Fri".parse().unwrap();
        assert!(matches!(actual, Interval::Cron(_)));
    }

    #[test]
    fn test_interval_invalid() {
        assert!("".parse::<Interval>().is_err());
        assert!("not a schedule".parse::<Interval>().is_err());
        assert!("@every 0s".parse::<Interval>().is_err());
        assert!("@every h".parse::<Interval>().is_err());
    }

    #[test]
    fn test_next_after_fixed() {
        let interval: Interval = "@every 1h".parse().unwrap();
        let after = chrono::Utc::now();

        let actual = interval.next_after(after).unwrap();

        assert_eq!(actual - after, chrono::Duration::hours(1));
    }

    #[test]
    fn test_next_after_cron() {
        let interval: Interval = "0 0 * * * *".parse().unwrap();
        let after = chrono::Utc::now();

        let actual = interval.next_after(after).unwrap();

        assert!(actual > after);
        assert!(actual - after <= chrono::Duration::hours(1));
    }
}
