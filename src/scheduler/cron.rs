//! Cron-like scheduling for recurring jobs

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::schema::CandlePeriod;

/// Cron-like schedule specification
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Schedule name
    pub name: String,
    /// Schedule expression
    pub expression: ScheduleExpression,
    /// Whether the schedule is enabled
    pub enabled: bool,
    /// Last run time
    pub last_run: Option<DateTime<Utc>>,
    /// Next run time
    pub next_run: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Create a new schedule
    pub fn new(name: String, expression: ScheduleExpression) -> Self {
        let next_run = expression.next_occurrence(Utc::now());
        Self {
            name,
            expression,
            enabled: true,
            last_run: None,
            next_run,
        }
    }

    /// Enable the schedule
    pub fn enable(&mut self) {
        self.enabled = true;
        self.next_run = self.expression.next_occurrence(Utc::now());
    }

    /// Disable the schedule
    pub fn disable(&mut self) {
        self.enabled = false;
        self.next_run = None;
    }

    /// Mark as run and calculate next occurrence
    pub fn mark_run(&mut self) {
        self.last_run = Some(Utc::now());
        self.next_run = self.expression.next_occurrence(Utc::now());
    }

    /// Check if schedule should run now
    pub fn should_run(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.next_run {
            Some(next) => Utc::now() >= next,
            None => false,
        }
    }
}

/// Schedule expression (simplified cron-like)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleExpression {
    /// Run every N seconds
    EverySeconds(u32),
    /// Run every N minutes
    EveryMinutes(u32),
    /// Run every N hours
    EveryHours(u32),
    /// Run daily at specific time (hour, minute)
    DailyAt(u32, u32),
    /// Run at specific interval
    Interval(Duration),
}

impl ScheduleExpression {
    /// Calculate next occurrence from a given time
    pub fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleExpression::EverySeconds(s) => Some(from + Duration::seconds(*s as i64)),
            ScheduleExpression::EveryMinutes(m) => Some(from + Duration::minutes(*m as i64)),
            ScheduleExpression::EveryHours(h) => Some(from + Duration::hours(*h as i64)),
            ScheduleExpression::DailyAt(hour, minute) => {
                let today = from.date_naive();
                let time = chrono::NaiveTime::from_hms_opt(*hour, *minute, 0)?;
                let datetime = today.and_time(time);
                let datetime_utc = DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc);

                if datetime_utc > from {
                    Some(datetime_utc)
                } else {
                    Some(datetime_utc + Duration::days(1))
                }
            }
            ScheduleExpression::Interval(duration) => Some(from + *duration),
        }
    }

    /// Parse a persisted schedule string.
    ///
    /// Accepted forms: `every 30s`, `every 5m`, `every 2h`, `daily 02:30`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix("every ") {
            let rest = rest.trim();
            let (digits, unit) = rest.split_at(rest.len().saturating_sub(1));
            let n: u32 = digits
                .parse()
                .map_err(|_| format!("Invalid schedule interval: {}", s))?;
            if n == 0 {
                return Err(format!("Schedule interval must be positive: {}", s));
            }
            return match unit {
                "s" => Ok(ScheduleExpression::EverySeconds(n)),
                "m" => Ok(ScheduleExpression::EveryMinutes(n)),
                "h" => Ok(ScheduleExpression::EveryHours(n)),
                _ => Err(format!("Unknown schedule unit in: {}", s)),
            };
        }

        if let Some(rest) = s.strip_prefix("daily ") {
            let mut parts = rest.trim().split(':');
            let hour: u32 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("Invalid daily schedule: {}", s))?;
            let minute: u32 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("Invalid daily schedule: {}", s))?;
            if hour > 23 || minute > 59 || parts.next().is_some() {
                return Err(format!("Invalid daily schedule: {}", s));
            }
            return Ok(ScheduleExpression::DailyAt(hour, minute));
        }

        Err(format!("Unknown schedule expression: {}", s))
    }

    /// Natural refresh cadence for a candle period: retrieval for a period
    /// fires once per candle.
    pub fn for_period(period: CandlePeriod) -> Self {
        match period {
            CandlePeriod::OneSecond => ScheduleExpression::EverySeconds(1),
            CandlePeriod::FiveSeconds => ScheduleExpression::EverySeconds(5),
            CandlePeriod::TenSeconds => ScheduleExpression::EverySeconds(10),
            CandlePeriod::FifteenSeconds => ScheduleExpression::EverySeconds(15),
            CandlePeriod::ThirtySeconds => ScheduleExpression::EverySeconds(30),
            CandlePeriod::OneMinute => ScheduleExpression::EveryMinutes(1),
            CandlePeriod::FiveMinutes => ScheduleExpression::EveryMinutes(5),
            CandlePeriod::TenMinutes => ScheduleExpression::EveryMinutes(10),
            CandlePeriod::FifteenMinutes => ScheduleExpression::EveryMinutes(15),
            CandlePeriod::ThirtyMinutes => ScheduleExpression::EveryMinutes(30),
            CandlePeriod::OneHour => ScheduleExpression::EveryHours(1),
            CandlePeriod::ThreeHours => ScheduleExpression::EveryHours(3),
            CandlePeriod::SixHours => ScheduleExpression::EveryHours(6),
            CandlePeriod::TwelveHours => ScheduleExpression::EveryHours(12),
            CandlePeriod::OneDay => ScheduleExpression::DailyAt(0, 0),
            CandlePeriod::OneWeek => ScheduleExpression::Interval(Duration::weeks(1)),
            CandlePeriod::OneMonth => ScheduleExpression::Interval(Duration::days(30)),
        }
    }
}

/// Simple scheduler for recurring tasks
pub struct Scheduler {
    /// Schedules by name
    schedules: Arc<RwLock<HashMap<String, Schedule>>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a schedule
    pub fn add_schedule(&self, schedule: Schedule) {
        let name = schedule.name.clone();
        self.schedules.write().insert(name.clone(), schedule);
        debug!("Added schedule: {}", name);
    }

    /// Remove a schedule
    pub fn remove_schedule(&self, name: &str) -> bool {
        self.schedules.write().remove(name).is_some()
    }

    /// Enable a schedule
    pub fn enable(&self, name: &str) -> bool {
        if let Some(schedule) = self.schedules.write().get_mut(name) {
            schedule.enable();
            true
        } else {
            false
        }
    }

    /// Disable a schedule
    pub fn disable(&self, name: &str) -> bool {
        if let Some(schedule) = self.schedules.write().get_mut(name) {
            schedule.disable();
            true
        } else {
            false
        }
    }

    /// Get schedules that should run now
    pub fn due_schedules(&self) -> Vec<String> {
        self.schedules
            .read()
            .iter()
            .filter(|(_, s)| s.should_run())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Mark a schedule as run
    pub fn mark_run(&self, name: &str) {
        if let Some(schedule) = self.schedules.write().get_mut(name) {
            schedule.mark_run();
        }
    }

    /// List all schedules
    pub fn list_schedules(&self) -> Vec<Schedule> {
        self.schedules.read().values().cloned().collect()
    }

    /// Get a specific schedule
    pub fn get_schedule(&self, name: &str) -> Option<Schedule> {
        self.schedules.read().get(name).cloned()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
