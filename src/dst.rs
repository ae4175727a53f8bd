//! Daylight-saving rules in the compact `Mar lastSun @2` notation.

use std::str::FromStr;

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::Weekday;

use crate::Error;
use crate::Result;

/// How a rule picks the transition day within its month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DayRule {
    /// Last occurrence of the weekday, e.g. `lastSun`.
    Last(Weekday),
    /// First occurrence of the weekday on or after the day, e.g. `Sun>=8`.
    OnOrAfter(Weekday, u32),
    /// A fixed day of the month.
    Fixed(u32),
}

/// One DST transition rule: a month, a day selector and the local hour at
/// which the transition takes effect.
///
/// The textual form is `Month ("last"Weekday | Weekday">="Day | Day) [" @"Hour]`,
/// hour defaulting to 2. Examples: `Mar lastSun`, `Oct lastSun @3`,
/// `Mar Sun>=8 @2`, `Feb 23`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DstRule {
    month: u32,
    day: DayRule,
    hour: u32,
}

impl FromStr for DstRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::config_invalid(format!("invalid dst rule: {s:?}"));

        let (spec, hour) = match s.split_once(" @") {
            Some((spec, hour)) => {
                let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
                if hour > 23 {
                    return Err(invalid());
                }
                (spec, hour)
            }
            None => (s, 2),
        };

        let mut parts = spec.split_whitespace();
        let month = parts.next().and_then(parse_month).ok_or_else(invalid)?;
        let day_spec = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let day = if let Some(weekday) = day_spec.strip_prefix("last") {
            DayRule::Last(parse_weekday(weekday).ok_or_else(invalid)?)
        } else if let Some((weekday, day)) = day_spec.split_once(">=") {
            let weekday = parse_weekday(weekday).ok_or_else(invalid)?;
            let day: u32 = day.parse().map_err(|_| invalid())?;
            if !(1..=31).contains(&day) {
                return Err(invalid());
            }
            DayRule::OnOrAfter(weekday, day)
        } else {
            let day: u32 = day_spec.parse().map_err(|_| invalid())?;
            if !(1..=31).contains(&day) {
                return Err(invalid());
            }
            DayRule::Fixed(day)
        };

        Ok(DstRule { month, day, hour })
    }
}

impl DstRule {
    /// The transition instant in the given year, or `None` when the rule
    /// names a day the year does not have (e.g. `Feb 30`).
    pub fn transition(&self, year: i32) -> Option<NaiveDateTime> {
        let date = match self.day {
            DayRule::Fixed(day) => NaiveDate::from_ymd_opt(year, self.month, day)?,
            DayRule::OnOrAfter(weekday, day) => {
                let mut date = NaiveDate::from_ymd_opt(year, self.month, day)?;
                while date.weekday() != weekday {
                    date = date.succ_opt()?;
                    if date.month() != self.month {
                        return None;
                    }
                }
                date
            }
            DayRule::Last(weekday) => {
                let mut date = last_day_of_month(year, self.month)?;
                while date.weekday() != weekday {
                    date = date.pred_opt()?;
                }
                date
            }
        };
        date.and_hms_opt(self.hour, 0, 0)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}

fn parse_month(s: &str) -> Option<u32> {
    let month = match s {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    let weekday = match s {
        "Mon" => Weekday::Mon,
        "Tue" => Weekday::Tue,
        "Wed" => Weekday::Wed,
        "Thu" => Weekday::Thu,
        "Fri" => Weekday::Fri,
        "Sat" => Weekday::Sat,
        "Sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// A start rule, an end rule and the minutes of extra offset while daylight
/// saving is in effect.
///
/// When the start transition falls before the end transition within a year
/// the daylight window is `[start, end)`; when it falls after, the window
/// wraps the new year, which is how southern-hemisphere schedules read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DstSchedule {
    start: DstRule,
    end: DstRule,
    offset_minutes: i32,
}

impl DstSchedule {
    /// Parse both rules and build a schedule.
    pub fn new(start: &str, end: &str, offset_minutes: i32) -> Result<Self> {
        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
            offset_minutes,
        })
    }

    /// Minutes added to local time while daylight saving is in effect.
    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    /// Whether daylight saving is in effect at the given standard local time.
    ///
    /// The start instant is inside the window, the end instant is outside.
    /// A rule that produces no transition for the year disables DST for
    /// that year.
    pub fn is_daylight(&self, local: NaiveDateTime) -> bool {
        let year = local.year();
        let (start, end) = match (self.start.transition(year), self.end.transition(year)) {
            (Some(start), Some(end)) => (start, end),
            _ => return false,
        };

        if start <= end {
            start <= local && local < end
        } else {
            local >= start || local < end
        }
    }
}
