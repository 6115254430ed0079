// Streak state machine - pure, no I/O, `now` always passed in
use chrono::{DateTime, NaiveDate, Utc};

/// How a check-in at `now` relates to the previous one, by UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckIn {
    First,
    SameDay,
    Consecutive,
    Broken,
}

pub fn classify(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CheckIn {
    let Some(last) = last else {
        return CheckIn::First;
    };

    let today = day_of(now);
    let last_day = day_of(last);

    // A clock that went backwards counts as today rather than a new day
    if last_day >= today {
        CheckIn::SameDay
    } else if last_day.succ_opt() == Some(today) {
        CheckIn::Consecutive
    } else {
        CheckIn::Broken
    }
}

pub fn day_of(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    pub current: i64,
    pub longest: i64,
    pub last_checked_in: Option<DateTime<Utc>>,
}

impl Streak {
    /// Apply one scoring event. The transition reads the previous
    /// `last_checked_in` before replacing it; a same-day event changes nothing.
    pub fn check_in(self, now: DateTime<Utc>) -> Self {
        match classify(self.last_checked_in, now) {
            CheckIn::SameDay => self,
            CheckIn::First | CheckIn::Broken => Self {
                current: 1,
                longest: self.longest.max(1),
                last_checked_in: Some(now),
            },
            CheckIn::Consecutive => {
                let current = self.current + 1;
                Self {
                    current,
                    longest: self.longest.max(current),
                    last_checked_in: Some(now),
                }
            }
        }
    }
}
