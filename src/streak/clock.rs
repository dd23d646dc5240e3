//! Calendar-day arithmetic in the single reference timezone every user shares.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceClock {
    tz: Tz,
}

impl ReferenceClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Calendar date of `now` in the reference timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn yesterday(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.today(now);
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }

    /// First instant strictly after `now` at which the reference date changes.
    ///
    /// Zones that skip local midnight for DST resolve to the first valid instant of the
    /// new day. Returns `None` only at the end of the representable calendar.
    pub fn next_midnight(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let tomorrow = self.today(now).checked_add_days(Days::new(1))?;
        let local_midnight = tomorrow.and_time(NaiveTime::MIN);

        (0..=2)
            .map(|h| local_midnight + TimeDelta::hours(h))
            .find_map(|t| self.tz.from_local_datetime(&t).earliest())
            .map(|t| t.with_timezone(&Utc))
    }
}
