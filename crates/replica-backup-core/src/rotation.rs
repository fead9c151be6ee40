use std::path::PathBuf;
use time::{Duration, OffsetDateTime};

pub const ARCHIVE_EXT: &str = "zip";
pub const LAST_ARCHIVE: &str = "last.zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn folder(self, ts: OffsetDateTime) -> PathBuf {
        let yy = short_year(ts);
        let mm = month_number(ts);
        match self {
            Granularity::Hour => PathBuf::from(format!("{yy:02}/{mm:02}/{:02}", ts.day())),
            Granularity::Day => PathBuf::from(format!("{yy:02}/{mm:02}")),
            Granularity::Month => PathBuf::from(format!("{yy:02}")),
        }
    }

    pub fn leaf(self, ts: OffsetDateTime) -> PathBuf {
        let name = match self {
            Granularity::Hour => {
                format!("{:02}-{:02}.{ARCHIVE_EXT}", ts.hour(), ts.minute())
            }
            Granularity::Day => format!("{:02}-full.{ARCHIVE_EXT}", ts.day()),
            Granularity::Month => format!("full-{:02}.{ARCHIVE_EXT}", month_number(ts)),
        };
        self.folder(ts).join(name)
    }
}

pub fn is_day_rollover(ts: OffsetDateTime) -> bool {
    ts.hour() == 23
}

// Adding one day changes the month exactly on the last calendar day,
// leap years included.
pub fn is_month_rollover(ts: OffsetDateTime) -> bool {
    (ts + Duration::days(1)).month() != ts.month()
}

pub fn previous_day(ts: OffsetDateTime) -> OffsetDateTime {
    ts - Duration::days(1)
}

// Stepping back by the day-of-month lands on the last day of the
// previous month, whatever its length.
pub fn previous_month(ts: OffsetDateTime) -> OffsetDateTime {
    ts - Duration::days(i64::from(ts.day()))
}

fn short_year(ts: OffsetDateTime) -> i32 {
    ts.year().rem_euclid(100)
}

fn month_number(ts: OffsetDateTime) -> u8 {
    u8::from(ts.month())
}
