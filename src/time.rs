use std::fmt;

use log::debug;
use ::time::{macros::format_description, OffsetDateTime};

/// Wall-clock instant, in the local offset when the platform can tell us it.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|e| {
            debug!("no local offset ({e}), using UTC");
            OffsetDateTime::now_utc()
        });

        Self(now)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .ok();

        match formatted {
            Some(s) => write!(fmt, "{}", s),
            None => write!(fmt, "{}", self.0.unix_timestamp()),
        }
    }
}
