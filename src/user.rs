use std::{fmt, str::FromStr};

use ::time::{macros::format_description, Date};
use log::error;
use serde::Serialize;

use crate::auth::PasswordHash;

::time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Calendar date, written `YYYY-MM-DD` both in storage and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DateOfBirth(#[serde(with = "iso_date")] Date);

macro_rules! iso_date_format {
    () => {
        format_description!("[year]-[month]-[day]")
    };
}

impl FromStr for DateOfBirth {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `[year]` alone would take a sign or extra digits
        if s.len() != 10 || !s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
            error!("invalid date \"{s}\": year must be four digits");
            return Err(());
        }

        Date::parse(s, iso_date_format!())
            .map(Self)
            .map_err(|e| {
                error!("invalid date \"{s}\": {e}");
            })
    }
}

impl fmt::Display for DateOfBirth {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.format(iso_date_format!()).map_err(|_| fmt::Error)?;
        write!(fmt, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: DateOfBirth,
    #[serde(skip)]
    pub pwhash: PasswordHash,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Explicit profile edit: `None` leaves the stored value alone.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<DateOfBirth>,
    pub pwhash: Option<PasswordHash>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.pwhash.is_none()
    }
}

/// Text we're willing to store: no line breaks or NULs, which would corrupt
/// line-oriented storage and log output.
pub fn is_storable(field: &str) -> bool {
    !field.contains(['\r', '\n', '\0'])
}
