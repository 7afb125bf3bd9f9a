use std::fmt::{self, Display, Formatter};

use atoi::FromRadix10Checked;
use bytes::Buf;

use crate::error::BoxDynError;

/// A `DATE` value. MySQL accepts years 1000 through 9999, and the all-zero date
/// `0000-00-00` when `NO_ZERO_DATE` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MySqlDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// A `DATETIME` or `TIMESTAMP` value, with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MySqlDateTime {
    pub date: MySqlDate,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

/// A `TIME` value. Unlike a time of day it is a signed interval of up to 838 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MySqlTime {
    pub negative: bool,
    pub hours: u32,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

impl MySqlDate {
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, BoxDynError> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(format!("invalid date {year:04}-{month:02}-{day:02}").into());
        }

        Ok(Self { year, month, day })
    }

    fn is_zero(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }

    // https://mariadb.com/kb/en/resultset-row/#date-binary-encoding
    pub(crate) fn encode_binary(&self, buf: &mut Vec<u8>) {
        if self.is_zero() {
            buf.push(0);
            return;
        }

        buf.push(4);
        self.encode_date_part(buf);
    }

    fn encode_date_part(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.year.to_le_bytes());
        buf.push(self.month);
        buf.push(self.day);
    }

    /// Decodes a binary protocol value, length byte included. The zero date decodes as `None`.
    pub(crate) fn decode_binary(buf: &[u8]) -> Result<Option<Self>, BoxDynError> {
        Ok(MySqlDateTime::decode_binary(buf)?.map(|dt| dt.date))
    }

    /// Parses `YYYY-MM-DD`. The zero date parses as `None`.
    pub(crate) fn parse(s: &str) -> Result<Option<Self>, BoxDynError> {
        let b = s.as_bytes();

        if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
            return Err(format!("expected a date as YYYY-MM-DD, got {s:?}").into());
        }

        let date = MySqlDate {
            year: parse_digits(&b[0..4], s)?,
            month: parse_digits(&b[5..7], s)?,
            day: parse_digits(&b[8..10], s)?,
        };

        if date.is_zero() {
            return Ok(None);
        }

        Self::new(date.year, date.month, date.day).map(Some)
    }
}

impl MySqlDateTime {
    pub fn new(date: MySqlDate, hour: u8, minute: u8, second: u8, microsecond: u32) -> Self {
        Self {
            date,
            hour,
            minute,
            second,
            microsecond,
        }
    }

    pub(crate) fn encode_binary(&self, buf: &mut Vec<u8>) {
        if self.date.is_zero() && self.has_no_time() {
            buf.push(0);
            return;
        }

        // to save space the packet can be compressed:
        let len = match (self.has_no_time(), self.microsecond) {
            // if hour, minutes, seconds and micro_seconds are all 0,
            // length is 4 and no other field is sent
            (true, _) => 4,
            // if micro_seconds is 0, length is 7
            // and micro_seconds is not sent
            (false, 0) => 7,
            // otherwise length is 11
            (false, _) => 11,
        };

        buf.push(len);
        self.date.encode_date_part(buf);

        if len > 4 {
            buf.push(self.hour);
            buf.push(self.minute);
            buf.push(self.second);
        }

        if len > 7 {
            buf.extend_from_slice(&self.microsecond.to_le_bytes());
        }
    }

    fn has_no_time(&self) -> bool {
        self.hour == 0 && self.minute == 0 && self.second == 0 && self.microsecond == 0
    }

    // https://mariadb.com/kb/en/resultset-row/#timestamp-binary-encoding
    pub(crate) fn decode_binary(mut buf: &[u8]) -> Result<Option<Self>, BoxDynError> {
        // Row decoding leaves the length byte on the front.
        if buf.is_empty() {
            return Err("empty buffer".into());
        }

        let len = usize::from(buf.get_u8());

        if buf.len() < len {
            return Err(format!("temporal value declares {len} bytes, got {}", buf.len()).into());
        }

        if len == 0 {
            // zero buffer means a zero date
            return Ok(None);
        }

        if len < 4 {
            return Err(format!("invalid length {len} for a date").into());
        }

        let date = MySqlDate {
            year: buf.get_u16_le(),
            month: buf.get_u8(),
            day: buf.get_u8(),
        };

        let mut dt = MySqlDateTime::new(date, 0, 0, 0, 0);

        if len >= 7 {
            dt.hour = buf.get_u8();
            dt.minute = buf.get_u8();
            dt.second = buf.get_u8();
        }

        if len >= 11 {
            dt.microsecond = buf.get_u32_le();
        }

        Ok(Some(dt))
    }

    /// Parses `YYYY-MM-DD HH:MM:SS[.ffffff]`. The zero date parses as `None`.
    pub(crate) fn parse(s: &str) -> Result<Option<Self>, BoxDynError> {
        let (date, time) = s.split_once(' ').unwrap_or((s, "00:00:00"));

        let time = MySqlTime::parse(time)?;
        if time.negative || time.hours > 23 {
            return Err(format!("invalid time of day in {s:?}").into());
        }

        let Some(date) = MySqlDate::parse(date)? else {
            return Ok(None);
        };

        Ok(Some(MySqlDateTime::new(
            date,
            u8::try_from(time.hours)?,
            time.minutes,
            time.seconds,
            time.microseconds,
        )))
    }
}

impl MySqlTime {
    pub(crate) fn encode_binary(&self, buf: &mut Vec<u8>) {
        if *self == MySqlTime::default() {
            buf.push(0);
            return;
        }

        let len: u8 = if self.microseconds == 0 { 8 } else { 12 };

        buf.push(len);
        buf.push(u8::from(self.negative));
        buf.extend_from_slice(&(self.hours / 24).to_le_bytes());

        // `hours % 24` always fits
        buf.push(u8::try_from(self.hours % 24).unwrap_or_default());
        buf.push(self.minutes);
        buf.push(self.seconds);

        if len > 8 {
            buf.extend_from_slice(&self.microseconds.to_le_bytes());
        }
    }

    // https://mariadb.com/kb/en/resultset-row/#time-binary-encoding
    pub(crate) fn decode_binary(mut buf: &[u8]) -> Result<Self, BoxDynError> {
        if buf.is_empty() {
            return Err("empty buffer".into());
        }

        let len = usize::from(buf.get_u8());

        if len == 0 {
            return Ok(MySqlTime::default());
        }

        if len < 8 || buf.len() < len {
            return Err(format!("invalid length {len} for a time").into());
        }

        let negative = buf.get_u8() == 1;
        let days = buf.get_u32_le();
        let hours = buf.get_u8();
        let minutes = buf.get_u8();
        let seconds = buf.get_u8();

        let microseconds = if len >= 12 { buf.get_u32_le() } else { 0 };

        Ok(MySqlTime {
            negative,
            hours: days * 24 + u32::from(hours),
            minutes,
            seconds,
            microseconds,
        })
    }

    /// Parses `[-]H+:MM:SS[.ffffff]`.
    pub(crate) fn parse(s: &str) -> Result<Self, BoxDynError> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (clock, fraction) = rest.split_once('.').unwrap_or((rest, ""));

        let mut parts = clock.splitn(3, ':');
        let (Some(hours), Some(minutes), Some(seconds)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected a time as HH:MM:SS, got {s:?}").into());
        };

        if minutes.len() != 2 || seconds.len() != 2 || fraction.len() > 6 {
            return Err(format!("expected a time as HH:MM:SS, got {s:?}").into());
        }

        let microseconds = if fraction.is_empty() {
            0
        } else {
            // ".5" is half a second
            let digits: u32 = parse_digits(fraction.as_bytes(), s)?;
            let scale = 10_u32.pow(6 - u32::try_from(fraction.len())?);

            digits * scale
        };

        Ok(MySqlTime {
            negative,
            hours: parse_digits(hours.as_bytes(), s)?,
            minutes: parse_digits(minutes.as_bytes(), s)?,
            seconds: parse_digits(seconds.as_bytes(), s)?,
            microseconds,
        })
    }
}

fn parse_digits<T: FromRadix10Checked>(digits: &[u8], whole: &str) -> Result<T, BoxDynError> {
    match T::from_radix_10_checked(digits) {
        (Some(v), used) if used > 0 && used == digits.len() => Ok(v),
        _ => Err(format!("invalid temporal value {whole:?}").into()),
    }
}

impl Display for MySqlDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Display for MySqlDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}:{:02}",
            self.date, self.hour, self.minute, self.second
        )?;

        if self.microsecond != 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }

        Ok(())
    }
}

impl Display for MySqlTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }

        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;

        if self.microseconds != 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_text_dates() {
        assert_eq!(
            MySqlDate::parse("2024-03-15").unwrap(),
            Some(MySqlDate { year: 2024, month: 3, day: 15 })
        );
        assert_eq!(MySqlDate::parse("0000-00-00").unwrap(), None);
        assert!(MySqlDate::parse("2024-13-01").is_err());
        assert!(MySqlDate::parse("2024/03/15").is_err());
    }

    #[test]
    fn it_parses_text_datetimes_with_fractions() {
        let dt = MySqlDateTime::parse("2019-12-31 23:59:58.5").unwrap().unwrap();

        assert_eq!(dt.date.year, 2019);
        assert_eq!((dt.hour, dt.minute, dt.second), (23, 59, 58));
        assert_eq!(dt.microsecond, 500_000);
        assert_eq!(dt.to_string(), "2019-12-31 23:59:58.500000");

        assert_eq!(MySqlDateTime::parse("0000-00-00 00:00:00").unwrap(), None);
    }

    #[test]
    fn it_parses_negative_intervals() {
        let t = MySqlTime::parse("-838:59:59.000001").unwrap();

        assert!(t.negative);
        assert_eq!(t.hours, 838);
        assert_eq!(t.microseconds, 1);
        assert_eq!(t.to_string(), "-838:59:59.000001");
    }

    #[test]
    fn it_compresses_binary_datetimes() {
        let date = MySqlDate::new(2024, 3, 15).unwrap();

        let mut buf = Vec::new();
        MySqlDateTime::new(date, 0, 0, 0, 0).encode_binary(&mut buf);
        assert_eq!(buf, b"\x04\xe8\x07\x03\x0f");

        buf.clear();
        MySqlDateTime::new(date, 10, 20, 30, 0).encode_binary(&mut buf);
        assert_eq!(buf, b"\x07\xe8\x07\x03\x0f\x0a\x14\x1e");

        buf.clear();
        MySqlDateTime::new(date, 10, 20, 30, 7).encode_binary(&mut buf);
        assert_eq!(buf.len(), 12);
        assert_eq!(
            MySqlDateTime::decode_binary(&buf).unwrap(),
            Some(MySqlDateTime::new(date, 10, 20, 30, 7))
        );
    }

    #[test]
    fn it_spreads_binary_times_over_days() {
        let time = MySqlTime {
            negative: true,
            hours: 50,
            minutes: 1,
            seconds: 2,
            microseconds: 0,
        };

        let mut buf = Vec::new();
        time.encode_binary(&mut buf);

        assert_eq!(buf, b"\x08\x01\x02\x00\x00\x00\x02\x01\x02");
        assert_eq!(MySqlTime::decode_binary(&buf).unwrap(), time);
        assert_eq!(MySqlTime::decode_binary(b"\x00").unwrap(), MySqlTime::default());
    }

    #[test]
    fn it_decodes_the_zero_date_as_none() {
        assert_eq!(MySqlDate::decode_binary(b"\x00").unwrap(), None);
        assert!(MySqlDate::decode_binary(b"").is_err());
    }
}
