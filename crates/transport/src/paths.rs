//! Dated-directory and filename templates for the LDM feed.
//!
//! Both templates use single-letter tokens: `Y` (year, 4 digits), `M`
//! (month, 2), `D` (day, 2), `h` (hour, 2), `m` (minute, 2), `s` (second,
//! 2). Filenames additionally use `S` for a one-or-more-digit sequence
//! number, which may instead be the literal `E` marking end of volume. Any
//! other template character must match literally.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Sequence token embedded in a feed filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeqToken {
    Number(u32),
    /// The literal `E`: this file closes the active volume.
    EndOfVolume,
}

impl SeqToken {
    /// The sequence number this token occupies in the volume, given the
    /// previously consumed one. `E` follows whatever came before it.
    pub fn position_after(self, prev: Option<u32>) -> u32 {
        match self {
            Self::Number(n) => n,
            Self::EndOfVolume => prev.map_or(0, |p| p + 1),
        }
    }
}

/// Time and sequence parsed out of one feed filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub time: DateTime<Utc>,
    pub seq: SeqToken,
}

/// Dated subdirectory template (`Y`/`M`/`D`/`h` tokens).
#[derive(Debug, Clone)]
pub struct DirTemplate {
    spec: String,
}

impl DirTemplate {
    pub fn new(spec: impl Into<String>) -> Self {
        Self { spec: spec.into() }
    }

    /// Build the directory path fragment for a given time.
    pub fn format(&self, time: DateTime<Utc>) -> String {
        let mut out = String::with_capacity(self.spec.len() + 8);
        for ch in self.spec.chars() {
            match ch {
                'Y' => out.push_str(&time.format("%Y").to_string()),
                'M' => out.push_str(&time.format("%m").to_string()),
                'D' => out.push_str(&time.format("%d").to_string()),
                'h' => out.push_str(&time.format("%H").to_string()),
                other => out.push(other),
            }
        }
        out
    }
}

/// Feed filename template (`Y M D h m s` plus `S` sequence token).
#[derive(Debug, Clone)]
pub struct NameTemplate {
    spec: String,
}

impl NameTemplate {
    pub fn new(spec: impl Into<String>) -> Self {
        Self { spec: spec.into() }
    }

    /// Build a filename for a given time and sequence (used by tests and
    /// diagnostics; the feed itself produces the names we parse).
    pub fn format(&self, time: DateTime<Utc>, seq: SeqToken) -> String {
        let mut out = String::with_capacity(self.spec.len() + 12);
        for ch in self.spec.chars() {
            match ch {
                'Y' => out.push_str(&time.format("%Y").to_string()),
                'M' => out.push_str(&time.format("%m").to_string()),
                'D' => out.push_str(&time.format("%d").to_string()),
                'h' => out.push_str(&time.format("%H").to_string()),
                'm' => out.push_str(&time.format("%M").to_string()),
                's' => out.push_str(&time.format("%S").to_string()),
                'S' => match seq {
                    SeqToken::Number(n) => out.push_str(&n.to_string()),
                    SeqToken::EndOfVolume => out.push('E'),
                },
                other => out.push(other),
            }
        }
        out
    }

    /// Parse a filename's embedded time and sequence. Returns `None` for
    /// names that do not match the template (foreign files in the feed
    /// directory are expected and skipped).
    pub fn parse(&self, name: &str) -> Option<ParsedName> {
        let mut chars = name.chars().peekable();
        let mut year = 0i32;
        let mut month = 1u32;
        let mut day = 1u32;
        let (mut hour, mut minute, mut second) = (0u32, 0u32, 0u32);
        let mut seq = None;

        fn digits(chars: &mut std::iter::Peekable<std::str::Chars>, n: usize) -> Option<u32> {
            let mut val = 0u32;
            for _ in 0..n {
                let d = chars.next()?.to_digit(10)?;
                val = val * 10 + d;
            }
            Some(val)
        }

        for tok in self.spec.chars() {
            match tok {
                'Y' => year = digits(&mut chars, 4)? as i32,
                'M' => month = digits(&mut chars, 2)?,
                'D' => day = digits(&mut chars, 2)?,
                'h' => hour = digits(&mut chars, 2)?,
                'm' => minute = digits(&mut chars, 2)?,
                's' => second = digits(&mut chars, 2)?,
                'S' => {
                    if chars.peek() == Some(&'E') {
                        chars.next();
                        seq = Some(SeqToken::EndOfVolume);
                    } else {
                        let mut val: Option<u32> = None;
                        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                            chars.next();
                            val = Some(val.unwrap_or(0) * 10 + d);
                        }
                        seq = Some(SeqToken::Number(val?));
                    }
                }
                literal => {
                    if chars.next()? != literal {
                        return None;
                    }
                }
            }
        }
        if chars.next().is_some() {
            return None; // trailing junk
        }

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let naive = date.and_hms_opt(hour, minute, second)?;
        let time = Utc.from_utc_datetime(&naive);
        Some(ParsedName { time, seq: seq? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(spec: &str) -> NameTemplate {
        NameTemplate::new(spec)
    }

    #[test]
    fn test_parse_sequence_number() {
        let parsed = t("YMDhms.S").parse("20240115063000.12").unwrap();
        assert_eq!(parsed.seq, SeqToken::Number(12));
        assert_eq!(parsed.time.format("%Y%m%d%H%M%S").to_string(), "20240115063000");
    }

    #[test]
    fn test_parse_end_of_volume_literal() {
        let parsed = t("YMDhms.S").parse("20240115063000.E").unwrap();
        assert_eq!(parsed.seq, SeqToken::EndOfVolume);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(t("YMDhms.S").parse("README.txt").is_none());
        assert!(t("YMDhms.S").parse("20240115063000.").is_none());
        assert!(t("YMDhms.S").parse("20240115063000.5x").is_none());
        assert!(t("YMDhms.S").parse("20241315063000.5").is_none()); // month 13
    }

    #[test]
    fn test_format_parse_round_trip() {
        let tmpl = t("KTLX_YMD_hms.S");
        let time = Utc.with_ymd_and_hms(2024, 3, 7, 18, 42, 5).unwrap();
        let name = tmpl.format(time, SeqToken::Number(3));
        assert_eq!(name, "KTLX_20240307_184205.3");
        let parsed = tmpl.parse(&name).unwrap();
        assert_eq!(parsed.time, time);
        assert_eq!(parsed.seq, SeqToken::Number(3));
    }

    #[test]
    fn test_dir_template() {
        let tmpl = DirTemplate::new("Y/M/D/h");
        let time = Utc.with_ymd_and_hms(2024, 3, 7, 6, 0, 0).unwrap();
        assert_eq!(tmpl.format(time), "2024/03/07/06");
    }

    #[test]
    fn test_seq_token_ordering() {
        // Used when selecting the successor file within one timestamp.
        assert!(SeqToken::Number(0) < SeqToken::Number(1));
        assert!(SeqToken::Number(999) < SeqToken::EndOfVolume);
        assert_eq!(SeqToken::EndOfVolume.position_after(Some(1)), 2);
        assert_eq!(SeqToken::Number(4).position_after(Some(1)), 4);
    }
}
