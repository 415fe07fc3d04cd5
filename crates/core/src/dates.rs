use crate::error::ExtractError;
use crate::models::NormalizedDate;
use chrono::NaiveDate;
use regex::{Captures, Regex};

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

#[derive(Debug, Clone, Copy)]
enum DateShape {
    MonthDayYear,
    MonthDayShortYear,
    YearMonthDay,
    MonthNameDayYear,
    DayMonthNameYear,
}

pub struct DateNormalizer {
    patterns: Vec<(Regex, DateShape)>,
}

impl DateNormalizer {
    pub fn new() -> Result<Self, ExtractError> {
        let patterns = vec![
            (
                Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b")?,
                DateShape::MonthDayYear,
            ),
            (
                Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2})\b")?,
                DateShape::MonthDayShortYear,
            ),
            (
                Regex::new(r"\b(\d{4})[/-](\d{1,2})[/-](\d{1,2})\b")?,
                DateShape::YearMonthDay,
            ),
            (
                Regex::new(&format!(r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b"))?,
                DateShape::MonthNameDayYear,
            ),
            (
                Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+({MONTHS})\.?,?\s+(\d{{4}})\b"))?,
                DateShape::DayMonthNameYear,
            ),
        ];

        Ok(Self { patterns })
    }

    /// Never fails: when nothing parses, `iso` is `None` and the trimmed input
    /// is kept as `raw`.
    pub fn parse(&self, raw_date: &str) -> NormalizedDate {
        let raw = raw_date.trim().to_string();

        let iso = self.patterns.iter().find_map(|(pattern, shape)| {
            pattern
                .captures(&raw)
                .and_then(|captures| to_calendar_date(&captures, *shape))
                .map(|date| date.format("%Y-%m-%d").to_string())
        });

        NormalizedDate { raw, iso }
    }
}

fn to_calendar_date(captures: &Captures<'_>, shape: DateShape) -> Option<NaiveDate> {
    let number = |index: usize| captures.get(index)?.as_str().parse::<u32>().ok();
    let text = |index: usize| captures.get(index).map(|m| m.as_str());

    let (year, month, day) = match shape {
        DateShape::MonthDayYear => (number(3)? as i32, number(1)?, number(2)?),
        DateShape::MonthDayShortYear => (expand_two_digit_year(number(3)?), number(1)?, number(2)?),
        DateShape::YearMonthDay => (number(1)? as i32, number(2)?, number(3)?),
        DateShape::MonthNameDayYear => (number(3)? as i32, month_number(text(1)?)?, number(2)?),
        DateShape::DayMonthNameYear => (number(3)? as i32, month_number(text(2)?)?, number(1)?),
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// POSIX `%y` window: 00-68 is 2000-2068, 69-99 is 1969-1999.
pub fn expand_two_digit_year(year: u32) -> i32 {
    if year <= 68 {
        2000 + year as i32
    } else {
        1900 + year as i32
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    let month = match lowered.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
