//! The `FOR` temporal clause grammar.
//!
//! ```text
//! FOR <date>
//! FOR DATES BETWEEN <date> AND <date>
//! FOR DATES IN <named-range>
//! ```
//!
//! Named ranges: TODAY, YESTERDAY, THIS_MONTH, LAST_MONTH, THIS_CYCLE,
//! PREVIOUS_CYCLE (cycles are calendar months). A relation with no clause
//! defaults to today.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::multispace0;
use nom::combinator::map;
use nom::sequence::delimited;
use nom::{IResult, Parser};

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TemporalRange {
    fn day(date: NaiveDate) -> Self {
        Self {
            start: start_of_day(date),
            end: end_of_day(date),
        }
    }

    fn span(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start_of_day(start),
            end: end_of_day(end),
        }
    }

    /// The default range when a relation has no FOR clause.
    pub fn today() -> Self {
        Self::day(Utc::now().date_naive())
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 0).unwrap_or_default()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Parse the text following the `FOR` keyword. The whole clause must be
/// consumed; trailing text means the clause was malformed.
pub fn parse_for_clause(clause: &str) -> Result<TemporalRange> {
    let today = Utc::now().date_naive();
    match for_clause(clause, today) {
        Ok((rest, range)) if rest.trim().is_empty() => Ok(range),
        _ => Err(EngineError::Sql(format!(
            "unable to interpret temporal clause 'FOR {}'",
            clause.trim()
        ))),
    }
}

fn for_clause(input: &str, today: NaiveDate) -> IResult<&str, TemporalRange> {
    let (input, _) = multispace0.parse(input)?;
    alt((
        dates_between,
        dates_in(today),
        named_range(today),
        map(date_literal, TemporalRange::day),
    ))
    .parse(input)
}

fn dates_between(input: &str) -> IResult<&str, TemporalRange> {
    let (input, _) = tag_no_case("DATES").parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = tag_no_case("BETWEEN").parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, start) = date_literal.parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = tag_no_case("AND").parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, end) = date_literal.parse(input)?;
    Ok((input, TemporalRange::span(start, end)))
}

fn dates_in(today: NaiveDate) -> impl FnMut(&str) -> IResult<&str, TemporalRange> {
    move |input: &str| {
        let (input, _) = tag_no_case("DATES").parse(input)?;
        let (input, _) = multispace0.parse(input)?;
        let (input, _) = tag_no_case("IN").parse(input)?;
        let (input, _) = multispace0.parse(input)?;
        named_range(today)(input)
    }
}

fn named_range(today: NaiveDate) -> impl FnMut(&str) -> IResult<&str, TemporalRange> {
    move |input: &str| {
        alt((
            map(tag_no_case("TODAY"), move |_| TemporalRange::day(today)),
            map(tag_no_case("YESTERDAY"), move |_| {
                TemporalRange::day(today - Duration::days(1))
            }),
            map(
                alt((tag_no_case("THIS_MONTH"), tag_no_case("THIS_CYCLE"))),
                move |_| TemporalRange::span(first_of_month(today), today),
            ),
            map(
                alt((tag_no_case("LAST_MONTH"), tag_no_case("PREVIOUS_CYCLE"))),
                move |_| {
                    let this_month_start = first_of_month(today);
                    let previous_month_end = this_month_start - Duration::days(1);
                    TemporalRange::span(first_of_month(previous_month_end), previous_month_end)
                },
            ),
        ))
        .parse(input)
    }
}

fn date_literal(input: &str) -> IResult<&str, NaiveDate> {
    let bare = take_while1(|c: char| c.is_ascii_digit() || c == '-');
    let quoted = delimited(
        tag("'"),
        take_while1(|c: char| c != '\''),
        tag("'"),
    );
    let (rest, text) = alt((quoted, bare)).parse(input)?;
    match NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        Ok(date) => Ok((rest, date)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("2024-02-29"; "bare date")]
    #[test_case("'2024-02-29'"; "quoted date")]
    fn test_single_date(clause: &str) {
        let range = parse_for_clause(clause).unwrap();
        assert_eq!(range.start.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(range.end.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(range.start.time(), chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_dates_between() {
        let range = parse_for_clause("DATES BETWEEN '2024-01-01' AND '2024-01-31'").unwrap();
        assert_eq!(range.start.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end.date(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn test_dates_in_today() {
        let range = parse_for_clause("DATES IN TODAY").unwrap();
        assert_eq!(range.start.date(), Utc::now().date_naive());
    }

    #[test]
    fn test_dates_in_last_month_spans_whole_month() {
        let range = parse_for_clause("DATES IN LAST_MONTH").unwrap();
        assert_eq!(range.start.day(), 1);
        assert!(range.start < range.end);
        // the range ends on the last day of the previous month
        let next_day = range.end.date() + Duration::days(1);
        assert_eq!(next_day.day(), 1);
    }

    #[test_case("DATES BETWEEN '2024-01-01'"; "incomplete between")]
    #[test_case("SOMETIME"; "unknown named range")]
    #[test_case("2024-13-01"; "invalid month")]
    fn test_malformed_clauses(clause: &str) {
        assert!(parse_for_clause(clause).is_err());
    }

    #[test]
    fn test_cycles_alias_months() {
        let this_cycle = parse_for_clause("DATES IN THIS_CYCLE").unwrap();
        let this_month = parse_for_clause("DATES IN THIS_MONTH").unwrap();
        assert_eq!(this_cycle, this_month);
    }
}
