//! Atomization, effective boolean value, casting of untyped data and
//! comparisons.

use core::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::ast::CompOp;
use crate::engine::cursor::Value;
use crate::model::XPathNavigator;
use crate::runtime::{Error, ErrorCode};
use crate::xdm::{AtomicValue, Item};

pub fn atomize<N: XPathNavigator>(v: Value<N>) -> Result<Vec<AtomicValue>, Error> {
    Ok(v.into_sequence()?.iter().map(Item::typed_value).collect())
}

/// Atomize a value that must hold at most one item.
pub fn atomize_optional<N: XPathNavigator>(v: Value<N>, what: &str) -> Result<Option<AtomicValue>, Error> {
    let mut items = v.take(2)?;
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.pop().map(|it| it.typed_value())),
        _ => Err(Error::format(ErrorCode::XPTY0004, &[&format!("{what} expects at most one item")])),
    }
}

fn atomic_ebv(a: &AtomicValue) -> Result<bool, Error> {
    match a {
        AtomicValue::Boolean(b) => Ok(*b),
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => Ok(!s.is_empty()),
        AtomicValue::Integer(i) => Ok(*i != 0),
        AtomicValue::Decimal(d) | AtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
        other => Err(Error::format(ErrorCode::FORG0006, &[&other.type_name()])),
    }
}

/// Effective boolean value. Only the first two items are inspected.
pub fn ebv<N: XPathNavigator>(v: Value<N>) -> Result<bool, Error> {
    let items = v.take(2)?;
    match items.as_slice() {
        [] => Ok(false),
        [Item::Node(_), ..] => Ok(true),
        [Item::Atomic(a)] => atomic_ebv(a),
        [Item::Atomic(_), _, ..] => Err(Error::format(ErrorCode::FORG0006, &[&"a sequence of two or more atomic values"])),
    }
}

/// Outcome of a predicate: a numeric result selects by position, anything
/// else by its effective boolean value.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateTruth {
    Position(f64),
    Boolean(bool),
}

impl PredicateTruth {
    pub fn from_value<N: XPathNavigator>(v: Value<N>) -> Result<Self, Error> {
        let items = v.take(2)?;
        match items.as_slice() {
            [Item::Atomic(AtomicValue::Integer(i))] => Ok(PredicateTruth::Position(*i as f64)),
            [Item::Atomic(AtomicValue::Decimal(d) | AtomicValue::Double(d))] => Ok(PredicateTruth::Position(*d)),
            [] => Ok(PredicateTruth::Boolean(false)),
            [Item::Node(_), ..] => Ok(PredicateTruth::Boolean(true)),
            [Item::Atomic(a)] => atomic_ebv(a).map(PredicateTruth::Boolean),
            [Item::Atomic(_), _, ..] => {
                Err(Error::format(ErrorCode::FORG0006, &[&"a sequence of two or more atomic values"]))
            }
        }
    }

    pub fn accepts(&self, position: usize) -> bool {
        match self {
            PredicateTruth::Position(p) => *p == position as f64,
            PredicateTruth::Boolean(b) => *b,
        }
    }
}

fn parse_double(s: &str) -> Option<f64> {
    match s.trim() {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t if t.eq_ignore_ascii_case("inf") || t.eq_ignore_ascii_case("infinity") || t.eq_ignore_ascii_case("nan") => {
            None
        }
        t => t.parse::<f64>().ok(),
    }
}

/// `fn:number` conversion: NaN when the value has no numeric reading.
pub fn to_double(a: &AtomicValue) -> f64 {
    match a {
        AtomicValue::Integer(i) => *i as f64,
        AtomicValue::Decimal(d) | AtomicValue::Double(d) => *d,
        AtomicValue::Boolean(b) => f64::from(u8::from(*b)),
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => parse_double(s).unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn parse_tz(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(rest) = s.strip_suffix('Z') {
        return Some((rest, FixedOffset::east_opt(0)));
    }
    if s.len() > 6 && s.is_char_boundary(s.len() - 6) {
        let (head, tail) = s.split_at(s.len() - 6);
        let b = tail.as_bytes();
        if (b[0] == b'+' || b[0] == b'-') && b[3] == b':' {
            let h: i32 = tail[1..3].parse().ok()?;
            let m: i32 = tail[4..6].parse().ok()?;
            let secs = (h * 3600 + m * 60) * if b[0] == b'-' { -1 } else { 1 };
            return Some((head, Some(FixedOffset::east_opt(secs)?)));
        }
    }
    Some((s, None))
}

fn parse_date_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let (body, tz) = parse_tz(s)?;
    let naive = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    let tz = tz.or_else(|| FixedOffset::east_opt(0))?;
    tz.from_local_datetime(&naive).single()
}

/// ISO 8601 duration (`-P1Y2M3DT4H5M6S`) as (months, seconds).
pub fn parse_duration(s: &str) -> Option<(i32, i64)> {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let s = s.strip_prefix('P')?;
    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return None,
        None => (s, None),
    };
    let mut months: i64 = 0;
    let mut secs: i64 = 0;
    let mut num = String::new();
    let mut any = false;
    for c in date_part.chars() {
        match c {
            '0'..='9' => num.push(c),
            'Y' | 'M' | 'D' => {
                let v: i64 = num.parse().ok()?;
                num.clear();
                any = true;
                match c {
                    'Y' => months = months.checked_add(v.checked_mul(12)?)?,
                    'M' => months = months.checked_add(v)?,
                    _ => secs = secs.checked_add(v.checked_mul(86_400)?)?,
                }
            }
            _ => return None,
        }
    }
    for c in time_part.unwrap_or("").chars() {
        match c {
            '0'..='9' | '.' => num.push(c),
            'H' | 'M' | 'S' => {
                any = true;
                if c == 'S' {
                    let v: f64 = num.parse().ok()?;
                    if !v.is_finite() || v >= i64::MAX as f64 {
                        return None;
                    }
                    secs = secs.checked_add(v.trunc() as i64)?;
                } else {
                    let v: i64 = num.parse().ok()?;
                    secs = secs.checked_add(v.checked_mul(if c == 'H' { 3600 } else { 60 })?)?;
                }
                num.clear();
            }
            _ => return None,
        }
    }
    if !any || !num.is_empty() {
        return None;
    }
    let months = i32::try_from(months).ok()?;
    if neg { Some((months.checked_neg()?, secs.checked_neg()?)) } else { Some((months, secs)) }
}

/// Cast an untyped value to the type of `like`.
pub fn cast_untyped(s: &str, like: &AtomicValue) -> Result<AtomicValue, Error> {
    let fail = || Error::format(ErrorCode::FORG0001, &[&s, &like.type_name()]);
    let t = s.trim();
    Ok(match like {
        AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
            AtomicValue::Double(parse_double(t).ok_or_else(fail)?)
        }
        AtomicValue::Boolean(_) => match t {
            "true" | "1" => AtomicValue::Boolean(true),
            "false" | "0" => AtomicValue::Boolean(false),
            _ => return Err(fail()),
        },
        AtomicValue::String(_) => AtomicValue::String(s.to_string()),
        AtomicValue::UntypedAtomic(_) => AtomicValue::UntypedAtomic(s.to_string()),
        AtomicValue::AnyUri(_) => AtomicValue::AnyUri(t.to_string()),
        AtomicValue::DateTime(_) => AtomicValue::DateTime(parse_date_time(t).ok_or_else(fail)?),
        AtomicValue::Date { .. } => {
            let (body, tz) = parse_tz(t).ok_or_else(fail)?;
            let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| fail())?;
            AtomicValue::Date { date, tz }
        }
        AtomicValue::Time { .. } => {
            let (body, tz) = parse_tz(t).ok_or_else(fail)?;
            let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f").map_err(|_| fail())?;
            AtomicValue::Time { time, tz }
        }
        AtomicValue::YearMonthDuration(_) => match parse_duration(t) {
            Some((m, 0)) => AtomicValue::YearMonthDuration(m),
            _ => return Err(fail()),
        },
        AtomicValue::DayTimeDuration(_) => match parse_duration(t) {
            Some((0, secs)) => AtomicValue::DayTimeDuration(secs),
            _ => return Err(fail()),
        },
        AtomicValue::QName { .. } => return Err(fail()),
    })
}

/// Instant of a date or time for ordering; values without a timezone are
/// taken as UTC.
pub(crate) fn date_instant(date: NaiveDate, tz: Option<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let tz = tz.or_else(|| FixedOffset::east_opt(0))?;
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN)).single()
}

pub(crate) fn time_instant(time: NaiveTime, tz: Option<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let tz = tz.or_else(|| FixedOffset::east_opt(0))?;
    let reference = NaiveDate::from_ymd_opt(1972, 12, 31)?;
    tz.from_local_datetime(&reference.and_time(time)).single()
}

enum Relation {
    /// `None` when unordered (NaN)
    Ordered(Option<Ordering>),
    EqualityOnly(bool),
}

fn is_stringy(a: &AtomicValue) -> Option<&str> {
    match a {
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => Some(s),
        _ => None,
    }
}

fn relate(a: &AtomicValue, b: &AtomicValue) -> Result<Relation, Error> {
    use AtomicValue as V;
    let rel = match (a, b) {
        (V::Integer(x), V::Integer(y)) => Relation::Ordered(Some(x.cmp(y))),
        (x, y) if x.is_numeric() && y.is_numeric() => Relation::Ordered(to_double(x).partial_cmp(&to_double(y))),
        (V::Boolean(x), V::Boolean(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::DateTime(x), V::DateTime(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::Date { date: d1, tz: t1 }, V::Date { date: d2, tz: t2 }) => {
            Relation::Ordered(date_instant(*d1, *t1).partial_cmp(&date_instant(*d2, *t2)))
        }
        (V::Time { time: x, tz: t1 }, V::Time { time: y, tz: t2 }) => {
            Relation::Ordered(time_instant(*x, *t1).partial_cmp(&time_instant(*y, *t2)))
        }
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::YearMonthDuration(m), V::DayTimeDuration(s)) | (V::DayTimeDuration(s), V::YearMonthDuration(m)) => {
            Relation::EqualityOnly(*m == 0 && *s == 0)
        }
        (V::QName { ns_uri: n1, local: l1, .. }, V::QName { ns_uri: n2, local: l2, .. }) => {
            Relation::EqualityOnly(n1 == n2 && l1 == l2)
        }
        (x, y) => match (is_stringy(x), is_stringy(y)) {
            (Some(s1), Some(s2)) => Relation::Ordered(Some(s1.cmp(s2))),
            _ => {
                return Err(Error::format(
                    ErrorCode::XPTY0004,
                    &[&format!("cannot compare {} with {}", x.type_name(), y.type_name())],
                ));
            }
        },
    };
    Ok(rel)
}

fn apply(op: CompOp, rel: Relation) -> Result<bool, Error> {
    match rel {
        Relation::Ordered(Some(o)) => Ok(match op {
            CompOp::Eq => o == Ordering::Equal,
            CompOp::Ne => o != Ordering::Equal,
            CompOp::Lt => o == Ordering::Less,
            CompOp::Le => o != Ordering::Greater,
            CompOp::Gt => o == Ordering::Greater,
            CompOp::Ge => o != Ordering::Less,
        }),
        Relation::Ordered(None) => Ok(op == CompOp::Ne),
        Relation::EqualityOnly(eq) => match op {
            CompOp::Eq => Ok(eq),
            CompOp::Ne => Ok(!eq),
            _ => Err(Error::format(ErrorCode::XPTY0004, &[&format!("operator {op} is not defined for these operands")])),
        },
    }
}

/// Value comparison (`eq`, `lt`, ...). Untyped operands compare as strings.
pub fn value_compare(op: CompOp, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
    apply(op, relate(a, b)?)
}

/// One pair of a general comparison (`=`, `<`, ...). An untyped operand is
/// cast to the other operand's type, to xs:double against numerics.
pub fn general_compare_pair(op: CompOp, a: &AtomicValue, b: &AtomicValue) -> Result<bool, Error> {
    match (a, b) {
        (AtomicValue::UntypedAtomic(_), AtomicValue::UntypedAtomic(_)) => value_compare(op, a, b),
        (AtomicValue::UntypedAtomic(s), other) => value_compare(op, &cast_untyped(s, other)?, other),
        (other, AtomicValue::UntypedAtomic(s)) => value_compare(op, other, &cast_untyped(s, other)?),
        _ => value_compare(op, a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_to_canonical_units() {
        assert_eq!(parse_duration("P1Y2M"), Some((14, 0)));
        assert_eq!(parse_duration("-PT1H30M"), Some((0, -5400)));
        assert_eq!(parse_duration("P1DT2S"), Some((0, 86_402)));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration("PT"), None);
    }

    #[test]
    fn oversized_durations_do_not_parse() {
        assert_eq!(parse_duration("P9223372036854775807Y"), None);
        assert_eq!(parse_duration("PT9223372036854775807H"), None);
        assert_eq!(parse_duration(&format!("PT{}S", "9".repeat(400))), None);
        assert_eq!(parse_duration("-P2147483647M"), Some((-i32::MAX, 0)));
    }

    #[test]
    fn nan_is_only_unequal() {
        let nan = AtomicValue::Double(f64::NAN);
        assert!(!value_compare(CompOp::Eq, &nan, &nan).unwrap());
        assert!(value_compare(CompOp::Ne, &nan, &nan).unwrap());
        assert!(!value_compare(CompOp::Lt, &nan, &AtomicValue::Integer(1)).unwrap());
    }

    #[test]
    fn untyped_is_cast_to_number_in_general_comparison() {
        let u = AtomicValue::UntypedAtomic("10".into());
        assert!(general_compare_pair(CompOp::Gt, &u, &AtomicValue::Integer(9)).unwrap());
        // as strings "10" < "9"
        assert!(value_compare(CompOp::Lt, &u, &AtomicValue::String("9".into())).unwrap());
        let bad = AtomicValue::UntypedAtomic("ten".into());
        let err = general_compare_pair(CompOp::Eq, &bad, &AtomicValue::Integer(1)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0001);
    }

    #[test]
    fn incomparable_types_raise_type_error() {
        let err = value_compare(CompOp::Eq, &AtomicValue::Boolean(true), &AtomicValue::Integer(1)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }
}
