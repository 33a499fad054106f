use chrono::{DateTime, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta};

use crate::ast::ArithOp;
use crate::engine::atomic::{date_instant, time_instant};
use crate::runtime::{Error, ErrorCode};
use crate::xdm::AtomicValue;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Dec(f64),
    Dbl(f64),
}

impl Num {
    fn of(a: &AtomicValue) -> Option<Self> {
        match a {
            AtomicValue::Integer(i) => Some(Num::Int(*i)),
            AtomicValue::Decimal(d) => Some(Num::Dec(*d)),
            AtomicValue::Double(d) => Some(Num::Dbl(*d)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Dec(d) | Num::Dbl(d) => d,
        }
    }
}

fn div_by_zero(op: ArithOp) -> Error {
    Error::format(ErrorCode::FOAR0001, &[&op])
}

fn overflow(op: ArithOp) -> Error {
    Error::format(ErrorCode::FOAR0002, &[&op])
}

fn undefined(op: ArithOp, a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::format(
        ErrorCode::XPTY0004,
        &[&format!("operator {op} is not defined for {} and {}", a.type_name(), b.type_name())],
    )
}

fn integer_op(op: ArithOp, x: i64, y: i64) -> Result<AtomicValue, Error> {
    let checked = match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => {
            if y == 0 {
                return Err(div_by_zero(op));
            }
            return Ok(AtomicValue::Decimal(x as f64 / y as f64));
        }
        ArithOp::IDiv | ArithOp::Mod => {
            if y == 0 {
                return Err(div_by_zero(op));
            }
            if op == ArithOp::IDiv { x.checked_div(y) } else { x.checked_rem(y) }
        }
    };
    checked.map(AtomicValue::Integer).ok_or_else(|| overflow(op))
}

fn float_op(op: ArithOp, x: f64, y: f64, double: bool) -> Result<AtomicValue, Error> {
    let wrap = |v: f64| if double { AtomicValue::Double(v) } else { AtomicValue::Decimal(v) };
    match op {
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(div_by_zero(op));
            }
            let q = (x / y).trunc();
            if !q.is_finite() || q.abs() >= i64::MAX as f64 {
                return Err(overflow(op));
            }
            Ok(AtomicValue::Integer(q as i64))
        }
        ArithOp::Div | ArithOp::Mod if !double && y == 0.0 => Err(div_by_zero(op)),
        _ => {
            let v = match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                _ => x % y,
            };
            if !double && !v.is_finite() {
                return Err(overflow(op));
            }
            Ok(wrap(v))
        }
    }
}

fn numeric(op: ArithOp, x: Num, y: Num) -> Result<AtomicValue, Error> {
    match (x, y) {
        (Num::Int(a), Num::Int(b)) => integer_op(op, a, b),
        (Num::Dbl(_), _) | (_, Num::Dbl(_)) => float_op(op, x.as_f64(), y.as_f64(), true),
        _ => float_op(op, x.as_f64(), y.as_f64(), false),
    }
}

fn shift_months(dt: DateTime<FixedOffset>, months: i32) -> Option<DateTime<FixedOffset>> {
    let m = Months::new(months.unsigned_abs());
    if months >= 0 { dt.checked_add_months(m) } else { dt.checked_sub_months(m) }
}

fn shift_date_months(d: NaiveDate, months: i32) -> Option<NaiveDate> {
    let m = Months::new(months.unsigned_abs());
    if months >= 0 { d.checked_add_months(m) } else { d.checked_sub_months(m) }
}

fn scale(v: i64, factor: f64, op: ArithOp) -> Result<i64, Error> {
    let r = (v as f64 * factor).round();
    if !r.is_finite() || r.abs() >= i64::MAX as f64 {
        return Err(overflow(op));
    }
    Ok(r as i64)
}

/// Binary arithmetic over numerics, date/time values and durations.
/// Untyped operands must already be cast to xs:double.
pub fn arithmetic(op: ArithOp, a: &AtomicValue, b: &AtomicValue) -> Result<AtomicValue, Error> {
    use AtomicValue as V;
    if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
        return numeric(op, x, y);
    }
    let secs = |s: i64| TimeDelta::try_seconds(s).ok_or_else(|| overflow(op));
    let out = match (op, a, b) {
        // date/time +/- dayTimeDuration
        (ArithOp::Add | ArithOp::Sub, V::DateTime(dt), V::DayTimeDuration(s)) => {
            let d = secs(*s)?;
            let r = if op == ArithOp::Add { dt.checked_add_signed(d) } else { dt.checked_sub_signed(d) };
            V::DateTime(r.ok_or_else(|| overflow(op))?)
        }
        (ArithOp::Add, V::DayTimeDuration(_), V::DateTime(_)) => return arithmetic(op, b, a),
        (ArithOp::Add | ArithOp::Sub, V::Date { date, tz }, V::DayTimeDuration(s)) => {
            let d = secs(*s)?;
            let start = date.and_time(NaiveTime::MIN);
            let r = if op == ArithOp::Add { start.checked_add_signed(d) } else { start.checked_sub_signed(d) };
            V::Date { date: r.ok_or_else(|| overflow(op))?.date(), tz: *tz }
        }
        (ArithOp::Add, V::DayTimeDuration(_), V::Date { .. }) => return arithmetic(op, b, a),
        (ArithOp::Add | ArithOp::Sub, V::Time { time, tz }, V::DayTimeDuration(s)) => {
            let d = secs(*s)?;
            let (t, _) =
                if op == ArithOp::Add { time.overflowing_add_signed(d) } else { time.overflowing_sub_signed(d) };
            V::Time { time: t, tz: *tz }
        }
        (ArithOp::Add, V::DayTimeDuration(_), V::Time { .. }) => return arithmetic(op, b, a),
        // date/time +/- yearMonthDuration
        (ArithOp::Add | ArithOp::Sub, V::DateTime(dt), V::YearMonthDuration(m)) => {
            let m = if op == ArithOp::Add { Some(*m) } else { m.checked_neg() }.ok_or_else(|| overflow(op))?;
            V::DateTime(shift_months(*dt, m).ok_or_else(|| overflow(op))?)
        }
        (ArithOp::Add, V::YearMonthDuration(_), V::DateTime(_)) => return arithmetic(op, b, a),
        (ArithOp::Add | ArithOp::Sub, V::Date { date, tz }, V::YearMonthDuration(m)) => {
            let m = if op == ArithOp::Add { Some(*m) } else { m.checked_neg() }.ok_or_else(|| overflow(op))?;
            V::Date { date: shift_date_months(*date, m).ok_or_else(|| overflow(op))?, tz: *tz }
        }
        (ArithOp::Add, V::YearMonthDuration(_), V::Date { .. }) => return arithmetic(op, b, a),
        // differences
        (ArithOp::Sub, V::DateTime(x), V::DateTime(y)) => V::DayTimeDuration((*x - *y).num_seconds()),
        (ArithOp::Sub, V::Date { date: d1, tz: t1 }, V::Date { date: d2, tz: t2 }) => {
            match (date_instant(*d1, *t1), date_instant(*d2, *t2)) {
                (Some(x), Some(y)) => V::DayTimeDuration((x - y).num_seconds()),
                _ => return Err(overflow(op)),
            }
        }
        (ArithOp::Sub, V::Time { time: x, tz: t1 }, V::Time { time: y, tz: t2 }) => {
            match (time_instant(*x, *t1), time_instant(*y, *t2)) {
                (Some(x), Some(y)) => V::DayTimeDuration((x - y).num_seconds()),
                _ => return Err(overflow(op)),
            }
        }
        // durations
        (ArithOp::Add | ArithOp::Sub, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            let r = if op == ArithOp::Add { x.checked_add(*y) } else { x.checked_sub(*y) };
            V::YearMonthDuration(r.ok_or_else(|| overflow(op))?)
        }
        (ArithOp::Add | ArithOp::Sub, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            let r = if op == ArithOp::Add { x.checked_add(*y) } else { x.checked_sub(*y) };
            V::DayTimeDuration(r.ok_or_else(|| overflow(op))?)
        }
        (ArithOp::Mul | ArithOp::Div, V::YearMonthDuration(m), n) if n.is_numeric() => {
            let f = factor(op, n)?;
            let r = scale(i64::from(*m), f, op)?;
            V::YearMonthDuration(i32::try_from(r).map_err(|_| overflow(op))?)
        }
        (ArithOp::Mul | ArithOp::Div, V::DayTimeDuration(s), n) if n.is_numeric() => {
            V::DayTimeDuration(scale(*s, factor(op, n)?, op)?)
        }
        (ArithOp::Mul, n, V::YearMonthDuration(_) | V::DayTimeDuration(_)) if n.is_numeric() => {
            return arithmetic(op, b, a);
        }
        (ArithOp::Div, V::YearMonthDuration(x), V::YearMonthDuration(y)) => {
            if *y == 0 {
                return Err(div_by_zero(op));
            }
            V::Decimal(f64::from(*x) / f64::from(*y))
        }
        (ArithOp::Div, V::DayTimeDuration(x), V::DayTimeDuration(y)) => {
            if *y == 0 {
                return Err(div_by_zero(op));
            }
            V::Decimal(*x as f64 / *y as f64)
        }
        _ => return Err(undefined(op, a, b)),
    };
    Ok(out)
}

fn factor(op: ArithOp, n: &AtomicValue) -> Result<f64, Error> {
    let v = Num::of(n).map_or(f64::NAN, Num::as_f64);
    if v.is_nan() {
        return Err(overflow(op));
    }
    if op == ArithOp::Div {
        if v == 0.0 {
            return Err(div_by_zero(op));
        }
        return Ok(1.0 / v);
    }
    Ok(v)
}

/// Unary minus.
pub fn negate(a: &AtomicValue) -> Result<AtomicValue, Error> {
    Ok(match a {
        AtomicValue::Integer(i) => AtomicValue::Integer(i.checked_neg().ok_or_else(|| overflow(ArithOp::Sub))?),
        AtomicValue::Decimal(d) => AtomicValue::Decimal(-d),
        AtomicValue::Double(d) => AtomicValue::Double(-d),
        AtomicValue::YearMonthDuration(m) => {
            AtomicValue::YearMonthDuration(m.checked_neg().ok_or_else(|| overflow(ArithOp::Sub))?)
        }
        AtomicValue::DayTimeDuration(s) => {
            AtomicValue::DayTimeDuration(s.checked_neg().ok_or_else(|| overflow(ArithOp::Sub))?)
        }
        other => {
            return Err(Error::format(
                ErrorCode::XPTY0004,
                &[&format!("unary minus is not defined for {}", other.type_name())],
            ));
        }
    })
}
