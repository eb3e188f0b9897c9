//! Condition values
//!
//! The closed set of values a condition can produce, with the one comparator and the one
//! arithmetic table every operator goes through. `Kind` mirrors `Value` so the same table can
//! check operand kinds before evaluation.

use crate::error::ExpressionError;
use crate::rowset::{format_number, try_parse_number};
use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Calendar period: months and days, applied in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    pub months: i32,
    pub days: i32,
}

impl Period {
    pub fn new(months: i32, days: i32) -> Self {
        Self { months, days }
    }

    /// Approximate length in days, used only for ordering periods.
    fn approx_days(&self) -> i64 {
        self.months as i64 * 30 + self.days as i64
    }

    fn checked_neg(self) -> Option<Self> {
        Some(Self::new(self.months.checked_neg()?, self.days.checked_neg()?))
    }

    fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.months.checked_add(other.months)?,
            self.days.checked_add(other.days)?,
        ))
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.months.checked_sub(other.months)?,
            self.days.checked_sub(other.days)?,
        ))
    }

    fn checked_scale(self, factor: f64) -> Option<Self> {
        if factor.abs() > i32::MAX as f64 {
            return None;
        }
        let factor = factor as i32;
        Some(Self::new(
            self.months.checked_mul(factor)?,
            self.days.checked_mul(factor)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Instant(DateTime<Utc>),
    Date(NaiveDate),
    Duration(TimeDelta),
    Period(Period),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Bool,
    Number,
    Text,
    Date,
    Instant,
    Duration,
    Period,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "boolean",
            Kind::Number => "number",
            Kind::Text => "string",
            Kind::Date => "date",
            Kind::Instant => "instant",
            Kind::Duration => "duration",
            Kind::Period => "period",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Number(_) => Kind::Number,
            Value::Text(_) => Kind::Text,
            Value::Bool(_) => Kind::Bool,
            Value::Instant(_) => Kind::Instant,
            Value::Date(_) => Kind::Date,
            Value::Duration(_) => Kind::Duration,
            Value::Period(_) => Kind::Period,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Duration(d) => !d.is_zero(),
            Value::Period(p) => p.months != 0 || p.days != 0,
            Value::Instant(_) | Value::Date(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => try_parse_number(s),
            _ => None,
        }
    }

    /// Convert a row field into a condition value.
    pub fn from_json(value: &serde_json::Value, path: &str) -> Result<Self, ExpressionError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| ExpressionError::InvalidValue(format!("'{}' is not finite", path))),
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Null => Err(ExpressionError::InvalidValue(format!(
                "field '{}' is null",
                path
            ))),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(ExpressionError::InvalidValue(format!(
                    "field '{}' is not a scalar value",
                    path
                )))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Instant(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Duration(d) => write!(f, "{}s", d.num_seconds()),
            Value::Period(p) => write!(f, "P{}M{}D", p.months, p.days),
        }
    }
}

/// Parse text as a calendar date (`YYYY-MM-DD` or `MM/DD/YYYY`).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .ok()
}

/// Parse text as an instant: RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (UTC) or a bare date at midnight.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%m/%d/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    parse_date(text).map(midnight)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn add_period_to_date(date: NaiveDate, period: Period) -> Option<NaiveDate> {
    let shifted = if period.months >= 0 {
        date.checked_add_months(Months::new(period.months as u32))?
    } else {
        date.checked_sub_months(Months::new(period.months.unsigned_abs()))?
    };
    if period.days >= 0 {
        shifted.checked_add_days(Days::new(period.days as u64))
    } else {
        shifted.checked_sub_days(Days::new(period.days.unsigned_abs() as u64))
    }
}

fn add_period_to_instant(instant: DateTime<Utc>, period: Period) -> Option<DateTime<Utc>> {
    let date = add_period_to_date(instant.date_naive(), period)?;
    Some(date.and_time(instant.time()).and_utc())
}

/// Result kind of `left op right`, or `None` when the combination is not defined.
pub fn arithmetic_kind(op: ArithOp, left: Kind, right: Kind) -> Option<Kind> {
    use ArithOp::*;
    use Kind as K;
    match (op, left, right) {
        (_, K::Number, K::Number) => Some(K::Number),
        (Add, K::Text, K::Text | K::Number | K::Bool) | (Add, K::Number | K::Bool, K::Text) => {
            Some(K::Text)
        }

        (Add, K::Instant, K::Duration | K::Period) | (Add, K::Duration | K::Period, K::Instant) => {
            Some(K::Instant)
        }
        (Sub, K::Instant, K::Duration | K::Period) => Some(K::Instant),
        (Sub, K::Instant, K::Instant) => Some(K::Duration),

        (Add, K::Date, K::Period) | (Add, K::Period, K::Date) | (Sub, K::Date, K::Period) => {
            Some(K::Date)
        }
        (Add, K::Date, K::Duration) | (Sub, K::Date, K::Duration) => Some(K::Instant),
        (Sub, K::Date, K::Date) => Some(K::Period),

        (Add | Sub, K::Duration, K::Duration) => Some(K::Duration),
        (Mul, K::Duration, K::Number) | (Mul, K::Number, K::Duration) | (Div, K::Duration, K::Number) => {
            Some(K::Duration)
        }
        (Div, K::Duration, K::Duration) => Some(K::Number),

        (Add | Sub, K::Period, K::Period) => Some(K::Period),
        (Mul, K::Period, K::Number) | (Mul, K::Number, K::Period) => Some(K::Period),
        _ => None,
    }
}

/// Apply `left op right` following `arithmetic_kind`.
pub fn arithmetic(op: ArithOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    let mismatch = |l: &Value, r: &Value| ExpressionError::TypeMismatch {
        op: op.symbol().to_string(),
        left: l.kind().name(),
        right: r.kind().name(),
    };
    if arithmetic_kind(op, left.kind(), right.kind()).is_none() {
        return Err(mismatch(&left, &right));
    }
    let overflow = || ExpressionError::InvalidValue("temporal arithmetic overflow".to_string());

    use ArithOp::*;
    let result = match (op, left, right) {
        (op, Value::Number(a), Value::Number(b)) => Value::Number(match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => {
                if b == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                a / b
            }
            Rem => {
                if b == 0.0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                a % b
            }
        }),
        (Add, l @ (Value::Text(_) | Value::Number(_) | Value::Bool(_)), r) => {
            Value::Text(format!("{}{}", l, r))
        }

        (Add, Value::Instant(t), Value::Duration(d)) | (Add, Value::Duration(d), Value::Instant(t)) => {
            Value::Instant(t.checked_add_signed(d).ok_or_else(overflow)?)
        }
        (Sub, Value::Instant(t), Value::Duration(d)) => {
            Value::Instant(t.checked_sub_signed(d).ok_or_else(overflow)?)
        }
        (Add, Value::Instant(t), Value::Period(p)) | (Add, Value::Period(p), Value::Instant(t)) => {
            Value::Instant(add_period_to_instant(t, p).ok_or_else(overflow)?)
        }
        (Sub, Value::Instant(t), Value::Period(p)) => {
            Value::Instant(p.checked_neg().and_then(|p| add_period_to_instant(t, p)).ok_or_else(overflow)?)
        }
        (Sub, Value::Instant(a), Value::Instant(b)) => Value::Duration(a - b),

        (Add, Value::Date(d), Value::Period(p)) | (Add, Value::Period(p), Value::Date(d)) => {
            Value::Date(add_period_to_date(d, p).ok_or_else(overflow)?)
        }
        (Sub, Value::Date(d), Value::Period(p)) => {
            Value::Date(p.checked_neg().and_then(|p| add_period_to_date(d, p)).ok_or_else(overflow)?)
        }
        (Add, Value::Date(d), Value::Duration(delta)) => {
            Value::Instant(midnight(d).checked_add_signed(delta).ok_or_else(overflow)?)
        }
        (Sub, Value::Date(d), Value::Duration(delta)) => {
            Value::Instant(midnight(d).checked_sub_signed(delta).ok_or_else(overflow)?)
        }
        (Sub, Value::Date(a), Value::Date(b)) => {
            Value::Period(Period::new(0, (a - b).num_days() as i32))
        }

        (Add, Value::Duration(a), Value::Duration(b)) => {
            Value::Duration(a.checked_add(&b).ok_or_else(overflow)?)
        }
        (Sub, Value::Duration(a), Value::Duration(b)) => {
            Value::Duration(a.checked_sub(&b).ok_or_else(overflow)?)
        }
        (Mul, Value::Duration(d), Value::Number(n)) | (Mul, Value::Number(n), Value::Duration(d)) => {
            Value::Duration(scale_duration(d, n).ok_or_else(overflow)?)
        }
        (Div, Value::Duration(d), Value::Number(n)) => {
            if n == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            Value::Duration(scale_duration(d, 1.0 / n).ok_or_else(overflow)?)
        }
        (Div, Value::Duration(a), Value::Duration(b)) => {
            let denominator = b.num_milliseconds();
            if denominator == 0 {
                return Err(ExpressionError::DivisionByZero);
            }
            Value::Number(a.num_milliseconds() as f64 / denominator as f64)
        }

        (Add, Value::Period(a), Value::Period(b)) => {
            Value::Period(a.checked_add(b).ok_or_else(overflow)?)
        }
        (Sub, Value::Period(a), Value::Period(b)) => {
            Value::Period(a.checked_sub(b).ok_or_else(overflow)?)
        }
        (Mul, Value::Period(p), Value::Number(n)) | (Mul, Value::Number(n), Value::Period(p)) => {
            if n.fract() != 0.0 {
                return Err(ExpressionError::InvalidValue(format!(
                    "periods can only be scaled by whole numbers, got {}",
                    n
                )));
            }
            Value::Period(p.checked_scale(n).ok_or_else(overflow)?)
        }
        (_, l, r) => return Err(mismatch(&l, &r)),
    };
    Ok(result)
}

fn scale_duration(d: TimeDelta, factor: f64) -> Option<TimeDelta> {
    let millis = d.num_milliseconds() as f64 * factor;
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
}

/// Negation for `-x`.
pub fn negate(value: Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Number(n) => Ok(Value::Number(-n)),
        Value::Duration(d) => Ok(Value::Duration(-d)),
        Value::Period(p) => p.checked_neg().map(Value::Period).ok_or_else(|| {
            ExpressionError::InvalidValue("temporal arithmetic overflow".to_string())
        }),
        other => Err(ExpressionError::InvalidOperand {
            op: "-".to_string(),
            operand: other.kind().name(),
        }),
    }
}

/// The single ordering used by every relational and equality operator.
///
/// Same kinds compare naturally (temporals chronologically). Mixed pairs are coerced where one
/// side has an unambiguous reading of the other (numeric text, ISO date text, date vs instant,
/// boolean vs number); anything else orders by kind, then by text form.
pub fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Instant(a), Value::Instant(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
        (Value::Period(a), Value::Period(b)) => a.approx_days().cmp(&b.approx_days()),

        (Value::Instant(a), Value::Date(b)) => a.cmp(&midnight(*b)),
        (Value::Date(a), Value::Instant(b)) => midnight(*a).cmp(b),

        (Value::Number(_) | Value::Bool(_), Value::Text(_) | Value::Number(_) | Value::Bool(_))
        | (Value::Text(_), Value::Number(_) | Value::Bool(_)) => {
            match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => fallback(left, right),
            }
        }

        (Value::Date(a), Value::Text(s)) => match parse_date(s) {
            Some(b) => a.cmp(&b),
            None => fallback(left, right),
        },
        (Value::Text(s), Value::Date(b)) => match parse_date(s) {
            Some(a) => a.cmp(b),
            None => fallback(left, right),
        },
        (Value::Instant(a), Value::Text(s)) => match parse_instant(s) {
            Some(b) => a.cmp(&b),
            None => fallback(left, right),
        },
        (Value::Text(s), Value::Instant(b)) => match parse_instant(s) {
            Some(a) => a.cmp(b),
            None => fallback(left, right),
        },
        _ => fallback(left, right),
    }
}

fn fallback(left: &Value, right: &Value) -> Ordering {
    left.kind()
        .cmp(&right.kind())
        .then_with(|| left.to_string().cmp(&right.to_string()))
}
