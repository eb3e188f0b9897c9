//! Condition evaluation against a feed row, builtin functions and static kind checking.

use super::parser::{CompareOp, Expr, LogicalOp, UnaryOp};
use super::value::{arithmetic, arithmetic_kind, compare, negate, parse_date, parse_instant};
use super::value::{Kind, Period, Value};
use crate::error::ExpressionError;
use crate::rowset::Row;
use chrono::{DateTime, TimeDelta, Utc};
use std::cmp::Ordering;

/// Builtin signature: (min args, max args, result kind when statically known).
fn signature(name: &str) -> Option<(usize, usize, Option<Kind>)> {
    let sig = match name {
        "now" => (0, 0, Some(Kind::Instant)),
        "today" => (0, 0, Some(Kind::Date)),
        "date" => (1, 1, Some(Kind::Date)),
        "datetime" => (1, 1, Some(Kind::Instant)),
        "hours" | "minutes" | "seconds" => (1, 1, Some(Kind::Duration)),
        "days" | "weeks" | "months" | "years" => (1, 1, Some(Kind::Period)),
        "number" => (1, 1, Some(Kind::Number)),
        "text" => (1, 1, Some(Kind::Text)),
        "abs" => (1, 1, None),
        "round" => (1, 2, Some(Kind::Number)),
        "min" | "max" => (1, usize::MAX, None),
        _ => return None,
    };
    Some(sig)
}

fn check_arity(name: &str, got: usize) -> Result<Option<Kind>, ExpressionError> {
    let (min, max, kind) =
        signature(name).ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
    if got < min || got > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ExpressionError::Arity {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(kind)
}

/// Statically infer the kind of an expression; `None` when it depends on row data.
///
/// Rejects unknown functions, wrong arities and operator/kind combinations the arithmetic table
/// does not define, so those surface when a rule is validated rather than when it first runs.
pub fn infer_kind(expr: &Expr) -> Result<Option<Kind>, ExpressionError> {
    match expr {
        Expr::Number(_) => Ok(Some(Kind::Number)),
        Expr::Text(_) => Ok(Some(Kind::Text)),
        Expr::Bool(_) => Ok(Some(Kind::Bool)),
        Expr::Field(_) => Ok(None),
        Expr::Index(base, index) => {
            infer_kind(base)?;
            infer_kind(index)?;
            Ok(None)
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            infer_kind(operand)?;
            Ok(Some(Kind::Bool))
        }
        Expr::Unary(UnaryOp::Neg, operand) => match infer_kind(operand)? {
            Some(kind @ (Kind::Number | Kind::Duration | Kind::Period)) => Ok(Some(kind)),
            Some(other) => Err(ExpressionError::InvalidOperand {
                op: "-".to_string(),
                operand: other.name(),
            }),
            None => Ok(None),
        },
        Expr::Arith(op, left, right) => match (infer_kind(left)?, infer_kind(right)?) {
            (Some(l), Some(r)) => arithmetic_kind(*op, l, r).map(Some).ok_or_else(|| {
                ExpressionError::TypeMismatch {
                    op: op.symbol().to_string(),
                    left: l.name(),
                    right: r.name(),
                }
            }),
            _ => Ok(None),
        },
        Expr::Compare(_, left, right) | Expr::Logical(_, left, right) => {
            infer_kind(left)?;
            infer_kind(right)?;
            Ok(Some(Kind::Bool))
        }
        Expr::Call(name, args) => {
            let kind = check_arity(name, args.len())?;
            let mut arg_kinds = Vec::with_capacity(args.len());
            for arg in args {
                arg_kinds.push(infer_kind(arg)?);
            }
            match name.as_str() {
                "abs" | "min" | "max" => Ok(arg_kinds.into_iter().flatten().next()),
                _ => Ok(kind),
            }
        }
    }
}

/// Evaluates compiled conditions against one row.
pub struct Evaluation<'a> {
    row: &'a Row,
    now: DateTime<Utc>,
}

impl<'a> Evaluation<'a> {
    pub fn new(row: &'a Row, now: DateTime<Utc>) -> Self {
        Self { row, now }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Field(_) | Expr::Index(_, _) => {
                let (json, path) = self.resolve(expr)?;
                Value::from_json(json, &path)
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::Unary(UnaryOp::Neg, operand) => negate(self.eval(operand)?),
            Expr::Arith(op, left, right) => arithmetic(*op, self.eval(left)?, self.eval(right)?),
            Expr::Compare(op, left, right) => {
                let ordering = compare(&self.eval(left)?, &self.eval(right)?);
                Ok(Value::Bool(match op {
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Le => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Ge => ordering != Ordering::Less,
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::Ne => ordering != Ordering::Equal,
                }))
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?.is_truthy();
                let result = match op {
                    LogicalOp::And => left && self.eval(right)?.is_truthy(),
                    LogicalOp::Or => left || self.eval(right)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            }
            Expr::Call(name, args) => {
                check_arity(name, args.len())?;
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, values)
            }
        }
    }

    /// Resolve a field path or index chain to the underlying row value.
    fn resolve(&self, expr: &Expr) -> Result<(&'a serde_json::Value, String), ExpressionError> {
        match expr {
            Expr::Field(path) => {
                let value = lookup_path(self.row, path)
                    .ok_or_else(|| ExpressionError::UndefinedSymbol(path.join(".")))?;
                Ok((value, path.join(".")))
            }
            Expr::Index(base, index) => {
                let (container, path) = self.resolve(base)?;
                let position = match self.eval(index)? {
                    Value::Number(n) if n.fract() == 0.0 => n as i64,
                    other => {
                        return Err(ExpressionError::InvalidValue(format!(
                            "index into '{}' must be a whole number, got {}",
                            path, other
                        )))
                    }
                };
                let items = container.as_array().ok_or_else(|| {
                    ExpressionError::InvalidValue(format!("'{}' is not a list", path))
                })?;
                let item = usize::try_from(position - 1)
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| ExpressionError::IndexOutOfRange {
                        path: path.clone(),
                        index: position,
                        len: items.len(),
                    })?;
                Ok((item, format!("{}[{}]", path, position)))
            }
            other => Err(ExpressionError::InvalidValue(format!(
                "{:?} cannot be indexed",
                other
            ))),
        }
    }

    fn call(&self, name: &str, mut args: Vec<Value>) -> Result<Value, ExpressionError> {
        let number = |value: &Value| {
            value.as_number().ok_or_else(|| ExpressionError::InvalidOperand {
                op: name.to_string(),
                operand: value.kind().name(),
            })
        };
        let whole = |value: &Value| -> Result<i32, ExpressionError> {
            let n = number(value)?;
            if n.fract() != 0.0 || n.abs() > i32::MAX as f64 {
                return Err(ExpressionError::InvalidValue(format!(
                    "{}() expects a whole number, got {}",
                    name, value
                )));
            }
            Ok(n as i32)
        };
        let scaled = |value: &Value, unit: i32| -> Result<i32, ExpressionError> {
            whole(value)?
                .checked_mul(unit)
                .ok_or_else(|| ExpressionError::InvalidValue(format!("{}() overflow", name)))
        };
        let seconds = |value: &Value, unit: f64| -> Result<Value, ExpressionError> {
            let millis = number(value)? * unit * 1000.0;
            TimeDelta::try_milliseconds(millis.round() as i64)
                .map(Value::Duration)
                .ok_or_else(|| ExpressionError::InvalidValue(format!("{}() overflow", name)))
        };

        match name {
            "now" => Ok(Value::Instant(self.now)),
            "today" => Ok(Value::Date(self.now.date_naive())),
            "date" => match &args[0] {
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::Instant(t) => Ok(Value::Date(t.date_naive())),
                Value::Text(s) => parse_date(s)
                    .or_else(|| parse_instant(s).map(|t| t.date_naive()))
                    .map(Value::Date)
                    .ok_or_else(|| ExpressionError::InvalidValue(format!("'{}' is not a date", s))),
                other => Err(ExpressionError::InvalidOperand {
                    op: name.to_string(),
                    operand: other.kind().name(),
                }),
            },
            "datetime" => match &args[0] {
                Value::Instant(t) => Ok(Value::Instant(*t)),
                Value::Text(s) => parse_instant(s).map(Value::Instant).ok_or_else(|| {
                    ExpressionError::InvalidValue(format!("'{}' is not a date-time", s))
                }),
                other => Err(ExpressionError::InvalidOperand {
                    op: name.to_string(),
                    operand: other.kind().name(),
                }),
            },
            "hours" => seconds(&args[0], 3600.0),
            "minutes" => seconds(&args[0], 60.0),
            "seconds" => seconds(&args[0], 1.0),
            "days" => Ok(Value::Period(Period::new(0, whole(&args[0])?))),
            "weeks" => Ok(Value::Period(Period::new(0, scaled(&args[0], 7)?))),
            "months" => Ok(Value::Period(Period::new(whole(&args[0])?, 0))),
            "years" => Ok(Value::Period(Period::new(scaled(&args[0], 12)?, 0))),
            "number" => number(&args[0]).map(Value::Number),
            "text" => Ok(Value::Text(args[0].to_string())),
            "abs" => match args.remove(0) {
                Value::Duration(d) => Ok(Value::Duration(d.abs())),
                other => number(&other).map(|n| Value::Number(n.abs())),
            },
            "round" => {
                let n = number(&args[0])?;
                let digits = match args.get(1) {
                    Some(d) => whole(d)?,
                    None => 0,
                };
                let scale = 10f64.powi(digits);
                Ok(Value::Number((n * scale).round() / scale))
            }
            "min" | "max" => {
                let wanted = if name == "min" {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut iter = args.into_iter();
                let first = iter.next().ok_or_else(|| ExpressionError::Arity {
                    name: name.to_string(),
                    expected: "at least 1".to_string(),
                    got: 0,
                })?;
                Ok(iter.fold(first, |best, candidate| {
                    if compare(&candidate, &best) == wanted {
                        candidate
                    } else {
                        best
                    }
                }))
            }
            other => Err(ExpressionError::UnknownFunction(other.to_string())),
        }
    }
}

/// Find a dotted path in a row: the longest literal dotted key wins, the remaining segments walk
/// into nested objects (or 1-based into arrays for numeric segments).
fn lookup_path<'a>(row: &'a Row, path: &[String]) -> Option<&'a serde_json::Value> {
    for split in (1..=path.len()).rev() {
        let key = path[..split].join(".");
        let Some(mut current) = row.get(&key) else {
            continue;
        };
        for segment in &path[split..] {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => {
                    let position: usize = segment.parse().ok()?;
                    items.get(position.checked_sub(1)?)?
                }
                _ => return None,
            };
        }
        return Some(current);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use crate::rowset::row_from;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        parse_instant("2021-06-15T12:00:00Z").unwrap()
    }

    fn eval(condition: &str, row: &Row) -> Result<Value, ExpressionError> {
        Evaluation::new(row, now()).eval(&parse(condition).unwrap())
    }

    #[test]
    fn test_field_lookup() {
        let row = row_from([
            ("temp", json!(-3)),
            ("city.name", json!("Moscow")),
            ("weather", json!({"wind": {"speed": 7}})),
            ("$city", json!(["Moscow", 12])),
        ]);
        assert_eq!(eval("temp", &row).unwrap(), Value::Number(-3.0));
        assert_eq!(eval("city.name", &row).unwrap(), Value::Text("Moscow".into()));
        assert_eq!(eval("weather.wind.speed", &row).unwrap(), Value::Number(7.0));
        assert_eq!(eval("$city[2]", &row).unwrap(), Value::Number(12.0));
        assert!(matches!(
            eval("$city[3]", &row),
            Err(ExpressionError::IndexOutOfRange { index: 3, len: 2, .. })
        ));
        assert!(matches!(
            eval("humidity > 3", &row),
            Err(ExpressionError::UndefinedSymbol(_))
        ));
    }

    #[test]
    fn test_null_field_fails() {
        let row = row_from([("temp", serde_json::Value::Null)]);
        assert!(matches!(
            eval("temp > 0", &row),
            Err(ExpressionError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_logic_and_comparison() {
        let row = row_from([("temp", json!(5)), ("kind", json!("sunny"))]);
        assert_eq!(
            eval("temp >= 0 and kind == 'sunny'", &row).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval("temp < 0 || !kind", &row).unwrap(), Value::Bool(false));
        assert_eq!(eval("temp == '5'", &row).unwrap(), Value::Bool(true));
        assert_eq!(eval("max(temp, 2, 9) - min(1, temp)", &row).unwrap(), Value::Number(8.0));
    }

    #[test]
    fn test_temporal_builtins() {
        let row = row_from([("start", json!("2021-06-10"))]);
        assert_eq!(
            eval("date(start) + days(5) == today()", &row).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("now() - datetime('2021-06-15 10:00') == hours(2)", &row).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("today() - date(start) > days(3)", &row).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval("date('2021-01-31') + months(1)", &row).unwrap(),
            Value::Date(parse_date("2021-02-28").unwrap())
        );
    }

    #[test]
    fn test_period_overflow_is_an_error() {
        let row = row_from([("temp", json!(1))]);
        for condition in [
            "today() + weeks(400000000) > today()",
            "today() + years(200000000) > today()",
            "months(2000000000) + months(2000000000)",
            "days(2000000000) * 2",
            "days(1) * 10000000000",
            "-(months(-2147483647) - months(1))",
        ] {
            assert!(
                matches!(eval(condition, &row), Err(ExpressionError::InvalidValue(_))),
                "{}",
                condition
            );
        }
    }

    #[test]
    fn test_static_kind_check() {
        let check = |s: &str| infer_kind(&parse(s).unwrap());
        assert_eq!(check("temp > 0").unwrap(), Some(Kind::Bool));
        assert_eq!(check("now() + hours(1)").unwrap(), Some(Kind::Instant));
        assert!(matches!(
            check("now() + 1"),
            Err(ExpressionError::TypeMismatch { .. })
        ));
        assert!(matches!(
            check("-'abc'"),
            Err(ExpressionError::InvalidOperand { .. })
        ));
        assert!(matches!(check("foo(1)"), Err(ExpressionError::UnknownFunction(_))));
        assert!(matches!(check("days()"), Err(ExpressionError::Arity { .. })));
        assert_eq!(check("temp + 1").unwrap(), None);
    }
}
