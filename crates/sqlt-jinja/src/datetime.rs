//! Date and time values for templates.
//!
//! Exposes `datetime` (a callable namespace), `relativedelta` and
//! `timedelta`. Template expressions cannot overload operators, so
//! arithmetic is spelled `dt.plus(delta)` / `dt.minus(delta)`.

use crate::error::{into_minijinja, HelperError};
use crate::proxy::{HelperNamespace, SafeProxy};
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use minijinja::value::{from_args, Kwargs, Object, ObjectRepr, Rest, Value};
use minijinja::{Error, State};
use std::fmt::{self, Write};
use std::sync::Arc;

/// A naive date and time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue(pub NaiveDateTime);

/// A calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue(pub NaiveDate);

/// A calendar-aware offset: whole months first, then days and seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaValue {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
}

fn helper_error(helper: &str, message: impl Into<String>) -> Error {
    into_minijinja(HelperError::new(helper, message))
}

fn strftime(dt: &NaiveDateTime, fmt: &str) -> Result<String, Error> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(helper_error("strftime", format!("invalid format string '{fmt}'")));
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter()))
        .map_err(|_| helper_error("strftime", format!("cannot format with '{fmt}'")))?;
    Ok(out)
}

fn no_args(method: &str, args: &[Value]) -> Result<(), Error> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::new(
            minijinja::ErrorKind::TooManyArguments,
            format!("{method}() takes no arguments"),
        ))
    }
}

fn delta_arg(helper: &str, args: &[Value]) -> Result<DeltaValue, Error> {
    let (delta,): (Value,) = from_args(args)?;
    delta
        .downcast_object_ref::<DeltaValue>()
        .copied()
        .ok_or_else(|| helper_error(helper, "expected a relativedelta or timedelta"))
}

impl DeltaValue {
    fn shift(&self, dt: NaiveDateTime, sign: i64) -> Option<NaiveDateTime> {
        let months = self.months.checked_mul(sign)?;
        let shifted = if months >= 0 {
            dt.checked_add_months(Months::new(u32::try_from(months).ok()?))?
        } else {
            dt.checked_sub_months(Months::new(u32::try_from(-months).ok()?))?
        };
        let offset = TimeDelta::try_days(self.days.checked_mul(sign)?)?
            .checked_add(&TimeDelta::try_seconds(self.seconds.checked_mul(sign)?)?)?;
        shifted.checked_add_signed(offset)
    }
}

impl Object for DeltaValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "months" => Some(Value::from(self.months)),
            "days" => Some(Value::from(self.days)),
            "seconds" => Some(Value::from(self.seconds)),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}M{}DT{}S", self.months, self.days, self.seconds)
    }
}

fn shift_datetime(
    helper: &str,
    dt: NaiveDateTime,
    args: &[Value],
    sign: i64,
) -> Result<NaiveDateTime, Error> {
    delta_arg(helper, args)?
        .shift(dt, sign)
        .ok_or_else(|| helper_error(helper, "date out of range"))
}

fn render_datetime(dt: &NaiveDateTime, sep: char) -> String {
    if dt.nanosecond() == 0 {
        dt.format(&format!("%Y-%m-%d{sep}%H:%M:%S")).to_string()
    } else {
        dt.format(&format!("%Y-%m-%d{sep}%H:%M:%S%.6f")).to_string()
    }
}

impl Object for DateTimeValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let dt = self.0;
        match key.as_str()? {
            "year" => Some(Value::from(dt.year())),
            "month" => Some(Value::from(dt.month())),
            "day" => Some(Value::from(dt.day())),
            "hour" => Some(Value::from(dt.hour())),
            "minute" => Some(Value::from(dt.minute())),
            "second" => Some(Value::from(dt.second())),
            "microsecond" => Some(Value::from(dt.nanosecond() / 1_000)),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "strftime" => {
                let (fmt,): (&str,) = from_args(args)?;
                strftime(&self.0, fmt).map(Value::from)
            }
            "isoformat" => {
                no_args(method, args)?;
                Ok(Value::from(render_datetime(&self.0, 'T')))
            }
            "date" => {
                no_args(method, args)?;
                Ok(Value::from_object(DateValue(self.0.date())))
            }
            "timestamp" => {
                no_args(method, args)?;
                let utc = self.0.and_utc();
                Ok(Value::from(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_micros()) / 1e6))
            }
            "weekday" => {
                no_args(method, args)?;
                Ok(Value::from(self.0.weekday().num_days_from_monday()))
            }
            "plus" => shift_datetime("datetime.plus", self.0, args, 1)
                .map(|dt| Value::from_object(DateTimeValue(dt))),
            "minus" => shift_datetime("datetime.minus", self.0, args, -1)
                .map(|dt| Value::from_object(DateTimeValue(dt))),
            _ => Err(Error::new(
                minijinja::ErrorKind::UnknownMethod,
                format!("datetime has no method named {method}"),
            )),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_datetime(&self.0, ' '))
    }
}

impl DateValue {
    fn midnight(&self) -> NaiveDateTime {
        self.0.and_time(chrono::NaiveTime::MIN)
    }
}

impl Object for DateValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "year" => Some(Value::from(self.0.year())),
            "month" => Some(Value::from(self.0.month())),
            "day" => Some(Value::from(self.0.day())),
            _ => None,
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "strftime" => {
                let (fmt,): (&str,) = from_args(args)?;
                strftime(&self.midnight(), fmt).map(Value::from)
            }
            "isoformat" => {
                no_args(method, args)?;
                Ok(Value::from(self.0.format("%Y-%m-%d").to_string()))
            }
            "weekday" => {
                no_args(method, args)?;
                Ok(Value::from(self.0.weekday().num_days_from_monday()))
            }
            "plus" => shift_datetime("date.plus", self.midnight(), args, 1)
                .map(|dt| Value::from_object(DateValue(dt.date()))),
            "minus" => shift_datetime("date.minus", self.midnight(), args, -1)
                .map(|dt| Value::from_object(DateValue(dt.date()))),
            _ => Err(Error::new(
                minijinja::ErrorKind::UnknownMethod,
                format!("date has no method named {method}"),
            )),
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.ffffff]]` or the same with a
/// space separator.
pub(crate) fn parse_isoformat(s: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_time(chrono::NaiveTime::MIN));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn build_datetime(year: i32, month: u32, day: u32, rest: &[u32]) -> Result<Value, Error> {
    if rest.len() > 4 {
        return Err(helper_error("datetime", "too many arguments"));
    }
    let part = |i: usize| rest.get(i).copied().unwrap_or(0);
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_micro_opt(part(0), part(1), part(2), part(3)))
        .map(|dt| Value::from_object(DateTimeValue(dt)))
        .ok_or_else(|| helper_error("datetime", "date values out of range"))
}

fn build_delta(helper: &str, kwargs: &Kwargs, allow_months: bool) -> Result<Value, Error> {
    let get = |key: &str| -> Result<i64, Error> { Ok(kwargs.get::<Option<i64>>(key)?.unwrap_or(0)) };
    let (years, months) = if allow_months {
        (get("years")?, get("months")?)
    } else {
        (0, 0)
    };
    let (weeks, days) = (get("weeks")?, get("days")?);
    let (hours, minutes, seconds) = (get("hours")?, get("minutes")?, get("seconds")?);
    kwargs.assert_all_used()?;

    let delta = (|| {
        Some(DeltaValue {
            months: years.checked_mul(12)?.checked_add(months)?,
            days: weeks.checked_mul(7)?.checked_add(days)?,
            seconds: hours
                .checked_mul(3600)?
                .checked_add(minutes.checked_mul(60)?)?
                .checked_add(seconds)?,
        })
    })()
    .ok_or_else(|| helper_error(helper, "value out of range"))?;

    Ok(Value::from_object(delta))
}

/// The `datetime` namespace, callable as a constructor.
pub(crate) fn datetime_namespace() -> Value {
    HelperNamespace::new("datetime")
        .with_constructor(SafeProxy::wrap(
            "datetime",
            Value::from_function(|year: i32, month: u32, day: u32, rest: Rest<u32>| {
                build_datetime(year, month, day, &rest)
            }),
        ))
        .with_member(
            "now",
            SafeProxy::wrap(
                "datetime.now",
                Value::from_function(|| Value::from_object(DateTimeValue(Local::now().naive_local()))),
            ),
        )
        .with_member(
            "today",
            SafeProxy::wrap(
                "datetime.today",
                Value::from_function(|| Value::from_object(DateTimeValue(Local::now().naive_local()))),
            ),
        )
        .with_member(
            "utcnow",
            SafeProxy::wrap(
                "datetime.utcnow",
                Value::from_function(|| Value::from_object(DateTimeValue(Utc::now().naive_utc()))),
            ),
        )
        .with_member(
            "fromisoformat",
            SafeProxy::wrap(
                "datetime.fromisoformat",
                Value::from_function(|s: &str| -> Result<Value, Error> {
                    parse_isoformat(s)
                        .map(|dt| Value::from_object(DateTimeValue(dt)))
                        .ok_or_else(|| {
                            helper_error("datetime.fromisoformat", format!("invalid isoformat string: '{s}'"))
                        })
                }),
            ),
        )
        .with_member(
            "date",
            SafeProxy::wrap(
                "datetime.date",
                Value::from_function(|year: i32, month: u32, day: u32| -> Result<Value, Error> {
                    NaiveDate::from_ymd_opt(year, month, day)
                        .map(|d| Value::from_object(DateValue(d)))
                        .ok_or_else(|| helper_error("datetime.date", "date values out of range"))
                }),
            ),
        )
        .into_value()
}

/// `relativedelta(years=, months=, weeks=, days=, hours=, minutes=, seconds=)`
pub(crate) fn relativedelta_fn() -> Value {
    SafeProxy::wrap(
        "relativedelta",
        Value::from_function(|kwargs: Kwargs| build_delta("relativedelta", &kwargs, true)),
    )
}

/// `timedelta(weeks=, days=, hours=, minutes=, seconds=)`
pub(crate) fn timedelta_fn() -> Value {
    SafeProxy::wrap(
        "timedelta",
        Value::from_function(|kwargs: Kwargs| build_delta("timedelta", &kwargs, false)),
    )
}

#[cfg(test)]
#[path = "datetime_test.rs"]
mod tests;
