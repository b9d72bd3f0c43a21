//! Axis bounds: one axis's coordinate window, with the intersection,
//! cropping, and calendar-offset operations the request compiler applies
//! before any kernel runs.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::axis::Axis;
use crate::error::RequestError;

/// Coordinate system of a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordSystem {
    /// Coordinate values in the axis's native units.
    Values,
    /// Integer positions along the axis.
    Indices,
    /// Calendar timestamps as strings.
    Timestamps,
}

impl CoordSystem {
    /// Parse a system token from the request schema; defaults to `values`.
    pub fn from_token(token: Option<&str>) -> Result<Self, RequestError> {
        match token.map(|t| t.to_ascii_lowercase()) {
            None => Ok(CoordSystem::Values),
            Some(t) => match t.as_str() {
                "values" | "value" => Ok(CoordSystem::Values),
                "indices" | "index" => Ok(CoordSystem::Indices),
                "timestamps" | "timestamp" => Ok(CoordSystem::Timestamps),
                other => Err(RequestError::ConfigError(format!(
                    "unknown coordinate system '{other}'"
                ))),
            },
        }
    }
}

/// One endpoint of an axis bound: numeric or calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Number(f64),
    Time(String),
}

impl BoundValue {
    /// Build from a raw schema value. Strings that parse as numbers stay
    /// numeric; anything else is treated as a timestamp token.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RequestError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(BoundValue::Number)
                .ok_or_else(|| RequestError::ConfigError(format!("bad numeric bound: {n}"))),
            serde_json::Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) => Ok(BoundValue::Number(n)),
                Err(_) => Ok(BoundValue::Time(s.clone())),
            },
            other => Err(RequestError::ConfigError(format!(
                "bound must be a number or string, got {other}"
            ))),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            BoundValue::Number(n) => Some(*n),
            BoundValue::Time(_) => None,
        }
    }

    /// Parse this endpoint as a calendar instant.
    pub fn as_instant(&self) -> Result<NaiveDateTime, RequestError> {
        match self {
            BoundValue::Time(s) => parse_instant(s),
            BoundValue::Number(n) => Err(RequestError::ConfigError(format!(
                "numeric bound {n} used where a timestamp is required"
            ))),
        }
    }

    /// Order two endpoints: numerically, or as calendar instants when either
    /// side is a timestamp.
    pub fn compare(&self, other: &BoundValue) -> Result<Ordering, RequestError> {
        match (self, other) {
            (BoundValue::Number(a), BoundValue::Number(b)) => {
                a.partial_cmp(b).ok_or_else(|| {
                    RequestError::ConfigError("non-finite bound comparison".to_string())
                })
            }
            _ => {
                let a = coerce_instant(self)?;
                let b = coerce_instant(other)?;
                Ok(a.cmp(&b))
            }
        }
    }

    fn min(self, other: BoundValue) -> Result<BoundValue, RequestError> {
        Ok(match self.compare(&other)? {
            Ordering::Greater => other,
            _ => self,
        })
    }

    fn max(self, other: BoundValue) -> Result<BoundValue, RequestError> {
        Ok(match self.compare(&other)? {
            Ordering::Less => other,
            _ => self,
        })
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Number(n) => write!(f, "{n}"),
            BoundValue::Time(s) => write!(f, "{s}"),
        }
    }
}

fn coerce_instant(value: &BoundValue) -> Result<NaiveDateTime, RequestError> {
    match value {
        BoundValue::Time(s) => parse_instant(s),
        // Mixed numeric/timestamp comparisons read the number as a year.
        BoundValue::Number(n) => NaiveDate::from_ymd_opt(*n as i32, 1, 1)
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap())
            .ok_or_else(|| RequestError::ConfigError(format!("bad year bound: {n}"))),
    }
}

/// Parse a timestamp token in any of the formats requests use.
pub fn parse_instant(token: &str) -> Result<NaiveDateTime, RequestError> {
    let t = token.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(t) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0).unwrap());
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{t}-01"), "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0).unwrap());
    }
    if let Ok(year) = t.parse::<i32>() {
        if let Some(d) = NaiveDate::from_ymd_opt(year, 1, 1) {
            return Ok(d.and_hms_opt(0, 0, 0).unwrap());
        }
    }
    Err(RequestError::ConfigError(format!(
        "unparseable timestamp '{token}'"
    )))
}

/// Calendar offset unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetUnit {
    Years,
    Months,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl OffsetUnit {
    fn from_token(token: char) -> Result<Self, RequestError> {
        Ok(match token.to_ascii_lowercase() {
            'y' => OffsetUnit::Years,
            'm' => OffsetUnit::Months,
            'w' => OffsetUnit::Weeks,
            'd' => OffsetUnit::Days,
            'h' => OffsetUnit::Hours,
            't' => OffsetUnit::Minutes,
            's' => OffsetUnit::Seconds,
            other => {
                return Err(RequestError::ConfigError(format!(
                    "unknown offset unit '{other}'"
                )))
            }
        })
    }
}

/// A deliberate time lag: signed `(count, unit)` terms applied left-to-right
/// as calendar arithmetic. Month and year terms clamp the day-of-month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOffset {
    pub terms: Vec<(i64, OffsetUnit)>,
}

impl TimeOffset {
    /// Parse a spec such as `"1y"` or `"-6m,3d"`.
    pub fn parse(spec: &str) -> Result<Self, RequestError> {
        let mut terms = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let unit = OffsetUnit::from_token(part.chars().last().unwrap())?;
            let count: i64 = part[..part.len() - 1].parse().map_err(|_| {
                RequestError::ConfigError(format!("bad offset term '{part}' in '{spec}'"))
            })?;
            terms.push((count, unit));
        }
        if terms.is_empty() {
            return Err(RequestError::ConfigError(format!(
                "empty offset spec '{spec}'"
            )));
        }
        Ok(TimeOffset { terms })
    }

    /// Apply the offset to an instant.
    pub fn apply(&self, t: NaiveDateTime) -> Result<NaiveDateTime, RequestError> {
        let mut t = t;
        for (count, unit) in &self.terms {
            t = apply_term(t, *count, *unit)?;
        }
        Ok(t)
    }

    /// The inverse offset, used to revert output time coordinates.
    pub fn invert(&self) -> TimeOffset {
        TimeOffset {
            terms: self
                .terms
                .iter()
                .rev()
                .map(|(count, unit)| (-count, *unit))
                .collect(),
        }
    }
}

fn apply_term(
    t: NaiveDateTime,
    count: i64,
    unit: OffsetUnit,
) -> Result<NaiveDateTime, RequestError> {
    let overflow = || RequestError::ConfigError(format!("offset overflow at {t}"));
    match unit {
        OffsetUnit::Years | OffsetUnit::Months => {
            let months = if unit == OffsetUnit::Years {
                count * 12
            } else {
                count
            };
            let m = Months::new(months.unsigned_abs() as u32);
            if months >= 0 {
                t.checked_add_months(m).ok_or_else(overflow)
            } else {
                t.checked_sub_months(m).ok_or_else(overflow)
            }
        }
        OffsetUnit::Weeks => t.checked_add_signed(Duration::weeks(count)).ok_or_else(overflow),
        OffsetUnit::Days => t.checked_add_signed(Duration::days(count)).ok_or_else(overflow),
        OffsetUnit::Hours => t.checked_add_signed(Duration::hours(count)).ok_or_else(overflow),
        OffsetUnit::Minutes => t
            .checked_add_signed(Duration::minutes(count))
            .ok_or_else(overflow),
        OffsetUnit::Seconds => t
            .checked_add_signed(Duration::seconds(count))
            .ok_or_else(overflow),
    }
}

/// One axis's coordinate window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub axis: Axis,
    /// Declared axis name from the request (kept for messages).
    pub name: String,
    pub start: BoundValue,
    pub end: BoundValue,
    pub step: Option<f64>,
    pub system: CoordSystem,
    /// Pending time lag, reverted on output coordinates after evaluation.
    pub offset: Option<TimeOffset>,
}

impl AxisBounds {
    pub fn new(
        axis: Axis,
        name: impl Into<String>,
        start: BoundValue,
        end: BoundValue,
        system: CoordSystem,
    ) -> Result<Self, RequestError> {
        let bounds = AxisBounds {
            axis,
            name: name.into(),
            start,
            end,
            step: None,
            system,
            offset: None,
        };
        if bounds.start.compare(&bounds.end)? == Ordering::Greater {
            return Err(RequestError::ConfigError(format!(
                "axis '{}': start {} exceeds end {}",
                bounds.name, bounds.start, bounds.end
            )));
        }
        Ok(bounds)
    }

    /// A degenerate bound (`start == end`) that yields to any concrete bound
    /// during broadcast intersection.
    pub fn is_broadcast(&self) -> bool {
        self.start == self.end
    }

    /// Intersect with the actual coordinate extent of loaded data.
    ///
    /// For the T axis under `values`/`timestamps`, both sides are parsed as
    /// calendar instants; otherwise the clamp is numeric. Disjoint windows
    /// fail with [`RequestError::EmptyIntersection`]. The pending offset is
    /// preserved on the result.
    pub fn crop(&self, extent_min: &BoundValue, extent_max: &BoundValue) -> Result<AxisBounds, RequestError> {
        if self.start.compare(extent_max)? == Ordering::Greater
            || self.end.compare(extent_min)? == Ordering::Less
        {
            return Err(RequestError::EmptyIntersection {
                axis: self.name.clone(),
                detail: format!(
                    "bound [{}, {}] outside extent [{}, {}]",
                    self.start, self.end, extent_min, extent_max
                ),
            });
        }
        let mut cropped = self.clone();
        cropped.start = self.start.clone().max(extent_min.clone())?;
        cropped.end = self.end.clone().min(extent_max.clone())?;
        Ok(cropped)
    }

    /// Intersect with another bound on the same axis.
    ///
    /// Systems must match. When broadcasting is allowed and either side is a
    /// broadcast bound, the concrete side wins outright. Otherwise the result
    /// is `(max(start), min(end))` with the caller's offset preserved.
    pub fn intersect(
        &self,
        other: &AxisBounds,
        allow_broadcast: bool,
    ) -> Result<AxisBounds, RequestError> {
        if self.system != other.system {
            return Err(RequestError::ConfigError(format!(
                "axis '{}': cannot intersect {:?} bounds with {:?} bounds",
                self.name, self.system, other.system
            )));
        }
        if allow_broadcast {
            if self.is_broadcast() && !other.is_broadcast() {
                let mut kept = other.clone();
                kept.offset = self.offset.clone();
                return Ok(kept);
            }
            if other.is_broadcast() && !self.is_broadcast() {
                return Ok(self.clone());
            }
        }
        let start = self.start.clone().max(other.start.clone())?;
        let end = self.end.clone().min(other.end.clone())?;
        if start.compare(&end)? == Ordering::Greater {
            return Err(RequestError::EmptyIntersection {
                axis: self.name.clone(),
                detail: format!(
                    "[{}, {}] does not overlap [{}, {}]",
                    self.start, self.end, other.start, other.end
                ),
            });
        }
        let mut result = self.clone();
        result.start = start;
        result.end = end;
        Ok(result)
    }

    /// Shift the bound by a calendar offset, recording it so output
    /// coordinates can be reverted transparently for downstream consumers.
    pub fn offset(&self, spec: &TimeOffset) -> Result<AxisBounds, RequestError> {
        let mut shifted = self.clone();
        shifted.start = shift_endpoint(&self.start, spec)?;
        shifted.end = shift_endpoint(&self.end, spec)?;
        shifted.offset = Some(match &self.offset {
            None => spec.clone(),
            Some(existing) => {
                let mut terms = existing.terms.clone();
                terms.extend(spec.terms.iter().cloned());
                TimeOffset { terms }
            }
        });
        Ok(shifted)
    }
}

fn shift_endpoint(value: &BoundValue, offset: &TimeOffset) -> Result<BoundValue, RequestError> {
    let shifted = offset.apply(coerce_instant(value)?)?;
    Ok(BoundValue::Time(
        shifted.format("%Y-%m-%dT%H:%M:%S").to_string(),
    ))
}
