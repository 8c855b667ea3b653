//! Field presence and range checks shared by all adapters
//!
//! Every check names the resource type and the JSON field it looked at, so a
//! failing event tells the caller exactly which input was wrong.

use std::ops::RangeInclusive;

use crate::error::{Error, Result};
use crate::event::ResourceKind;

/// A present, non-empty string
pub fn require<'a>(kind: ResourceKind, field: &'static str, value: &'a Option<String>) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::invalid(kind, field)),
    }
}

/// A present value of any type
pub fn require_value<'a, T>(kind: ResourceKind, field: &'static str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| Error::invalid(kind, field))
}

/// A list with at least one element
pub fn require_any<T>(kind: ResourceKind, field: &'static str, values: &[T]) -> Result<()> {
    if values.is_empty() {
        Err(Error::invalid(kind, field))
    } else {
        Ok(())
    }
}

/// A present port inside `range`
pub fn port(
    kind: ResourceKind,
    field: &'static str,
    value: Option<i64>,
    range: RangeInclusive<i64>,
) -> Result<i32> {
    let value = value.ok_or_else(|| Error::invalid(kind, field))?;
    if !range.contains(&value) {
        return Err(Error::out_of_range(
            kind,
            field,
            format!("{} is outside {}..={}", value, range.start(), range.end()),
        ));
    }
    i32::try_from(value).map_err(|_| Error::out_of_range(kind, field, value.to_string()))
}

/// An optional integer that must fit the provider's 32-bit fields
pub fn small_int(kind: ResourceKind, field: &'static str, value: Option<i64>) -> Result<Option<i32>> {
    value
        .map(|v| i32::try_from(v).map_err(|_| Error::out_of_range(kind, field, v.to_string())))
        .transpose()
}

/// Non-empty strings of a list, dropping blanks
pub fn present(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .collect()
}
