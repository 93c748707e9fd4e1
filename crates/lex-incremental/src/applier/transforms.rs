//! Column transformations behind each rule action.
//!
//! Every function works on a single column of `df` and returns the number of
//! values (or rows) it changed.

use crate::analysis::patterns::resolve_layout;
use crate::types::ColumnDataType;
use crate::utils::{
    f64_values, is_numeric_dtype, iqr_bounds, median_sorted, parse_boolean_string,
    parse_numeric_string, parse_plain_number, string_mode, string_values,
};
use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Output layout of standardized dates.
pub const ISO_DATE_LAYOUT: &str = "%Y-%m-%d";

/// Windows-1252 characters in the 0x80..=0x9F range and the byte they encode.
const CP1252_HIGH: [(char, u8); 27] = [
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

fn column_series(df: &DataFrame, column: &str) -> Result<Series> {
    Ok(df.column(column)?.as_materialized_series().clone())
}

fn require_numeric(series: &Series) -> Result<()> {
    if !is_numeric_dtype(series.dtype()) {
        bail!(
            "column '{}' is {} and cannot be treated as numeric",
            series.name(),
            series.dtype()
        );
    }
    Ok(())
}

/// Replace nulls of a numeric column with `value`, producing Float64.
fn fill_numeric(df: &mut DataFrame, column: &str, value: f64) -> Result<usize> {
    let series = column_series(df, column)?;
    let nulls = series.null_count();
    let float_series = series.cast(&DataType::Float64)?;
    let filled: Vec<f64> = float_series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(value))
        .collect();
    df.replace(column, Series::new(column.into(), filled))?;
    Ok(nulls)
}

fn fill_boolean(df: &mut DataFrame, column: &str, value: bool) -> Result<usize> {
    let series = column_series(df, column)?;
    let nulls = series.null_count();
    let filled: Vec<bool> = series
        .bool()?
        .into_iter()
        .map(|v| v.unwrap_or(value))
        .collect();
    df.replace(column, Series::new(column.into(), filled))?;
    Ok(nulls)
}

fn fill_string(df: &mut DataFrame, column: &str, value: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    let nulls = series.null_count();
    let filled: Vec<String> = string_values(&series)?
        .into_iter()
        .map(|v| v.unwrap_or_else(|| value.to_string()))
        .collect();
    df.replace(column, Series::new(column.into(), filled))?;
    Ok(nulls)
}

pub fn impute_mean(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    require_numeric(&series)?;
    let values = f64_values(&series)?;
    if values.is_empty() {
        bail!("column '{column}' has no values to average");
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    fill_numeric(df, column, mean)
}

pub fn impute_median(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    require_numeric(&series)?;
    let mut values = f64_values(&series)?;
    values.sort_by(f64::total_cmp);
    let median =
        median_sorted(&values).ok_or_else(|| anyhow!("column '{column}' has no values"))?;
    fill_numeric(df, column, median)
}

/// Fill with the most frequent value. Ties resolve to the smallest value.
pub fn impute_mode(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    match series.dtype() {
        DataType::Boolean => {
            let ca = series.bool()?;
            let trues = ca.into_iter().filter(|v| *v == Some(true)).count();
            let falses = ca.into_iter().filter(|v| *v == Some(false)).count();
            if trues + falses == 0 {
                bail!("column '{column}' has no values");
            }
            fill_boolean(df, column, trues > falses)
        }
        dtype if is_numeric_dtype(dtype) => {
            let mut values = f64_values(&series)?;
            values.sort_by(f64::total_cmp);
            let mut best: Option<(f64, usize)> = None;
            for chunk in values.chunk_by(|a, b| a == b) {
                if best.is_none_or(|(_, count)| chunk.len() > count) {
                    best = Some((chunk[0], chunk.len()));
                }
            }
            let (mode, _) = best.ok_or_else(|| anyhow!("column '{column}' has no values"))?;
            fill_numeric(df, column, mode)
        }
        _ => {
            let mode =
                string_mode(&series).ok_or_else(|| anyhow!("column '{column}' has no values"))?;
            fill_string(df, column, &mode)
        }
    }
}

/// Fill with a user-provided value, parsed to the column's type.
pub fn impute_custom(df: &mut DataFrame, column: &str, value: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    match series.dtype() {
        DataType::Boolean => {
            let parsed = parse_boolean_string(value)
                .ok_or_else(|| anyhow!("'{value}' is not a boolean for column '{column}'"))?;
            fill_boolean(df, column, parsed)
        }
        dtype if is_numeric_dtype(dtype) => {
            let parsed = parse_numeric_string(value)
                .ok_or_else(|| anyhow!("'{value}' is not a number for column '{column}'"))?;
            fill_numeric(df, column, parsed)
        }
        _ => fill_string(df, column, value),
    }
}

/// Remove the column; every row counts as affected.
pub fn drop_column(df: &mut DataFrame, column: &str) -> Result<usize> {
    let height = df.height();
    df.drop_in_place(column)?;
    Ok(height)
}

fn outlier_bounds(series: &Series) -> Result<(f64, f64)> {
    require_numeric(series)?;
    let values = f64_values(series)?;
    iqr_bounds(&values).ok_or_else(|| anyhow!("column '{}' has no values", series.name()))
}

/// Clamp values to the 1.5 x IQR fences. Output is Float64.
pub fn cap_outliers(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    let (lower, upper) = outlier_bounds(&series)?;
    let float_series = series.cast(&DataType::Float64)?;
    let mut capped = 0;
    let values: Vec<Option<f64>> = float_series
        .f64()?
        .into_iter()
        .map(|v| {
            v.map(|val| {
                let clamped = val.clamp(lower, upper);
                if clamped != val {
                    capped += 1;
                }
                clamped
            })
        })
        .collect();
    df.replace(column, Series::new(column.into(), values))?;
    Ok(capped)
}

/// Drop rows whose value lies outside the 1.5 x IQR fences. Nulls are kept.
pub fn remove_outliers(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    let (lower, upper) = outlier_bounds(&series)?;
    let float_series = series.cast(&DataType::Float64)?;
    let mask_values: Vec<bool> = float_series
        .f64()?
        .into_iter()
        .map(|v| v.is_none_or(|val| val >= lower && val <= upper))
        .collect();
    let before = df.height();
    let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
    *df = df.filter(&mask)?;
    Ok(before - df.height())
}

/// Name of the column added by [`flag_outliers`].
pub fn outlier_flag_column(column: &str) -> String {
    format!("{column}_outlier_flag")
}

/// Add a boolean `<column>_outlier_flag` column.
pub fn flag_outliers(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    let (lower, upper) = outlier_bounds(&series)?;
    let float_series = series.cast(&DataType::Float64)?;
    let flags: Vec<bool> = float_series
        .f64()?
        .into_iter()
        .map(|v| v.is_some_and(|val| val < lower || val > upper))
        .collect();
    let flagged = flags.iter().filter(|f| **f).count();
    let flag_name = outlier_flag_column(column);
    df.with_column(Series::new(flag_name.as_str().into(), flags))?;
    Ok(flagged)
}

/// Rewrite a string column value by value. Returns the number of changed values.
fn map_strings(
    df: &mut DataFrame,
    column: &str,
    mut f: impl FnMut(&str) -> Option<String>,
) -> Result<usize> {
    let series = column_series(df, column)?;
    let str_series = series.str()?;
    let mut changed = 0;
    let values: Vec<Option<String>> = str_series
        .into_iter()
        .map(|v| {
            v.map(|val| match f(val) {
                Some(new) if new != val => {
                    changed += 1;
                    new
                }
                _ => val.to_string(),
            })
        })
        .collect();
    df.replace(column, Series::new(column.into(), values))?;
    Ok(changed)
}

fn require_string(series: &Series) -> Result<()> {
    if series.dtype() != &DataType::String {
        bail!("column '{}' is {}, expected text", series.name(), series.dtype());
    }
    Ok(())
}

pub fn trim_whitespace(df: &mut DataFrame, column: &str) -> Result<usize> {
    require_string(&column_series(df, column)?)?;
    map_strings(df, column, |v| Some(v.trim().to_string()))
}

/// Rewrite dates as ISO-8601 (`YYYY-MM-DD`).
///
/// Layouts are tried in order; values matching none are left unchanged.
pub fn standardize_dates(
    df: &mut DataFrame,
    column: &str,
    layouts: &[String],
    day_first: bool,
) -> Result<usize> {
    require_string(&column_series(df, column)?)?;
    if layouts.is_empty() {
        bail!("no date layouts recorded for column '{column}'");
    }
    let resolved: Vec<String> = layouts
        .iter()
        .map(|layout| resolve_layout(layout, day_first))
        .collect();
    map_strings(df, column, |v| {
        let trimmed = v.trim();
        resolved.iter().find_map(|layout| {
            NaiveDate::parse_from_str(trimmed, layout)
                .ok()
                .map(|date| date.format(ISO_DATE_LAYOUT).to_string())
        })
    })
}

/// Replace each variant (compared after trimming) with its canonical spelling.
pub fn map_categories(
    df: &mut DataFrame,
    column: &str,
    mapping: &BTreeMap<String, String>,
) -> Result<usize> {
    require_string(&column_series(df, column)?)?;
    if mapping.is_empty() {
        bail!("empty category mapping for column '{column}'");
    }
    map_strings(df, column, |v| mapping.get(v.trim()).cloned())
}

/// Parse a text column into numbers with `parse`.
///
/// Unparseable values become null. Integer targets produce Int64 when every
/// parsed value is integral, Float64 otherwise.
fn convert_with(
    df: &mut DataFrame,
    column: &str,
    target: ColumnDataType,
    parse: fn(&str) -> Option<f64>,
) -> Result<usize> {
    let series = column_series(df, column)?;
    if is_numeric_dtype(series.dtype()) {
        let dtype = match target {
            ColumnDataType::Integer => DataType::Int64,
            _ => DataType::Float64,
        };
        df.replace(column, series.cast(&dtype)?)?;
        return Ok(0);
    }
    require_string(&series)?;

    let parsed: Vec<Option<f64>> = series
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse))
        .collect();
    let converted = parsed.iter().flatten().count();
    let integral = parsed.iter().flatten().all(|v| v.fract() == 0.0);

    let new_series = if target == ColumnDataType::Integer && integral {
        let ints: Vec<Option<i64>> = parsed.iter().map(|v| v.map(|x| x as i64)).collect();
        Series::new(column.into(), ints)
    } else {
        Series::new(column.into(), parsed)
    };
    df.replace(column, new_series)?;
    Ok(converted)
}

pub fn convert_numeric(df: &mut DataFrame, column: &str, target: ColumnDataType) -> Result<usize> {
    convert_with(df, column, target, parse_plain_number)
}

/// Strip currency, percent and thousands formatting, then store numbers.
pub fn standardize_numeric_format(
    df: &mut DataFrame,
    column: &str,
    target: ColumnDataType,
) -> Result<usize> {
    convert_with(df, column, target, parse_numeric_string)
}

/// Parse boolean words into a Boolean column. Unrecognised values become null.
pub fn convert_boolean(df: &mut DataFrame, column: &str) -> Result<usize> {
    let series = column_series(df, column)?;
    if series.dtype() == &DataType::Boolean {
        return Ok(0);
    }
    require_string(&series)?;
    let parsed: Vec<Option<bool>> = series
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_boolean_string))
        .collect();
    let converted = parsed.iter().flatten().count();
    df.replace(column, Series::new(column.into(), parsed))?;
    Ok(converted)
}

/// Undo UTF-8 text that was decoded as Windows-1252 / Latin-1.
fn reverse_mojibake(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    for c in value.chars() {
        let code = c as u32;
        if code < 0x100 {
            bytes.push(code as u8);
        } else {
            let byte = CP1252_HIGH.iter().find(|(ch, _)| *ch == c)?.1;
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

/// Repair one value: reverse mojibake when it decodes cleanly, then drop
/// replacement and control characters.
pub fn repair_text(value: &str) -> String {
    let repaired = if value.is_ascii() {
        value.to_string()
    } else {
        reverse_mojibake(value).unwrap_or_else(|| value.to_string())
    };
    repaired
        .chars()
        .filter(|c| *c != '\u{FFFD}' && (!c.is_control() || matches!(c, '\t' | '\n' | '\r')))
        .collect()
}

pub fn repair_encoding(df: &mut DataFrame, column: &str) -> Result<usize> {
    require_string(&column_series(df, column)?)?;
    map_strings(df, column, |v| Some(repair_text(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impute_median_produces_float() {
        let mut df = df! { "x" => [Some(1i64), None, Some(3), Some(10)] }.unwrap();
        let affected = impute_median(&mut df, "x").unwrap();
        assert_eq!(affected, 1);
        let col = df.column("x").unwrap();
        assert_eq!(col.dtype(), &DataType::Float64);
        assert_eq!(col.null_count(), 0);
        assert_eq!(col.as_materialized_series().f64().unwrap().get(1), Some(3.0));
    }

    #[test]
    fn test_impute_mean_rejects_text() {
        let mut df = df! { "x" => [Some("a"), None] }.unwrap();
        assert!(impute_mean(&mut df, "x").is_err());
    }

    #[test]
    fn test_impute_mode_string_and_numeric() {
        let mut df = df! {
            "s" => [Some("b"), Some("a"), Some("b"), None],
            "n" => [Some(2.0), Some(2.0), Some(5.0), None],
        }
        .unwrap();
        assert_eq!(impute_mode(&mut df, "s").unwrap(), 1);
        assert_eq!(impute_mode(&mut df, "n").unwrap(), 1);
        let s = df.column("s").unwrap().as_materialized_series().clone();
        assert_eq!(s.str().unwrap().get(3), Some("b"));
        let n = df.column("n").unwrap().as_materialized_series().clone();
        assert_eq!(n.f64().unwrap().get(3), Some(2.0));
    }

    #[test]
    fn test_impute_custom_parses_numbers() {
        let mut df = df! { "n" => [Some(1.0), None] }.unwrap();
        assert_eq!(impute_custom(&mut df, "n", "7").unwrap(), 1);
        assert!(impute_custom(&mut df, "n", "seven").is_err());
    }

    #[test]
    fn test_outlier_transforms() {
        let values = [1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0, 5.0, 100.0];
        let mut capped = df! { "x" => values }.unwrap();
        assert_eq!(cap_outliers(&mut capped, "x").unwrap(), 1);
        assert_eq!(capped.height(), 10);

        let mut removed = df! { "x" => values }.unwrap();
        assert_eq!(remove_outliers(&mut removed, "x").unwrap(), 1);
        assert_eq!(removed.height(), 9);

        let mut flagged = df! { "x" => values }.unwrap();
        assert_eq!(flag_outliers(&mut flagged, "x").unwrap(), 1);
        assert!(flagged.column("x_outlier_flag").is_ok());
    }

    #[test]
    fn test_trim_and_map_categories() {
        let mut df = df! { "c" => [" Basic", "basic ", "Premium"] }.unwrap();
        assert_eq!(trim_whitespace(&mut df, "c").unwrap(), 2);

        let mapping = BTreeMap::from([("basic".to_string(), "Basic".to_string())]);
        assert_eq!(map_categories(&mut df, "c", &mapping).unwrap(), 1);
        let c = df.column("c").unwrap().as_materialized_series().clone();
        let values: Vec<Option<&str>> = c.str().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some("Basic"), Some("Basic"), Some("Premium")]);
    }

    #[test]
    fn test_standardize_dates_respects_order() {
        let layouts = vec!["%d/%m/%Y".to_string()];
        let mut day_first = df! { "d" => ["01/02/2023", "not a date"] }.unwrap();
        assert_eq!(standardize_dates(&mut day_first, "d", &layouts, true).unwrap(), 1);
        let d = day_first.column("d").unwrap().as_materialized_series().clone();
        assert_eq!(d.str().unwrap().get(0), Some("2023-02-01"));
        assert_eq!(d.str().unwrap().get(1), Some("not a date"));

        let mut month_first = df! { "d" => ["01/02/2023"] }.unwrap();
        standardize_dates(&mut month_first, "d", &layouts, false).unwrap();
        let d = month_first.column("d").unwrap().as_materialized_series().clone();
        assert_eq!(d.str().unwrap().get(0), Some("2023-01-02"));
    }

    #[test]
    fn test_numeric_and_boolean_conversion() {
        let mut df = df! {
            "i" => ["1", "2", "x"],
            "m" => ["$1,200", "15%", "3"],
            "b" => ["yes", "No", "maybe"],
        }
        .unwrap();
        assert_eq!(convert_numeric(&mut df, "i", ColumnDataType::Integer).unwrap(), 2);
        assert_eq!(df.column("i").unwrap().dtype(), &DataType::Int64);

        assert_eq!(
            standardize_numeric_format(&mut df, "m", ColumnDataType::Float).unwrap(),
            3
        );
        let m = df.column("m").unwrap().as_materialized_series().clone();
        assert_eq!(m.f64().unwrap().get(0), Some(1200.0));

        assert_eq!(convert_boolean(&mut df, "b").unwrap(), 2);
        assert_eq!(df.column("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_repair_text() {
        assert_eq!(repair_text("CafÃ©"), "Café");
        assert_eq!(repair_text("donâ€™t"), "don’t");
        assert_eq!(repair_text("bad\u{FFFD}value\u{0007}"), "badvalue");
        assert_eq!(repair_text("plain"), "plain");
    }
}
