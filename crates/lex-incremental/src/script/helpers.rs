//! Source text of the helper functions a generated script may call.
//!
//! Each helper lists the helpers it calls itself so the generator can emit
//! the closure of what is used and nothing more.

/// A helper function emitted into generated scripts.
pub(crate) struct Helper {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub source: &'static str,
}

/// All helpers in emission order.
pub(crate) const HELPERS: &[Helper] = &[
    Helper {
        name: "require_columns",
        depends_on: &[],
        source: r#"fn require_columns(df: &DataFrame, columns: &[&str]) -> PolarsResult<()> {
    for column in columns {
        if df.column(column).is_err() {
            polars_bail!(ColumnNotFound: "{}", column);
        }
    }
    Ok(())
}"#,
    },
    Helper {
        name: "numeric_values",
        depends_on: &[],
        source: r#"fn numeric_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}"#,
    },
    Helper {
        name: "fill_numeric",
        depends_on: &["numeric_values"],
        source: r#"fn fill_numeric(df: &mut DataFrame, column: &str, value: f64) -> PolarsResult<()> {
    let filled: Vec<f64> = numeric_values(df, column)?
        .into_iter()
        .map(|v| v.unwrap_or(value))
        .collect();
    df.replace(column, Series::new(column.into(), filled))?;
    Ok(())
}"#,
    },
    Helper {
        name: "fill_string",
        depends_on: &[],
        source: r#"fn fill_string(df: &mut DataFrame, column: &str, value: &str) -> PolarsResult<()> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let filled: Vec<String> = series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or(value).to_string())
        .collect();
    df.replace(column, Series::new(column.into(), filled))?;
    Ok(())
}"#,
    },
    Helper {
        name: "impute_mean",
        depends_on: &["numeric_values", "fill_numeric"],
        source: r#"fn impute_mean(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
    if values.is_empty() {
        return Ok(());
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    fill_numeric(df, column, mean)
}"#,
    },
    Helper {
        name: "impute_median",
        depends_on: &["numeric_values", "fill_numeric"],
        source: r#"fn impute_median(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let mut values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
    if values.is_empty() {
        return Ok(());
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    fill_numeric(df, column, median)
}"#,
    },
    Helper {
        name: "impute_mode",
        depends_on: &["numeric_values", "fill_numeric", "fill_string"],
        source: r#"fn impute_mode(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let series = df.column(column)?.as_materialized_series().clone();
    if series.dtype() == &DataType::Boolean {
        let ca = series.bool()?;
        let trues = ca.into_iter().filter(|v| *v == Some(true)).count();
        let falses = ca.into_iter().filter(|v| *v == Some(false)).count();
        let mode = trues > falses;
        let filled: Vec<bool> = ca.into_iter().map(|v| v.unwrap_or(mode)).collect();
        df.replace(column, Series::new(column.into(), filled))?;
        return Ok(());
    }
    if series.dtype().is_primitive_numeric() {
        let mut values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
        values.sort_by(f64::total_cmp);
        let mut best: Option<(f64, usize)> = None;
        for run in values.chunk_by(|a, b| a == b) {
            if best.is_none_or(|(_, count)| run.len() > count) {
                best = Some((run[0], run.len()));
            }
        }
        if let Some((mode, _)) = best {
            fill_numeric(df, column, mode)?;
        }
        return Ok(());
    }
    let strings = series.cast(&DataType::String)?;
    let mut counts = std::collections::BTreeMap::new();
    for value in strings.str()?.into_iter().flatten() {
        *counts.entry(value.to_string()).or_insert(0usize) += 1;
    }
    let mut best: Option<(String, usize)> = None;
    for (value, count) in counts {
        if best.as_ref().is_none_or(|(_, c)| count > *c) {
            best = Some((value, count));
        }
    }
    if let Some((mode, _)) = best {
        fill_string(df, column, &mode)?;
    }
    Ok(())
}"#,
    },
    Helper {
        name: "impute_custom",
        depends_on: &["fill_numeric", "fill_string", "to_number"],
        source: r#"fn impute_custom(df: &mut DataFrame, column: &str, value: &str) -> PolarsResult<()> {
    let dtype = df.column(column)?.dtype().clone();
    if dtype.is_primitive_numeric() {
        let parsed = to_number(value, true)
            .ok_or_else(|| polars_err!(ComputeError: "'{}' is not a number", value))?;
        return fill_numeric(df, column, parsed);
    }
    fill_string(df, column, value)
}"#,
    },
    Helper {
        name: "drop_column",
        depends_on: &[],
        source: r#"fn drop_column(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    df.drop_in_place(column)?;
    Ok(())
}"#,
    },
    Helper {
        name: "iqr_bounds",
        depends_on: &["numeric_values"],
        source: r#"fn iqr_bounds(df: &DataFrame, column: &str) -> PolarsResult<Option<(f64, f64)>> {
    let mut values: Vec<f64> = numeric_values(df, column)?.into_iter().flatten().collect();
    if values.is_empty() {
        return Ok(None);
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let q1 = values[((n as f64 * 0.25) as usize).min(n - 1)];
    let q3 = values[((n as f64 * 0.75) as usize).min(n - 1)];
    let iqr = q3 - q1;
    Ok(Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr)))
}"#,
    },
    Helper {
        name: "cap_outliers",
        depends_on: &["numeric_values", "iqr_bounds"],
        source: r#"fn cap_outliers(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let Some((lower, upper)) = iqr_bounds(df, column)? else {
        return Ok(());
    };
    let capped: Vec<Option<f64>> = numeric_values(df, column)?
        .into_iter()
        .map(|v| v.map(|x| x.clamp(lower, upper)))
        .collect();
    df.replace(column, Series::new(column.into(), capped))?;
    Ok(())
}"#,
    },
    Helper {
        name: "remove_outliers",
        depends_on: &["numeric_values", "iqr_bounds"],
        source: r#"fn remove_outliers(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let Some((lower, upper)) = iqr_bounds(df, column)? else {
        return Ok(());
    };
    let keep: Vec<bool> = numeric_values(df, column)?
        .into_iter()
        .map(|v| v.is_none_or(|x| x >= lower && x <= upper))
        .collect();
    *df = df.filter(&BooleanChunked::from_slice("mask".into(), &keep))?;
    Ok(())
}"#,
    },
    Helper {
        name: "flag_outliers",
        depends_on: &["numeric_values", "iqr_bounds"],
        source: r#"fn flag_outliers(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let Some((lower, upper)) = iqr_bounds(df, column)? else {
        return Ok(());
    };
    let flags: Vec<bool> = numeric_values(df, column)?
        .into_iter()
        .map(|v| v.is_some_and(|x| x < lower || x > upper))
        .collect();
    let name = format!("{column}_outlier_flag");
    df.with_column(Series::new(name.as_str().into(), flags))?;
    Ok(())
}"#,
    },
    Helper {
        name: "replace_strings",
        depends_on: &[],
        source: r#"fn replace_strings(
    df: &mut DataFrame,
    column: &str,
    f: impl Fn(&str) -> Option<String>,
) -> PolarsResult<()> {
    let series = df.column(column)?.as_materialized_series().clone();
    let values: Vec<Option<String>> = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| f(s).unwrap_or_else(|| s.to_string())))
        .collect();
    df.replace(column, Series::new(column.into(), values))?;
    Ok(())
}"#,
    },
    Helper {
        name: "trim_whitespace",
        depends_on: &["replace_strings"],
        source: r#"fn trim_whitespace(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    replace_strings(df, column, |s| Some(s.trim().to_string()))
}"#,
    },
    Helper {
        name: "repair_encoding",
        depends_on: &["replace_strings"],
        source: r#"fn repair_encoding(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    const CP1252: &str = "€\u{80}‚\u{82}ƒ\u{83}„\u{84}…\u{85}†\u{86}‡\u{87}ˆ\u{88}‰\u{89}Š\u{8A}‹\u{8B}Œ\u{8C}Ž\u{8E}‘\u{91}’\u{92}“\u{93}”\u{94}•\u{95}–\u{96}—\u{97}˜\u{98}™\u{99}š\u{9A}›\u{9B}œ\u{9C}ž\u{9E}Ÿ\u{9F}";
    let table: Vec<(char, u8)> = CP1252
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| (pair[0], pair[1] as u8))
        .collect();
    replace_strings(df, column, |s| {
        let mut text = s.to_string();
        if !s.is_ascii() {
            let bytes: Option<Vec<u8>> = s
                .chars()
                .map(|c| {
                    if (c as u32) < 0x100 {
                        Some(c as u32 as u8)
                    } else {
                        table.iter().find(|(ch, _)| *ch == c).map(|(_, b)| *b)
                    }
                })
                .collect();
            if let Some(repaired) = bytes.and_then(|b| String::from_utf8(b).ok()) {
                text = repaired;
            }
        }
        Some(
            text.chars()
                .filter(|c| *c != '\u{FFFD}' && (!c.is_control() || matches!(c, '\t' | '\n' | '\r')))
                .collect(),
        )
    })
}"#,
    },
    Helper {
        name: "standardize_dates",
        depends_on: &["replace_strings"],
        source: r#"fn standardize_dates(df: &mut DataFrame, column: &str, layouts: &[&str]) -> PolarsResult<()> {
    replace_strings(df, column, |s| {
        layouts.iter().find_map(|layout| {
            chrono::NaiveDate::parse_from_str(s.trim(), layout)
                .ok()
                .map(|date| date.format("%Y-%m-%d").to_string())
        })
    })
}"#,
    },
    Helper {
        name: "map_categories",
        depends_on: &["replace_strings"],
        source: r#"fn map_categories(df: &mut DataFrame, column: &str, mapping: &[(&str, &str)]) -> PolarsResult<()> {
    replace_strings(df, column, |s| {
        let key = s.trim();
        mapping
            .iter()
            .find(|(variant, _)| *variant == key)
            .map(|(_, canonical)| canonical.to_string())
    })
}"#,
    },
    Helper {
        name: "to_number",
        depends_on: &[],
        source: r#"fn to_number(value: &str, strip_formatting: bool) -> Option<f64> {
    let cleaned: String = if strip_formatting {
        value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ',' | '$' | '%' | '€' | '£' | ' '))
            .collect()
    } else {
        value.trim().to_string()
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}"#,
    },
    Helper {
        name: "to_numeric",
        depends_on: &["to_number"],
        source: r#"fn to_numeric(
    df: &mut DataFrame,
    column: &str,
    strip_formatting: bool,
    integer: bool,
) -> PolarsResult<()> {
    let series = df.column(column)?.as_materialized_series().clone();
    if series.dtype().is_primitive_numeric() {
        let dtype = if integer { DataType::Int64 } else { DataType::Float64 };
        df.replace(column, series.cast(&dtype)?)?;
        return Ok(());
    }
    let parsed: Vec<Option<f64>> = series
        .str()?
        .into_iter()
        .map(|v| v.and_then(|s| to_number(s, strip_formatting)))
        .collect();
    let integral = parsed.iter().flatten().all(|v| v.fract() == 0.0);
    let new_series = if integer && integral {
        let ints: Vec<Option<i64>> = parsed.iter().map(|v| v.map(|x| x as i64)).collect();
        Series::new(column.into(), ints)
    } else {
        Series::new(column.into(), parsed)
    };
    df.replace(column, new_series)?;
    Ok(())
}"#,
    },
    Helper {
        name: "to_boolean",
        depends_on: &[],
        source: r#"fn to_boolean(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
    let series = df.column(column)?.as_materialized_series().clone();
    if series.dtype() == &DataType::Boolean {
        return Ok(());
    }
    let parsed: Vec<Option<bool>> = series
        .str()?
        .into_iter()
        .map(|v| {
            v.and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "t" | "y" | "on" => Some(true),
                "false" | "no" | "f" | "n" | "off" => Some(false),
                _ => None,
            })
        })
        .collect();
    df.replace(column, Series::new(column.into(), parsed))?;
    Ok(())
}"#,
    },
];

pub(crate) fn helper(name: &str) -> Option<&'static Helper> {
    HELPERS.iter().find(|h| h.name == name)
}
