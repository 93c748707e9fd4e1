//! Preprocessing routine generated by lex-incremental.
//!
//! Replays 5 approved rule(s) in application order.

pub mod preprocessing {
    use polars::prelude::*;

    /// Applies the recorded preprocessing steps to a table.
    #[derive(Debug, Clone, Default)]
    pub struct PreprocessingScript {
        _sealed: (),
    }

    impl PreprocessingScript {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn apply(&self, df: DataFrame) -> PolarsResult<DataFrame> {
            let mut df = df;
            require_columns(&df, &["active", "amount", "city", "income", "score"])?;
            // 1. Trim surrounding whitespace in city
            trim_whitespace(&mut df, "city")?;
            // 2. Strip currency and thousands formatting from amount
            to_numeric(&mut df, "amount", true, false)?;
            // 3. Convert yes/no text in active to booleans
            to_boolean(&mut df, "active")?;
            // 4. Fill missing score values with the median
            impute_median(&mut df, "score")?;
            // 5. Cap income outliers at the IQR fences
            cap_outliers(&mut df, "income")?;
            Ok(df)
        }
    }

    fn require_columns(df: &DataFrame, columns: &[&str]) -> PolarsResult<()> {
        for column in columns {
            if df.column(column).is_err() {
                polars_bail!(ColumnNotFound: "{}", column);
            }
        }
        Ok(())
    }

    fn numeric_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
        let series = df
            .column(column)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        Ok(series.f64()?.into_iter().collect())
    }

    fn fill_numeric(df: &mut DataFrame, column: &str, value: f64) -> PolarsResult<()> {
        let filled: Vec<f64> = numeric_values(df, column)?
            .into_iter()
            .map(|v| v.unwrap_or(value))
            .collect();
        df.replace(column, Series::new(column.into(), filled))?;
        Ok(())
    }

    fn impute_median(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
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
    }

    fn iqr_bounds(df: &DataFrame, column: &str) -> PolarsResult<Option<(f64, f64)>> {
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
    }

    fn cap_outliers(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
        let Some((lower, upper)) = iqr_bounds(df, column)? else {
            return Ok(());
        };
        let capped: Vec<Option<f64>> = numeric_values(df, column)?
            .into_iter()
            .map(|v| v.map(|x| x.clamp(lower, upper)))
            .collect();
        df.replace(column, Series::new(column.into(), capped))?;
        Ok(())
    }

    fn replace_strings(
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
    }

    fn trim_whitespace(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
        replace_strings(df, column, |s| Some(s.trim().to_string()))
    }

    fn to_number(value: &str, strip_formatting: bool) -> Option<f64> {
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
    }

    fn to_numeric(
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
    }

    fn to_boolean(df: &mut DataFrame, column: &str) -> PolarsResult<()> {
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
    }
}
