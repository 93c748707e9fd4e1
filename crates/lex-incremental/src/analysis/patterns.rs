//! Structural pattern detection for column values.
//!
//! Patterns describe how values are written rather than what they mean:
//! padding, dates in text, numbers in text, spelling variants, broken
//! encodings and identifier-like columns.

use crate::types::{ColumnDataType, DetectedPattern};
use crate::utils::{has_numeric_formatting, parse_boolean_string, parse_numeric_string, string_values};
use anyhow::Result;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Share of non-empty values that must match for a type pattern to be reported.
const TYPE_MATCH_THRESHOLD: f64 = 0.9;
const DATE_MATCH_THRESHOLD: f64 = 0.8;
/// Minimum non-null values before a column can look like an identifier.
const IDENTIFIER_MIN_VALUES: usize = 20;

/// Date layouts with a fixed field order.
static FIXED_DATE_LAYOUTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").expect("Invalid regex: YYYY-MM-DD"), "%Y-%m-%d"),
        (Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}$").expect("Invalid regex: YYYY/MM/DD"), "%Y/%m/%d"),
        (
            Regex::new(r"^\d{1,2} [A-Za-z]{3,9} \d{4}$").expect("Invalid regex: DD Month YYYY"),
            "%d %B %Y",
        ),
        (
            Regex::new(r"^[A-Za-z]{3,9} \d{1,2}, \d{4}$").expect("Invalid regex: Month DD, YYYY"),
            "%B %d, %Y",
        ),
    ]
});

/// Date layouts whose first two fields may be day/month or month/day.
/// The layout is stored day-first; see [`resolve_layout`].
static DAY_MONTH_LAYOUTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"^(\d{1,2})/(\d{1,2})/\d{4}$").expect("Invalid regex: NN/NN/YYYY"), "%d/%m/%Y"),
        (Regex::new(r"^(\d{1,2})-(\d{1,2})-\d{4}$").expect("Invalid regex: NN-NN-YYYY"), "%d-%m-%Y"),
        (Regex::new(r"^(\d{1,2})\.(\d{1,2})\.\d{4}$").expect("Invalid regex: NN.NN.YYYY"), "%d.%m.%Y"),
    ]
});

static MOJIBAKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Ã[\x{80}-\x{BF}]|â€|Â[\x{A0}-\x{BF}]|\x{FFFD}").expect("Invalid regex: mojibake")
});

static IDENTIFIER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:id|uuid|guid|key|identifier)$|[_\- ](?i:id|uuid|guid|key)$|[a-z](?:Id|ID)$")
        .expect("Invalid regex: identifier name")
});

/// Rewrite a day-first layout as month-first when `day_first` is false.
///
/// `"%d/%m/%Y"` becomes `"%m/%d/%Y"`; other layouts are returned unchanged.
pub fn resolve_layout(layout: &str, day_first: bool) -> String {
    if !day_first
        && let Some(rest) = layout.strip_prefix("%d")
        && let Some(sep) = rest.chars().next()
        && rest[sep.len_utf8()..].starts_with("%m")
    {
        return format!("%m{sep}%d{}", &rest[sep.len_utf8() + 2..]);
    }
    layout.to_string()
}

/// Whether a value contains mojibake, replacement characters or control characters.
pub fn has_encoding_artifact(value: &str) -> bool {
    MOJIBAKE.is_match(value)
        || value
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Key under which spelling variants of a label are grouped.
pub fn variant_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether a column name reads like an identifier (`id`, `customer_id`, `CustomerID`).
pub fn is_identifier_name(name: &str) -> bool {
    IDENTIFIER_NAME.is_match(name)
}

/// Detect the structural patterns of one column.
pub(crate) fn detect_patterns(
    name: &str,
    series: &Series,
    data_type: ColumnDataType,
) -> Result<Vec<DetectedPattern>> {
    let mut patterns = Vec::new();

    if data_type == ColumnDataType::String {
        let values: Vec<String> = string_values(series)?.into_iter().flatten().collect();

        let padded = values.iter().filter(|v| v.trim() != v.as_str()).count();
        if padded > 0 {
            patterns.push(DetectedPattern::WhitespacePadding { affected: padded });
        }

        let broken = values.iter().filter(|v| has_encoding_artifact(v)).count();
        if broken > 0 {
            patterns.push(DetectedPattern::EncodingArtifacts { affected: broken });
        }

        let trimmed: Vec<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();

        if let Some(date) = detect_dates(&trimmed) {
            patterns.push(date);
        } else if let Some(numeric) = detect_numeric_strings(&trimmed) {
            patterns.push(numeric);
        } else if let Some(boolean) = detect_boolean_strings(&trimmed) {
            patterns.push(boolean);
        } else if let Some(variants) = detect_category_variants(&trimmed) {
            patterns.push(variants);
        }
    }

    if let Some(identifier) = detect_identifier(name, series, data_type, &patterns)? {
        patterns.push(identifier);
    }

    Ok(patterns)
}

fn detect_dates(values: &[&str]) -> Option<DetectedPattern> {
    if values.is_empty() {
        return None;
    }

    let mut layout_counts: HashMap<&'static str, usize> = HashMap::new();
    let mut day_first_evidence = 0usize;
    let mut month_first_evidence = 0usize;
    let mut has_day_month = false;
    let mut matched = 0usize;

    'values: for value in values {
        for (regex, layout) in FIXED_DATE_LAYOUTS.iter() {
            if regex.is_match(value) {
                *layout_counts.entry(*layout).or_insert(0) += 1;
                matched += 1;
                continue 'values;
            }
        }
        for (regex, layout) in DAY_MONTH_LAYOUTS.iter() {
            if let Some(caps) = regex.captures(value) {
                let first: u32 = caps[1].parse().unwrap_or(0);
                let second: u32 = caps[2].parse().unwrap_or(0);
                if first > 12 && second > 12 {
                    continue 'values;
                }
                if first > 12 {
                    day_first_evidence += 1;
                } else if second > 12 {
                    month_first_evidence += 1;
                }
                has_day_month = true;
                *layout_counts.entry(*layout).or_insert(0) += 1;
                matched += 1;
                continue 'values;
            }
        }
    }

    if matched == 0 || (matched as f64) < values.len() as f64 * DATE_MATCH_THRESHOLD {
        return None;
    }

    let mut layouts: Vec<(&'static str, usize)> = layout_counts.into_iter().collect();
    layouts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let day_first = match (day_first_evidence > 0, month_first_evidence > 0) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    };

    Some(DetectedPattern::DateLike {
        layouts: layouts.into_iter().map(|(l, _)| l.to_string()).collect(),
        day_first,
        ambiguous: has_day_month && day_first.is_none(),
        matched,
        unmatched: values.len() - matched,
    })
}

fn detect_numeric_strings(values: &[&str]) -> Option<DetectedPattern> {
    if values.is_empty() {
        return None;
    }
    let parsed: Vec<f64> = values.iter().filter_map(|v| parse_numeric_string(v)).collect();
    let parseable = parsed.len();
    if (parseable as f64) < values.len() as f64 * TYPE_MATCH_THRESHOLD {
        return None;
    }
    Some(DetectedPattern::NumericStrings {
        formatted: values.iter().any(|v| has_numeric_formatting(v)),
        integral: parsed.iter().all(|v| v.fract() == 0.0),
        parseable,
        unparseable: values.len() - parseable,
    })
}

fn detect_boolean_strings(values: &[&str]) -> Option<DetectedPattern> {
    if values.is_empty() {
        return None;
    }
    let parseable = values
        .iter()
        .filter(|v| parse_boolean_string(v).is_some())
        .count();
    if (parseable as f64) < values.len() as f64 * TYPE_MATCH_THRESHOLD {
        return None;
    }
    Some(DetectedPattern::BooleanStrings {
        parseable,
        unparseable: values.len() - parseable,
    })
}

fn detect_category_variants(values: &[&str]) -> Option<DetectedPattern> {
    let mut groups: HashMap<String, BTreeMap<&str, usize>> = HashMap::new();
    for &value in values {
        *groups
            .entry(variant_key(value))
            .or_default()
            .entry(value)
            .or_insert(0) += 1;
    }

    // Mostly-unique columns are not categories.
    if groups.len() * 2 > values.len() {
        return None;
    }

    let mut mapping = BTreeMap::new();
    for spellings in groups.values().filter(|s| s.len() > 1) {
        let mut canonical: Option<(&str, usize)> = None;
        for (&spelling, &count) in spellings {
            if canonical.is_none_or(|(_, best)| count > best) {
                canonical = Some((spelling, count));
            }
        }
        if let Some((canonical, _)) = canonical {
            for &spelling in spellings.keys() {
                if spelling != canonical {
                    mapping.insert(spelling.to_string(), canonical.to_string());
                }
            }
        }
    }

    if mapping.is_empty() {
        None
    } else {
        Some(DetectedPattern::CategoryVariants { mapping })
    }
}

fn detect_identifier(
    name: &str,
    series: &Series,
    data_type: ColumnDataType,
    patterns: &[DetectedPattern],
) -> Result<Option<DetectedPattern>> {
    if !matches!(data_type, ColumnDataType::Integer | ColumnDataType::String) {
        return Ok(None);
    }
    let non_null = series.drop_nulls();
    if non_null.len() < IDENTIFIER_MIN_VALUES {
        return Ok(None);
    }

    let unique_ratio = if data_type == ColumnDataType::String {
        let values: HashSet<String> = string_values(&non_null)?
            .into_iter()
            .flatten()
            .map(|v| v.trim().to_string())
            .collect();
        values.len() as f64 / non_null.len() as f64
    } else {
        non_null.n_unique()? as f64 / non_null.len() as f64
    };

    let typed_text = patterns.iter().any(|p| {
        matches!(
            p,
            DetectedPattern::DateLike { .. } | DetectedPattern::NumericStrings { .. }
        )
    });

    let looks_like_id = (is_identifier_name(name) && unique_ratio >= 0.9)
        || (data_type == ColumnDataType::String && !typed_text && unique_ratio >= 0.95);

    Ok(looks_like_id.then_some(DetectedPattern::LikelyIdentifier { unique_ratio }))
}
