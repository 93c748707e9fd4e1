//! Stratified sampling that preserves the class proportions of a label column.

use super::{take_rows, target_size, validate_ratio};
use crate::error::{IncrementalError, Result};
use crate::utils::string_values;
use polars::prelude::*;
use rand::prelude::*;
use std::collections::BTreeMap;

/// Label value of a row. Nulls form their own stratum.
pub type StratumKey = Option<String>;

/// Group row indices by the value of `label_column`.
pub fn strata(df: &DataFrame, label_column: &str) -> Result<BTreeMap<StratumKey, Vec<usize>>> {
    let column = df
        .column(label_column)
        .map_err(|_| IncrementalError::ColumnNotFound(label_column.to_string()))?;
    let values = string_values(column.as_materialized_series())?;

    let mut groups: BTreeMap<StratumKey, Vec<usize>> = BTreeMap::new();
    for (idx, value) in values.into_iter().enumerate() {
        groups.entry(value).or_default().push(idx);
    }
    Ok(groups)
}

/// Split `k` rows across strata proportionally to their sizes.
///
/// Uses largest-remainder apportionment so the quotas sum to exactly `k`.
/// Ties on the remainder go to the larger stratum, then to key order.
pub fn apportion(sizes: &[usize], k: usize) -> Vec<usize> {
    let n: usize = sizes.iter().sum();
    if n == 0 {
        return vec![0; sizes.len()];
    }

    let exact: Vec<f64> = sizes
        .iter()
        .map(|&size| k as f64 * size as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact
        .iter()
        .zip(sizes)
        .map(|(e, &size)| (e.floor() as usize).min(size))
        .collect();

    let assigned: usize = quotas.iter().sum();
    let mut remaining = k.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra)
            .then_with(|| sizes[b].cmp(&sizes[a]))
            .then_with(|| a.cmp(&b))
    });

    for idx in order.into_iter().cycle().take(sizes.len() * 2) {
        if remaining == 0 {
            break;
        }
        if quotas[idx] < sizes[idx] {
            quotas[idx] += 1;
            remaining -= 1;
        }
    }
    quotas
}

/// Reservoir sampling (algorithm R): `m` items chosen uniformly from `items`.
fn reservoir(items: &[usize], m: usize, rng: &mut StdRng) -> Vec<usize> {
    if m >= items.len() {
        return items.to_vec();
    }
    let mut chosen: Vec<usize> = items[..m].to_vec();
    for (i, &item) in items.iter().enumerate().skip(m) {
        let j = rng.gen_range(0..=i);
        if j < m {
            chosen[j] = item;
        }
    }
    chosen
}

/// Row indices for a stratified sample, sorted in source order.
pub fn stratified_indices(
    df: &DataFrame,
    label_column: &str,
    ratio: f64,
    seed: u64,
) -> Result<Vec<usize>> {
    validate_ratio(ratio)?;
    let groups = strata(df, label_column)?;
    let k = target_size(df.height(), ratio);

    let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
    let quotas = apportion(&sizes, k);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices = Vec::with_capacity(k);
    for (members, quota) in groups.values().zip(quotas) {
        indices.extend(reservoir(members, quota, &mut rng));
    }
    indices.sort_unstable();
    Ok(indices)
}

/// Draw a sample whose class proportions follow those of `label_column`.
pub fn stratified_sample(
    df: &DataFrame,
    label_column: &str,
    ratio: f64,
    seed: u64,
) -> Result<DataFrame> {
    validate_ratio(ratio)?;
    if df.height() == 0 {
        if df.column(label_column).is_err() {
            return Err(IncrementalError::ColumnNotFound(label_column.to_string()));
        }
        return Ok(df.clear());
    }
    if ratio >= 1.0 {
        return Ok(df.clone());
    }
    let indices = stratified_indices(df, label_column, ratio, seed)?;
    Ok(take_rows(df, &indices)?)
}

/// Share of each stratum in a table.
pub fn class_proportions(df: &DataFrame, label_column: &str) -> Result<BTreeMap<StratumKey, f64>> {
    let groups = strata(df, label_column)?;
    let n = df.height().max(1) as f64;
    Ok(groups
        .into_iter()
        .map(|(key, members)| (key, members.len() as f64 / n))
        .collect())
}
