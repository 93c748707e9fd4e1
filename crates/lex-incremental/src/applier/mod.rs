//! Rule application.
//!
//! Rules are validated and applied one at a time. A rule either transforms
//! the table completely or leaves it untouched; its failure is recorded in
//! its [`RuleApplicationResult`] rather than raised.

pub mod transforms;

use crate::discovery::sort_rules;
use crate::error::{IncrementalError, Result};
use crate::types::{
    ColumnDataType, HitlAction, PreprocessingRule, RuleApplicationBatchResult,
    RuleApplicationResult, RuleType,
};
use crate::workflow::progress::CancellationToken;
use polars::prelude::*;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

/// Callback invoked before each rule with `(index, total, rule)`.
pub type ApplyProgress<'a> = &'a dyn Fn(usize, usize, &PreprocessingRule);

fn failure(
    rule: &PreprocessingRule,
    rows: usize,
    error: String,
    started: Instant,
) -> RuleApplicationResult {
    RuleApplicationResult {
        rule: rule.clone(),
        success: false,
        rows_affected: 0,
        rows_skipped: rows,
        error: Some(error),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Check that every column the rule references exists.
///
/// Returns `None` when the rule can be applied, or the failed result otherwise.
pub fn validate_rule(df: &DataFrame, rule: &PreprocessingRule) -> Option<RuleApplicationResult> {
    let started = Instant::now();
    if rule.columns.is_empty() {
        return Some(failure(
            rule,
            df.height(),
            "rule does not reference any column".to_string(),
            started,
        ));
    }

    let missing: Vec<&str> = rule
        .columns
        .iter()
        .filter(|c| df.column(c).is_err())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return None;
    }

    Some(failure(
        rule,
        df.height(),
        format!("column(s) not found: {}", missing.join(", ")),
        started,
    ))
}

/// Whether the rule removes its columns from the table.
pub fn drops_columns(rule: &PreprocessingRule) -> bool {
    rule.action == HitlAction::Delete
        && matches!(
            rule.rule_type,
            RuleType::MissingValueStrategy | RuleType::BusinessLogic
        )
}

/// Approved rules in application order, without rules that touch a column
/// another approved rule drops.
///
/// Returns the plan and the ids of the rules left out.
pub fn execution_plan(rules: &[PreprocessingRule]) -> (Vec<PreprocessingRule>, Vec<String>) {
    let mut approved: Vec<PreprocessingRule> =
        rules.iter().filter(|r| r.is_approved()).cloned().collect();
    sort_rules(&mut approved);

    let dropped: HashSet<&str> = approved
        .iter()
        .filter(|r| drops_columns(r))
        .flat_map(|r| r.columns.iter().map(String::as_str))
        .collect();

    let mut plan = Vec::with_capacity(approved.len());
    let mut superseded = Vec::new();
    for rule in &approved {
        if !drops_columns(rule) && rule.columns.iter().any(|c| dropped.contains(c.as_str())) {
            superseded.push(rule.id.clone());
        } else {
            plan.push(rule.clone());
        }
    }
    (plan, superseded)
}

/// Transform one column according to the rule's type and action.
fn transform_column(
    df: &mut DataFrame,
    rule: &PreprocessingRule,
    column: &str,
) -> anyhow::Result<usize> {
    let params = &rule.parameters;
    match (rule.rule_type, rule.action) {
        (_, HitlAction::KeepAsIs) => Ok(0),

        (RuleType::MissingValueStrategy | RuleType::BusinessLogic, HitlAction::Delete) => {
            transforms::drop_column(df, column)
        }
        (RuleType::MissingValueStrategy, HitlAction::ImputeMean) => transforms::impute_mean(df, column),
        (RuleType::MissingValueStrategy, HitlAction::ImputeMedian) => {
            transforms::impute_median(df, column)
        }
        (RuleType::MissingValueStrategy, HitlAction::ImputeMode) => transforms::impute_mode(df, column),
        (RuleType::MissingValueStrategy, HitlAction::ImputeCustom) => {
            let value = params
                .custom_value
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("custom imputation without a value"))?;
            transforms::impute_custom(df, column, value)
        }

        (RuleType::OutlierHandling, HitlAction::CapOutliers) => transforms::cap_outliers(df, column),
        (RuleType::OutlierHandling, HitlAction::RemoveOutliers) => {
            transforms::remove_outliers(df, column)
        }
        (RuleType::OutlierHandling, HitlAction::FlagForReview) => transforms::flag_outliers(df, column),

        (RuleType::WhitespaceNormalization, HitlAction::ConvertType) => {
            transforms::trim_whitespace(df, column)
        }
        (RuleType::EncodingNormalization, HitlAction::ConvertType) => {
            transforms::repair_encoding(df, column)
        }
        (RuleType::NumericFormatStandardization, HitlAction::ConvertType) => {
            let target = params.target_type.unwrap_or(ColumnDataType::Float);
            transforms::standardize_numeric_format(df, column, target)
        }
        (RuleType::TypeConversion, HitlAction::ConvertType) => match params.target_type {
            Some(ColumnDataType::Boolean) => transforms::convert_boolean(df, column),
            Some(target @ (ColumnDataType::Integer | ColumnDataType::Float)) => {
                transforms::convert_numeric(df, column, target)
            }
            other => anyhow::bail!(
                "unsupported conversion target {}",
                other.map(|t| t.as_str()).unwrap_or("none")
            ),
        },
        (RuleType::DateFormatStandardization, HitlAction::ConvertType) => {
            transforms::standardize_dates(df, column, &params.layouts, params.day_first.unwrap_or(true))
        }
        (RuleType::CategoryMapping, HitlAction::MergeCategories) => {
            transforms::map_categories(df, column, &params.category_mapping)
        }

        (rule_type, action) => anyhow::bail!(
            "action '{}' is not supported for {} rules",
            action.as_str(),
            rule_type.as_str()
        ),
    }
}

/// Apply one rule to `df`.
///
/// The transformation runs on a copy; `df` is replaced only on success.
pub fn apply_rule(df: &mut DataFrame, rule: &PreprocessingRule) -> RuleApplicationResult {
    if let Some(invalid) = validate_rule(df, rule) {
        warn!(rule = %rule.id, error = ?invalid.error, "Rule validation failed");
        return invalid;
    }

    let started = Instant::now();
    let height = df.height();
    let mut working = df.clone();

    let mut rows_affected = 0;
    for column in &rule.columns {
        match transform_column(&mut working, rule, column) {
            Ok(affected) => rows_affected += affected,
            Err(e) => {
                warn!(rule = %rule.id, column = %column, error = %e, "Rule application failed");
                return failure(rule, height, format!("{column}: {e}"), started);
            }
        }
    }

    *df = working;
    debug!(rule = %rule.id, rows_affected, "Applied rule");
    RuleApplicationResult {
        rule: rule.clone(),
        success: true,
        rows_affected,
        rows_skipped: height.saturating_sub(rows_affected),
        error: None,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Apply rules in order.
///
/// Cancellation is checked before each rule. When `continue_on_failure` is
/// false the batch stops at the first failed rule and records its id in
/// `halted_by`.
pub fn apply_rules(
    df: &mut DataFrame,
    rules: &[PreprocessingRule],
    progress: Option<ApplyProgress<'_>>,
    cancel: &CancellationToken,
    continue_on_failure: bool,
) -> Result<RuleApplicationBatchResult> {
    let started = Instant::now();
    let mut batch = RuleApplicationBatchResult {
        total_rules: rules.len(),
        ..Default::default()
    };

    for (index, rule) in rules.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(IncrementalError::Cancelled);
        }
        if let Some(report) = progress {
            report(index, rules.len(), rule);
        }

        let result = apply_rule(df, rule);
        let success = result.success;
        batch.results.push(result);
        if success {
            batch.successful += 1;
        } else {
            batch.failed += 1;
            if !continue_on_failure {
                batch.halted_by = Some(rule.id.clone());
                break;
            }
        }
    }

    batch.total_duration_ms = started.elapsed().as_millis() as u64;
    debug!(
        total = batch.total_rules,
        successful = batch.successful,
        failed = batch.failed,
        "Applied rule batch"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleParameters;
    use std::cell::Cell;

    fn rule(rule_type: RuleType, column: &str, action: HitlAction) -> PreprocessingRule {
        PreprocessingRule::new(rule_type, vec![column.to_string()], "p", "d", action, 1)
    }

    fn table() -> DataFrame {
        df! {
            "age" => [Some(10.0), None, Some(30.0)],
            "name" => [" a", "b ", "c"],
        }
        .unwrap()
    }

    #[test]
    fn test_missing_column_is_reported_not_raised() {
        let df = table();
        let r = rule(RuleType::MissingValueStrategy, "ghost", HitlAction::ImputeMedian);
        let result = validate_rule(&df, &r).unwrap();
        assert!(!result.success);
        assert_eq!(result.rows_affected, 0);
        assert_eq!(result.rows_skipped, 3);
        assert!(result.error.unwrap().contains("ghost"));

        assert!(validate_rule(&df, &rule(RuleType::OutlierHandling, "age", HitlAction::CapOutliers)).is_none());
    }

    #[test]
    fn test_apply_rule_success() {
        let mut df = table();
        let result = apply_rule(
            &mut df,
            &rule(RuleType::MissingValueStrategy, "age", HitlAction::ImputeMean),
        );
        assert!(result.success);
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.rows_skipped, 2);
        assert_eq!(df.column("age").unwrap().null_count(), 0);
    }

    #[test]
    fn test_failed_rule_leaves_table_untouched() {
        let mut df = table();
        let before = df.clone();
        let result = apply_rule(
            &mut df,
            &rule(RuleType::MissingValueStrategy, "name", HitlAction::ImputeMean),
        );
        assert!(!result.success);
        assert!(df.equals_missing(&before));
    }

    #[test]
    fn test_unsupported_combination_fails() {
        let mut df = table();
        let result = apply_rule(
            &mut df,
            &rule(RuleType::WhitespaceNormalization, "name", HitlAction::CapOutliers),
        );
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not supported"));
    }

    #[test]
    fn test_apply_rules_halts_on_failure() {
        let mut df = table();
        let rules = vec![
            rule(RuleType::WhitespaceNormalization, "name", HitlAction::ConvertType),
            rule(RuleType::MissingValueStrategy, "ghost", HitlAction::ImputeMedian),
            rule(RuleType::MissingValueStrategy, "age", HitlAction::ImputeMedian),
        ];
        let calls = Cell::new(0);
        let progress = |_: usize, _: usize, _: &PreprocessingRule| calls.set(calls.get() + 1);

        let batch = apply_rules(&mut df, &rules, Some(&progress), &CancellationToken::new(), false)
            .unwrap();
        assert_eq!(batch.successful, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.halted_by.as_deref(), Some("missing_value_strategy:ghost"));
        assert_eq!(calls.get(), 2);
        assert_eq!(df.column("age").unwrap().null_count(), 1);
    }

    #[test]
    fn test_apply_rules_continues_on_failure() {
        let mut df = table();
        let mut convert = rule(RuleType::TypeConversion, "name", HitlAction::ConvertType);
        convert.parameters = RuleParameters {
            target_type: Some(ColumnDataType::Unknown),
            ..Default::default()
        };
        let rules = vec![
            convert,
            rule(RuleType::MissingValueStrategy, "age", HitlAction::ImputeMedian),
        ];
        let batch = apply_rules(&mut df, &rules, None, &CancellationToken::new(), true).unwrap();
        assert_eq!(batch.successful, 1);
        assert_eq!(batch.failed, 1);
        assert!(batch.halted_by.is_none());
        assert_eq!(batch.error_rate(), 0.5);
    }

    #[test]
    fn test_execution_plan_skips_dropped_columns() {
        let approve = |mut r: PreprocessingRule| {
            r.approval = crate::types::ApprovalState::Approved;
            r
        };
        let rules = vec![
            approve(rule(RuleType::OutlierHandling, "id", HitlAction::CapOutliers)),
            approve(rule(RuleType::BusinessLogic, "id", HitlAction::Delete)),
            approve(rule(RuleType::MissingValueStrategy, "age", HitlAction::ImputeMedian)),
            rule(RuleType::WhitespaceNormalization, "name", HitlAction::ConvertType),
        ];
        let (plan, superseded) = execution_plan(&rules);
        let ids: Vec<&str> = plan.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["business_logic:id", "missing_value_strategy:age"]);
        assert_eq!(superseded, vec!["outlier_handling:id".to_string()]);
    }

    #[test]
    fn test_apply_rules_cancelled() {
        let mut df = table();
        let token = CancellationToken::new();
        token.cancel();
        let err = apply_rules(
            &mut df,
            &[rule(RuleType::MissingValueStrategy, "age", HitlAction::ImputeMedian)],
            None,
            &token,
            true,
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
