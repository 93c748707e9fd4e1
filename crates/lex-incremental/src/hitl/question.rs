//! HITL questions built from rules that need a human decision.

use crate::types::{ColumnAnalysis, HitlAction, PreprocessingRule, RuleType, SampleAnalysis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    YesNo,
    Numeric,
    Text,
    Confirmation,
}

/// Extra value an option carries into the rule when selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionHint {
    /// Day/month order for ambiguous dates.
    DayFirst(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HITLOption {
    pub key: String,
    pub label: String,
    pub description: String,
    pub action: HitlAction,
    pub recommended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<OptionHint>,
}

impl HITLOption {
    fn new(key: &str, label: &str, description: impl Into<String>, action: HitlAction) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            description: description.into(),
            action,
            recommended: false,
            hint: None,
        }
    }

    fn with_hint(mut self, hint: OptionHint) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// What the reviewer needs to know to answer a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HITLContext {
    pub pattern: String,
    pub columns: Vec<String>,
    pub statistics: BTreeMap<String, serde_json::Value>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HITLQuestion {
    /// `q-<rule id>`
    pub id: String,
    pub rule_id: String,
    pub question_type: QuestionType,
    pub context: HITLContext,
    pub prompt: String,
    pub options: Vec<HITLOption>,
    pub recommended_option: String,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

impl HITLQuestion {
    pub fn id_for(rule_id: &str) -> String {
        format!("q-{rule_id}")
    }

    pub fn option(&self, key: &str) -> Option<&HITLOption> {
        self.options.iter().find(|o| o.key == key)
    }

    pub fn recommended(&self) -> Option<&HITLOption> {
        self.option(&self.recommended_option)
    }
}

/// Builds questions for rules.
pub struct QuestionGenerator;

impl QuestionGenerator {
    /// One question per pending rule that requires a human decision.
    pub fn generate_all(
        rules: &[PreprocessingRule],
        analysis: Option<&SampleAnalysis>,
    ) -> Vec<HITLQuestion> {
        rules
            .iter()
            .filter(|r| r.requires_hitl && r.is_pending())
            .map(|rule| {
                let column = analysis.and_then(|a| a.column(rule.column()));
                Self::generate(rule, column)
            })
            .collect()
    }

    pub fn generate(rule: &PreprocessingRule, column: Option<&ColumnAnalysis>) -> HITLQuestion {
        let col = rule.column();
        let (question_type, prompt, mut options) = match rule.rule_type {
            RuleType::MissingValueStrategy => {
                let numeric = matches!(
                    rule.action,
                    HitlAction::ImputeMedian | HitlAction::ImputeMean
                ) || column.is_some_and(|c| c.data_type.is_numeric());
                let mut options = Vec::new();
                if numeric {
                    options.push(HITLOption::new(
                        "median",
                        "Fill with median",
                        "Robust to skew and outliers",
                        HitlAction::ImputeMedian,
                    ));
                    options.push(HITLOption::new(
                        "mean",
                        "Fill with mean",
                        "Preserves the column average",
                        HitlAction::ImputeMean,
                    ));
                }
                options.push(HITLOption::new(
                    "mode",
                    "Fill with most frequent value",
                    "Keeps the dominant category",
                    HitlAction::ImputeMode,
                ));
                options.push(HITLOption::new(
                    "custom",
                    "Fill with a custom value",
                    "Provide the value in the answer",
                    HitlAction::ImputeCustom,
                ));
                options.push(HITLOption::new(
                    "drop",
                    "Drop the column",
                    "Remove the column from the dataset",
                    HitlAction::Delete,
                ));
                options.push(HITLOption::new(
                    "keep",
                    "Keep missing values",
                    "Leave nulls in place",
                    HitlAction::KeepAsIs,
                ));
                (
                    QuestionType::MultipleChoice,
                    format!("How should missing values in '{col}' be handled?"),
                    options,
                )
            }
            RuleType::OutlierHandling => (
                QuestionType::MultipleChoice,
                format!("How should outliers in '{col}' be handled?"),
                vec![
                    HITLOption::new(
                        "cap",
                        "Cap at IQR fences",
                        "Clamp values to [Q1 - 1.5 IQR, Q3 + 1.5 IQR]",
                        HitlAction::CapOutliers,
                    ),
                    HITLOption::new(
                        "remove",
                        "Remove rows",
                        "Drop rows whose value lies outside the fences",
                        HitlAction::RemoveOutliers,
                    ),
                    HITLOption::new(
                        "flag",
                        "Flag for review",
                        format!("Add a boolean '{col}_outlier_flag' column"),
                        HitlAction::FlagForReview,
                    ),
                    HITLOption::new(
                        "keep",
                        "Keep as is",
                        "Outliers are genuine values",
                        HitlAction::KeepAsIs,
                    ),
                ],
            ),
            RuleType::CategoryMapping => (
                QuestionType::YesNo,
                format!("Merge the spelling variants found in '{col}'?"),
                vec![
                    HITLOption::new(
                        "yes",
                        "Merge",
                        "Rewrite every variant as its most common spelling",
                        HitlAction::MergeCategories,
                    ),
                    HITLOption::new(
                        "no",
                        "Keep separate",
                        "The variants are distinct categories",
                        HitlAction::KeepAsIs,
                    ),
                ],
            ),
            RuleType::BusinessLogic => (
                QuestionType::YesNo,
                format!("'{col}' looks like an identifier. Remove it?"),
                vec![
                    HITLOption::new(
                        "yes",
                        "Remove",
                        "Identifiers carry no signal for modeling",
                        HitlAction::Delete,
                    ),
                    HITLOption::new(
                        "no",
                        "Keep",
                        "The column is meaningful",
                        HitlAction::KeepAsIs,
                    ),
                ],
            ),
            RuleType::DateFormatStandardization => (
                QuestionType::MultipleChoice,
                format!("Dates in '{col}' could be day/month or month/day. Which order is used?"),
                vec![
                    HITLOption::new(
                        "day_first",
                        "Day first (DD/MM/YYYY)",
                        "Read 01/02/2023 as 1 February 2023",
                        HitlAction::ConvertType,
                    )
                    .with_hint(OptionHint::DayFirst(true)),
                    HITLOption::new(
                        "month_first",
                        "Month first (MM/DD/YYYY)",
                        "Read 01/02/2023 as 2 January 2023",
                        HitlAction::ConvertType,
                    )
                    .with_hint(OptionHint::DayFirst(false)),
                    HITLOption::new(
                        "keep",
                        "Keep as text",
                        "Leave the dates unchanged",
                        HitlAction::KeepAsIs,
                    ),
                ],
            ),
            _ => (
                QuestionType::Confirmation,
                format!("Apply this change to '{col}'? {}", rule.description),
                vec![
                    HITLOption::new(
                        "apply",
                        "Apply",
                        rule.description.clone(),
                        rule.action,
                    ),
                    HITLOption::new(
                        "skip",
                        "Skip",
                        "Leave the column unchanged",
                        HitlAction::KeepAsIs,
                    ),
                ],
            ),
        };

        let recommended_key = Self::recommended_key(rule, &options);
        for option in &mut options {
            option.recommended = option.key == recommended_key;
        }

        HITLQuestion {
            id: HITLQuestion::id_for(&rule.id),
            rule_id: rule.id.clone(),
            question_type,
            context: Self::context(rule, column),
            prompt,
            options,
            rationale: Self::rationale(rule),
            recommended_option: recommended_key,
            created_at: Utc::now(),
        }
    }

    /// The option whose action (and hint) matches the rule's current proposal.
    fn recommended_key(rule: &PreprocessingRule, options: &[HITLOption]) -> String {
        let hint = rule.parameters.day_first.map(OptionHint::DayFirst);
        options
            .iter()
            .find(|o| o.action == rule.action && (o.hint.is_none() || o.hint == hint))
            .or_else(|| options.iter().find(|o| o.action == rule.action))
            .or_else(|| options.first())
            .map(|o| o.key.clone())
            .unwrap_or_default()
    }

    fn rationale(rule: &PreprocessingRule) -> String {
        match rule.rule_type {
            RuleType::MissingValueStrategy if rule.action == HitlAction::Delete => {
                "More than half of the values are missing; imputing would invent most of the column".to_string()
            }
            RuleType::MissingValueStrategy => {
                "A central value keeps the distribution while filling gaps".to_string()
            }
            RuleType::OutlierHandling => {
                "Capping limits the influence of extreme values without losing rows".to_string()
            }
            RuleType::CategoryMapping => {
                "Variants differ only by case or spacing and likely name the same category".to_string()
            }
            RuleType::BusinessLogic => {
                "Nearly every value is unique, which is typical of identifiers".to_string()
            }
            RuleType::DateFormatStandardization => {
                "No value proves the order; day-first is the default".to_string()
            }
            _ => format!("Discovered with confidence {:.2}", rule.confidence),
        }
    }

    fn context(rule: &PreprocessingRule, column: Option<&ColumnAnalysis>) -> HITLContext {
        let mut statistics = BTreeMap::new();
        statistics.insert("confidence".to_string(), serde_json::json!(rule.confidence));
        statistics.insert("observations".to_string(), serde_json::json!(rule.observations));

        if let Some(column) = column {
            statistics.insert(
                "missing_percentage".to_string(),
                serde_json::json!(column.missing_percentage),
            );
            statistics.insert("null_count".to_string(), serde_json::json!(column.null_count));
            if let Some(stats) = &column.numeric {
                statistics.insert("mean".to_string(), serde_json::json!(stats.mean));
                statistics.insert("median".to_string(), serde_json::json!(stats.median));
                statistics.insert("q1".to_string(), serde_json::json!(stats.q1));
                statistics.insert("q3".to_string(), serde_json::json!(stats.q3));
                statistics.insert(
                    "outlier_count".to_string(),
                    serde_json::json!(stats.outlier_count),
                );
            }
            if let Some(stats) = &column.categorical {
                statistics.insert("cardinality".to_string(), serde_json::json!(stats.cardinality));
                statistics.insert(
                    "most_frequent".to_string(),
                    serde_json::json!(stats.most_frequent),
                );
            }
        }
        if !rule.parameters.category_mapping.is_empty() {
            statistics.insert(
                "category_mapping".to_string(),
                serde_json::json!(rule.parameters.category_mapping),
            );
        }
        if !rule.parameters.layouts.is_empty() {
            statistics.insert("layouts".to_string(), serde_json::json!(rule.parameters.layouts));
        }

        HITLContext {
            pattern: rule.pattern.clone(),
            columns: rule.columns.clone(),
            statistics,
            summary: rule.description.clone(),
        }
    }
}
