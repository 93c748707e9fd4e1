//! Rule discovery: turns quality issues and structural patterns into
//! candidate preprocessing rules, and merges rules across stages.

use crate::config::AnalysisConfig;
use crate::types::{
    ApprovalState, ColumnAnalysis, ColumnDataType, DetectedPattern, HitlAction, PreprocessingRule,
    QualityIssueKind, RuleParameters, RuleType, SampleAnalysis,
};
use tracing::debug;

/// Weight of the previous confidence when a rule is seen again.
const PREVIOUS_CONFIDENCE_WEIGHT: f64 = 0.4;

/// Counts from merging one stage's rules into the running set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub added: usize,
    pub updated: usize,
}

/// Maps a [`SampleAnalysis`] to candidate rules.
#[derive(Debug, Clone, Default)]
pub struct RuleDiscovery {
    config: AnalysisConfig,
}

impl RuleDiscovery {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Candidate rules for every column of `analysis`, in application order.
    pub fn discover(&self, analysis: &SampleAnalysis) -> Vec<PreprocessingRule> {
        let mut rules: Vec<PreprocessingRule> = analysis
            .columns
            .iter()
            .flat_map(|column| self.discover_column(column, analysis.stage))
            .collect();
        sort_rules(&mut rules);
        debug!(stage = analysis.stage, rules = rules.len(), "Discovered rules");
        rules
    }

    fn discover_column(&self, column: &ColumnAnalysis, stage: u8) -> Vec<PreprocessingRule> {
        let mut rules = Vec::new();
        let name = column.name.clone();

        for pattern in &column.patterns {
            rules.push(rule_for_pattern(&name, pattern, stage));
        }

        if column.null_count > 0 {
            rules.push(self.missing_value_rule(column, stage));
        }

        if let Some(issue) = column
            .issues
            .iter()
            .find(|issue| issue.kind == QualityIssueKind::HighOutliers)
        {
            rules.push(
                PreprocessingRule::new(
                    RuleType::OutlierHandling,
                    vec![name],
                    "high_outliers",
                    format!(
                        "Cap {:.1}% of values in '{}' lying outside 1.5 x IQR",
                        issue.value, column.name
                    ),
                    HitlAction::CapOutliers,
                    stage,
                )
                .with_hitl(true)
                .with_confidence(0.7),
            );
        }

        rules
    }

    fn missing_value_rule(&self, column: &ColumnAnalysis, stage: u8) -> PreprocessingRule {
        let missing = column.missing_percentage;
        let impute = if column.data_type.is_numeric() {
            HitlAction::ImputeMedian
        } else {
            HitlAction::ImputeMode
        };
        let statistic = if impute == HitlAction::ImputeMedian {
            "median"
        } else {
            "most frequent value"
        };

        if missing < self.config.moderate_missing_pct {
            return PreprocessingRule::new(
                RuleType::MissingValueStrategy,
                vec![column.name.clone()],
                "missing_values",
                format!(
                    "Fill {} missing values ({:.1}%) in '{}' with the {}",
                    column.null_count, missing, column.name, statistic
                ),
                impute,
                stage,
            )
            .with_confidence(1.0 - missing / 100.0);
        }

        let (action, description, pattern) = if missing > self.config.high_missing_pct {
            (
                HitlAction::Delete,
                format!("Drop '{}': {:.1}% of values are missing", column.name, missing),
                "high_missing",
            )
        } else {
            (
                impute,
                format!(
                    "Fill {:.1}% missing values in '{}' with the {}",
                    missing, column.name, statistic
                ),
                "moderate_missing",
            )
        };

        PreprocessingRule::new(
            RuleType::MissingValueStrategy,
            vec![column.name.clone()],
            pattern,
            description,
            action,
            stage,
        )
        .with_hitl(true)
        .with_confidence(0.6)
    }
}

fn rule_for_pattern(column: &str, pattern: &DetectedPattern, stage: u8) -> PreprocessingRule {
    let columns = vec![column.to_string()];
    match pattern {
        DetectedPattern::WhitespacePadding { affected } => PreprocessingRule::new(
            RuleType::WhitespaceNormalization,
            columns,
            pattern.name(),
            format!("Trim surrounding whitespace in '{column}' ({affected} values)"),
            HitlAction::ConvertType,
            stage,
        )
        .with_confidence(0.95),

        DetectedPattern::EncodingArtifacts { affected } => PreprocessingRule::new(
            RuleType::EncodingNormalization,
            columns,
            pattern.name(),
            format!("Repair broken text encoding in '{column}' ({affected} values)"),
            HitlAction::ConvertType,
            stage,
        )
        .with_confidence(0.9),

        DetectedPattern::NumericStrings {
            formatted,
            integral,
            parseable,
            unparseable,
        } => {
            let total = (parseable + unparseable).max(1) as f64;
            let target_type = if *integral && !*formatted {
                ColumnDataType::Integer
            } else {
                ColumnDataType::Float
            };
            let parameters = RuleParameters {
                target_type: Some(target_type),
                ..RuleParameters::default()
            };
            if *formatted {
                PreprocessingRule::new(
                    RuleType::NumericFormatStandardization,
                    columns,
                    pattern.name(),
                    format!("Strip currency, percent and thousands formatting from '{column}' and store numbers"),
                    HitlAction::ConvertType,
                    stage,
                )
                .with_confidence(0.9 * *parseable as f64 / total)
                .with_parameters(parameters)
            } else {
                PreprocessingRule::new(
                    RuleType::TypeConversion,
                    columns,
                    pattern.name(),
                    format!(
                        "Convert '{column}' from text to {}{}",
                        target_type.as_str(),
                        lossy_suffix(*unparseable)
                    ),
                    HitlAction::ConvertType,
                    stage,
                )
                .with_hitl(*unparseable > 0)
                .with_confidence(*parseable as f64 / total)
                .with_parameters(parameters)
            }
        }

        DetectedPattern::BooleanStrings {
            parseable,
            unparseable,
        } => {
            let total = (parseable + unparseable).max(1) as f64;
            PreprocessingRule::new(
                RuleType::TypeConversion,
                columns,
                pattern.name(),
                format!(
                    "Convert '{column}' from text to boolean{}",
                    lossy_suffix(*unparseable)
                ),
                HitlAction::ConvertType,
                stage,
            )
            .with_hitl(*unparseable > 0)
            .with_confidence(*parseable as f64 / total)
            .with_parameters(RuleParameters {
                target_type: Some(ColumnDataType::Boolean),
                ..RuleParameters::default()
            })
        }

        DetectedPattern::DateLike {
            layouts,
            day_first,
            ambiguous,
            matched,
            unmatched,
        } => {
            let total = (matched + unmatched).max(1) as f64;
            let share = *matched as f64 / total;
            let order = match day_first {
                Some(true) => " (day first)",
                Some(false) => " (month first)",
                None => "",
            };
            PreprocessingRule::new(
                RuleType::DateFormatStandardization,
                columns,
                pattern.name(),
                format!("Rewrite dates in '{column}' as ISO-8601 (YYYY-MM-DD){order}"),
                HitlAction::ConvertType,
                stage,
            )
            .with_hitl(*ambiguous)
            .with_confidence(if *ambiguous { 0.6 * share } else { 0.95 * share })
            .with_parameters(RuleParameters {
                layouts: layouts.clone(),
                day_first: Some(day_first.unwrap_or(true)),
                ..RuleParameters::default()
            })
        }

        DetectedPattern::CategoryVariants { mapping } => PreprocessingRule::new(
            RuleType::CategoryMapping,
            columns,
            pattern.name(),
            format!(
                "Merge {} spelling variants in '{column}' into their most common form",
                mapping.len()
            ),
            HitlAction::MergeCategories,
            stage,
        )
        .with_hitl(true)
        .with_confidence(0.8)
        .with_parameters(RuleParameters {
            category_mapping: mapping.clone(),
            ..RuleParameters::default()
        }),

        DetectedPattern::LikelyIdentifier { unique_ratio } => PreprocessingRule::new(
            RuleType::BusinessLogic,
            columns,
            pattern.name(),
            format!(
                "Remove '{column}': {:.0}% unique values suggest an identifier",
                unique_ratio * 100.0
            ),
            HitlAction::Delete,
            stage,
        )
        .with_hitl(true)
        .with_confidence(0.5 + 0.4 * unique_ratio),
    }
}

fn lossy_suffix(unparseable: usize) -> String {
    if unparseable == 0 {
        String::new()
    } else {
        format!(" ({unparseable} values cannot be converted and become null)")
    }
}

/// Order rules for application: priority, then id.
pub fn sort_rules(rules: &mut [PreprocessingRule]) {
    rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}

/// Merge newly discovered rules into `existing` by (column set, type) identity.
///
/// A rule seen again blends its confidence (`0.4 * old + 0.6 * new`) and
/// counts the observation. While it is still pending its description,
/// parameters, action and HITL flag follow the newest discovery. Approval
/// state is never changed by a merge.
pub fn merge_rules(
    existing: &mut Vec<PreprocessingRule>,
    discovered: Vec<PreprocessingRule>,
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for new_rule in discovered {
        match existing.iter_mut().find(|r| r.id == new_rule.id) {
            Some(current) => {
                current.confidence = (PREVIOUS_CONFIDENCE_WEIGHT * current.confidence
                    + (1.0 - PREVIOUS_CONFIDENCE_WEIGHT) * new_rule.confidence)
                    .clamp(0.0, 1.0);
                current.observations += 1;
                if current.approval == ApprovalState::Pending {
                    current.description = new_rule.description;
                    current.pattern = new_rule.pattern;
                    current.parameters = new_rule.parameters;
                    current.action = new_rule.action;
                    current.requires_hitl = new_rule.requires_hitl;
                }
                summary.updated += 1;
            }
            None => {
                existing.push(new_rule);
                summary.added += 1;
            }
        }
    }

    sort_rules(existing);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NumericStats, QualityIssue, Severity};
    use std::collections::BTreeMap;

    fn column(name: &str, data_type: ColumnDataType) -> ColumnAnalysis {
        ColumnAnalysis {
            name: name.to_string(),
            index: 0,
            data_type,
            non_null_count: 100,
            null_count: 0,
            missing_percentage: 0.0,
            numeric: None,
            categorical: None,
            issues: Vec::new(),
            recommendations: Vec::new(),
            patterns: Vec::new(),
        }
    }

    fn analysis(columns: Vec<ColumnAnalysis>) -> SampleAnalysis {
        SampleAnalysis {
            stage: 1,
            sample_ratio: 0.1,
            row_count: 100,
            column_count: columns.len(),
            columns,
            quality_score: 1.0,
            estimated_memory_bytes: 0,
        }
    }

    fn with_missing(mut col: ColumnAnalysis, pct: f64) -> ColumnAnalysis {
        col.null_count = pct as usize;
        col.non_null_count = 100 - col.null_count;
        col.missing_percentage = pct;
        col
    }

    #[test]
    fn test_low_missing_is_automatic() {
        let rules = RuleDiscovery::default().discover(&analysis(vec![with_missing(
            column("Age", ColumnDataType::Float),
            15.0,
        )]));
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.rule_type, RuleType::MissingValueStrategy);
        assert_eq!(rule.action, HitlAction::ImputeMedian);
        assert!(!rule.requires_hitl);
        assert!((rule.confidence - 0.85).abs() < 1e-12);
        assert_eq!(rule.id, "missing_value_strategy:Age");
    }

    #[test]
    fn test_moderate_and_high_missing_need_review() {
        let rules = RuleDiscovery::default().discover(&analysis(vec![
            with_missing(column("city", ColumnDataType::String), 30.0),
            with_missing(column("notes", ColumnDataType::String), 70.0),
        ]));
        let city = rules.iter().find(|r| r.column() == "city").unwrap();
        assert!(city.requires_hitl);
        assert_eq!(city.action, HitlAction::ImputeMode);
        let notes = rules.iter().find(|r| r.column() == "notes").unwrap();
        assert!(notes.requires_hitl);
        assert_eq!(notes.action, HitlAction::Delete);
    }

    #[test]
    fn test_outlier_rule() {
        let mut col = column("income", ColumnDataType::Float);
        col.numeric = Some(NumericStats {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            variance: 0.0,
            min: 0.0,
            max: 0.0,
            q1: 0.0,
            q3: 0.0,
            outlier_count: 8,
        });
        col.issues.push(QualityIssue {
            kind: QualityIssueKind::HighOutliers,
            severity: Severity::Medium,
            description: String::new(),
            value: 8.0,
        });
        let rules = RuleDiscovery::default().discover(&analysis(vec![col]));
        assert_eq!(rules[0].rule_type, RuleType::OutlierHandling);
        assert!(rules[0].requires_hitl);
        assert_eq!(rules[0].action, HitlAction::CapOutliers);
    }

    #[test]
    fn test_pattern_rules_and_hitl_flags() {
        let mut col = column("joined", ColumnDataType::String);
        col.patterns = vec![
            DetectedPattern::WhitespacePadding { affected: 3 },
            DetectedPattern::DateLike {
                layouts: vec!["%d/%m/%Y".to_string()],
                day_first: None,
                ambiguous: true,
                matched: 100,
                unmatched: 0,
            },
        ];
        let mut plan = column("plan", ColumnDataType::String);
        plan.patterns = vec![DetectedPattern::CategoryVariants {
            mapping: BTreeMap::from([("basic".to_string(), "Basic".to_string())]),
        }];

        let rules = RuleDiscovery::default().discover(&analysis(vec![col, plan]));
        let types: Vec<RuleType> = rules.iter().map(|r| r.rule_type).collect();
        assert_eq!(
            types,
            vec![
                RuleType::WhitespaceNormalization,
                RuleType::DateFormatStandardization,
                RuleType::CategoryMapping
            ]
        );
        assert!(!rules[0].requires_hitl);
        assert!(rules[1].requires_hitl);
        assert_eq!(rules[1].parameters.day_first, Some(true));
        assert!(rules[2].requires_hitl);
    }

    #[test]
    fn test_lossy_conversion_needs_review() {
        let mut col = column("count", ColumnDataType::String);
        col.patterns = vec![DetectedPattern::NumericStrings {
            formatted: false,
            integral: true,
            parseable: 95,
            unparseable: 5,
        }];
        let rules = RuleDiscovery::default().discover(&analysis(vec![col]));
        assert_eq!(rules[0].rule_type, RuleType::TypeConversion);
        assert!(rules[0].requires_hitl);
        assert_eq!(rules[0].parameters.target_type, Some(ColumnDataType::Integer));
    }

    #[test]
    fn test_merge_blends_confidence_and_keeps_approval() {
        let base = PreprocessingRule::new(
            RuleType::MissingValueStrategy,
            vec!["Age".to_string()],
            "missing_values",
            "old",
            HitlAction::ImputeMedian,
            1,
        );
        let mut existing = vec![base.clone().with_confidence(0.5)];
        existing[0].approval = ApprovalState::Approved;

        let mut newer = base.clone().with_confidence(1.0);
        newer.description = "new".to_string();
        let summary = merge_rules(&mut existing, vec![newer]);

        assert_eq!(summary, MergeSummary { added: 0, updated: 1 });
        assert_eq!(existing.len(), 1);
        assert!((existing[0].confidence - 0.8).abs() < 1e-12);
        assert_eq!(existing[0].observations, 2);
        assert_eq!(existing[0].approval, ApprovalState::Approved);
        assert_eq!(existing[0].description, "old");
    }

    #[test]
    fn test_merge_refreshes_pending_rules_and_adds_new() {
        let pending = PreprocessingRule::new(
            RuleType::CategoryMapping,
            vec!["plan".to_string()],
            "category_variants",
            "old",
            HitlAction::MergeCategories,
            1,
        );
        let mut existing = vec![pending.clone()];
        let mut refreshed = pending.clone();
        refreshed.description = "new".to_string();
        let other = PreprocessingRule::new(
            RuleType::WhitespaceNormalization,
            vec!["plan".to_string()],
            "whitespace_padding",
            "trim",
            HitlAction::ConvertType,
            2,
        );

        let summary = merge_rules(&mut existing, vec![refreshed, other]);
        assert_eq!(summary, MergeSummary { added: 1, updated: 1 });
        assert_eq!(existing[0].rule_type, RuleType::WhitespaceNormalization);
        assert_eq!(existing[1].description, "new");
    }
}
