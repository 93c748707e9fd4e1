//! Data-quality issues, recommendations and the aggregate quality score.

use crate::config::AnalysisConfig;
use crate::types::{
    ColumnAnalysis, ColumnDataType, DetectedPattern, QualityIssue, QualityIssueKind,
    Recommendation, Severity,
};

/// Categories at or below this count are one-hot encoded.
const ONE_HOT_MAX_CATEGORIES: usize = 10;

pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Issues for a column whose statistics have been filled in.
    pub fn detect_issues(column: &ColumnAnalysis, config: &AnalysisConfig) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        let missing = column.missing_percentage;

        if missing > config.high_missing_pct {
            issues.push(QualityIssue {
                kind: QualityIssueKind::HighMissing,
                severity: Severity::High,
                description: format!("{:.1}% of '{}' is missing", missing, column.name),
                value: missing,
            });
        } else if missing > config.moderate_missing_pct {
            issues.push(QualityIssue {
                kind: QualityIssueKind::ModerateMissing,
                severity: Severity::Medium,
                description: format!("{:.1}% of '{}' is missing", missing, column.name),
                value: missing,
            });
        }

        if let Some(stats) = &column.numeric
            && column.non_null_count > 0
        {
            let outlier_pct = stats.outlier_count as f64 / column.non_null_count as f64 * 100.0;
            if outlier_pct > config.outlier_pct {
                issues.push(QualityIssue {
                    kind: QualityIssueKind::HighOutliers,
                    severity: Severity::Medium,
                    description: format!(
                        "{} values ({:.1}%) of '{}' fall outside 1.5 x IQR",
                        stats.outlier_count, outlier_pct, column.name
                    ),
                    value: outlier_pct,
                });
            }
        }

        if let Some(stats) = &column.categorical
            && stats.high_cardinality
        {
            issues.push(QualityIssue {
                kind: QualityIssueKind::HighCardinality,
                severity: Severity::Low,
                description: format!(
                    "'{}' has {} distinct values",
                    column.name, stats.cardinality
                ),
                value: stats.cardinality as f64,
            });
        }

        issues
    }

    /// Heuristic recommendations for a column with issues and patterns filled in.
    pub fn recommend(column: &ColumnAnalysis, config: &AnalysisConfig) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if column
            .patterns
            .iter()
            .any(|p| matches!(p, DetectedPattern::LikelyIdentifier { .. }))
        {
            recommendations.push(Recommendation::DropIdentifier);
            return recommendations;
        }

        if column.missing_percentage > config.high_missing_pct {
            recommendations.push(Recommendation::DropColumn);
            return recommendations;
        }

        if column.null_count > 0 {
            if column.data_type.is_numeric() {
                recommendations.push(Recommendation::ImputeMedian);
            } else {
                recommendations.push(Recommendation::ImputeMode);
            }
        }

        if column.data_type == ColumnDataType::String
            && let Some(stats) = &column.categorical
        {
            if stats.high_cardinality {
                recommendations.push(Recommendation::TargetEncode);
            } else if stats.cardinality <= ONE_HOT_MAX_CATEGORIES {
                recommendations.push(Recommendation::OneHotEncode);
            } else {
                recommendations.push(Recommendation::FrequencyOrTargetEncode);
            }
        }

        if column.has_issue(QualityIssueKind::HighOutliers) {
            recommendations.push(Recommendation::ReviewOutliers);
        }

        recommendations
    }

    /// Column score `1 - missing%/100 * 0.5 - min(0.4, 0.2 * high issues)`, floored at 0.
    pub fn column_score(column: &ColumnAnalysis) -> f64 {
        let missing_penalty = column.missing_percentage / 100.0 * 0.5;
        let issue_penalty = (0.2 * column.high_severity_issues() as f64).min(0.4);
        (1.0 - missing_penalty - issue_penalty).max(0.0)
    }

    /// Mean column score; 1.0 for a table without columns.
    pub fn quality_score(columns: &[ColumnAnalysis]) -> f64 {
        if columns.is_empty() {
            return 1.0;
        }
        columns.iter().map(Self::column_score).sum::<f64>() / columns.len() as f64
    }
}
