//! Sample analysis: per-column statistics, quality issues, structural
//! patterns and convergence between stages.
//!
//! Columns are analysed in parallel with rayon. The cancellation token is
//! checked before each column.

pub mod convergence;
pub mod patterns;
pub mod quality;
pub mod statistics;

pub use convergence::{ConvergenceReport, check_convergence, relative_difference};
pub use quality::QualityAnalyzer;

use crate::config::AnalysisConfig;
use crate::error::{IncrementalError, Result};
use crate::types::{ColumnAnalysis, ColumnDataType, SampleAnalysis};
use crate::workflow::progress::CancellationToken;
use polars::prelude::*;
use rayon::prelude::*;
use tracing::debug;

/// Analyzes stage samples.
#[derive(Debug, Clone, Default)]
pub struct SampleAnalyzer {
    config: AnalysisConfig,
}

impl SampleAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyze every column of `df`.
    pub fn analyze(
        &self,
        df: &DataFrame,
        stage: u8,
        sample_ratio: f64,
        cancel: &CancellationToken,
    ) -> Result<SampleAnalysis> {
        let row_count = df.height();

        let columns: Vec<ColumnAnalysis> = df
            .get_columns()
            .par_iter()
            .enumerate()
            .map(|(index, column)| {
                if cancel.is_cancelled() {
                    return Err(IncrementalError::Cancelled);
                }
                self.analyze_column(column.as_materialized_series(), index, row_count)
            })
            .collect::<Result<Vec<_>>>()?;

        let quality_score = QualityAnalyzer::quality_score(&columns);
        debug!(
            stage,
            rows = row_count,
            columns = columns.len(),
            quality_score,
            "Analyzed sample"
        );

        Ok(SampleAnalysis {
            stage,
            sample_ratio,
            row_count,
            column_count: columns.len(),
            columns,
            quality_score,
            estimated_memory_bytes: df.estimated_size(),
        })
    }

    /// Analyze a single column.
    pub fn analyze_column(
        &self,
        series: &Series,
        index: usize,
        row_count: usize,
    ) -> Result<ColumnAnalysis> {
        let name = series.name().to_string();
        let data_type = ColumnDataType::from_dtype(series.dtype());
        let null_count = series.null_count();
        let non_null_count = series.len() - null_count;
        let missing_percentage = if row_count == 0 {
            0.0
        } else {
            null_count as f64 / row_count as f64 * 100.0
        };

        let failed = |e: anyhow::Error| IncrementalError::AnalysisFailed(format!("{name}: {e}"));

        let numeric = if data_type.is_numeric() {
            statistics::numeric_stats(series).map_err(failed)?
        } else {
            None
        };
        let categorical = if matches!(data_type, ColumnDataType::String | ColumnDataType::Boolean) {
            statistics::categorical_stats(series, self.config.high_cardinality).map_err(failed)?
        } else {
            None
        };
        let patterns = patterns::detect_patterns(&name, series, data_type).map_err(failed)?;

        let mut analysis = ColumnAnalysis {
            name,
            index,
            data_type,
            non_null_count,
            null_count,
            missing_percentage,
            numeric,
            categorical,
            issues: Vec::new(),
            recommendations: Vec::new(),
            patterns,
        };
        analysis.issues = QualityAnalyzer::detect_issues(&analysis, &self.config);
        analysis.recommendations = QualityAnalyzer::recommend(&analysis, &self.config);
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualityIssueKind, Recommendation};

    fn sample() -> DataFrame {
        df! {
            "age" => [Some(20.0), None, Some(30.0), None, Some(40.0)],
            "city" => ["Paris", "Lyon", "Paris", "Nice", "Paris"],
            "active" => [true, false, true, true, false],
        }
        .unwrap()
    }

    #[test]
    fn test_analyze_sample() {
        let analyzer = SampleAnalyzer::default();
        let analysis = analyzer
            .analyze(&sample(), 1, 0.5, &CancellationToken::new())
            .unwrap();

        assert_eq!(analysis.stage, 1);
        assert_eq!(analysis.row_count, 5);
        assert_eq!(analysis.column_count, 3);

        let age = analysis.column("age").unwrap();
        assert_eq!(age.data_type, ColumnDataType::Float);
        assert_eq!(age.null_count, 2);
        assert_eq!(age.missing_percentage, 40.0);
        assert!(age.has_issue(QualityIssueKind::ModerateMissing));
        assert_eq!(age.numeric.as_ref().unwrap().mean, 30.0);
        assert!(age.recommendations.contains(&Recommendation::ImputeMedian));

        let city = analysis.column("city").unwrap();
        let stats = city.categorical.as_ref().unwrap();
        assert_eq!(stats.most_frequent.as_deref(), Some("Paris"));
        assert!(city.recommendations.contains(&Recommendation::OneHotEncode));

        let active = analysis.column("active").unwrap();
        assert_eq!(active.data_type, ColumnDataType::Boolean);
        assert!(active.categorical.is_some());

        // age: 1 - 0.2 = 0.8, others 1.0
        assert!((analysis.quality_score - (0.8 + 1.0 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_clean_columns_score_one() {
        let df = df! { "x" => [1i64, 2, 3], "y" => ["a", "b", "a"] }.unwrap();
        let analysis = SampleAnalyzer::default()
            .analyze(&df, 1, 1.0, &CancellationToken::new())
            .unwrap();
        assert_eq!(analysis.quality_score, 1.0);
    }

    #[test]
    fn test_cancelled_analysis() {
        let token = CancellationToken::new();
        token.cancel();
        let err = SampleAnalyzer::default()
            .analyze(&sample(), 1, 0.5, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_empty_table() {
        let df = DataFrame::empty();
        let analysis = SampleAnalyzer::default()
            .analyze(&df, 1, 0.1, &CancellationToken::new())
            .unwrap();
        assert_eq!(analysis.quality_score, 1.0);
        assert!(analysis.columns.is_empty());
    }
}
