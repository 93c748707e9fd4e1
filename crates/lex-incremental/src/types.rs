//! Shared domain types: column analyses, preprocessing rules and rule
//! application results.

use chrono::{DateTime, Utc};
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================================================
// Column analysis
// ============================================================================

/// Data type inferred from a column's storage dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDataType {
    Integer,
    Float,
    Decimal,
    Boolean,
    String,
    Unknown,
}

impl ColumnDataType {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Self::Integer,
            DataType::Float32 | DataType::Float64 => Self::Float,
            DataType::Decimal(_, _) => Self::Decimal,
            DataType::Boolean => Self::Boolean,
            DataType::String | DataType::Categorical(_, _) => Self::String,
            _ => Self::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Unknown => "unknown",
        }
    }
}

/// Descriptive statistics for a numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    /// Values outside `[q1 - 1.5 IQR, q3 + 1.5 IQR]`.
    pub outlier_count: usize,
}

/// Frequency statistics for a categorical or boolean column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub most_frequent: Option<String>,
    pub value_counts: BTreeMap<String, usize>,
    pub cardinality: usize,
    /// Shannon entropy in bits.
    pub entropy: f64,
    pub high_cardinality: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueKind {
    HighMissing,
    ModerateMissing,
    HighOutliers,
    HighCardinality,
}

/// A data-quality problem detected in one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub kind: QualityIssueKind,
    pub severity: Severity,
    pub description: String,
    /// The measurement that triggered the issue (a percentage or a count).
    pub value: f64,
}

/// A structural pattern found in the values of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectedPattern {
    /// Values with leading or trailing whitespace.
    WhitespacePadding { affected: usize },

    /// Values that look like dates in one or more layouts.
    DateLike {
        /// chrono format strings, most frequent first.
        layouts: Vec<String>,
        /// `Some(true)` when a value proves day-first order, `Some(false)` for
        /// month-first, `None` when the order cannot be decided.
        day_first: Option<bool>,
        /// Slash/dot layouts whose day/month order is undecided.
        ambiguous: bool,
        matched: usize,
        unmatched: usize,
    },

    /// Numbers stored as text.
    NumericStrings {
        /// Some values carry currency symbols, thousands separators or percent signs.
        formatted: bool,
        /// Every parseable value is integral.
        integral: bool,
        parseable: usize,
        unparseable: usize,
    },

    /// Booleans stored as text ("yes"/"no", "true"/"false", ...).
    BooleanStrings { parseable: usize, unparseable: usize },

    /// Labels that differ only by case or spacing.
    /// Maps each variant to the canonical (most frequent) spelling.
    CategoryVariants { mapping: BTreeMap<String, String> },

    /// Mojibake, replacement characters or control characters.
    EncodingArtifacts { affected: usize },

    /// Column whose values are (nearly) all unique.
    LikelyIdentifier { unique_ratio: f64 },
}

impl DetectedPattern {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WhitespacePadding { .. } => "whitespace_padding",
            Self::DateLike { .. } => "date_like",
            Self::NumericStrings { .. } => "numeric_strings",
            Self::BooleanStrings { .. } => "boolean_strings",
            Self::CategoryVariants { .. } => "category_variants",
            Self::EncodingArtifacts { .. } => "encoding_artifacts",
            Self::LikelyIdentifier { .. } => "likely_identifier",
        }
    }
}

/// Heuristic per-column recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    DropColumn,
    ImputeMedian,
    ImputeMode,
    OneHotEncode,
    FrequencyOrTargetEncode,
    TargetEncode,
    ReviewOutliers,
    DropIdentifier,
}

impl Recommendation {
    pub fn description(&self) -> &'static str {
        match self {
            Self::DropColumn => "Drop the column (more than half of the values are missing)",
            Self::ImputeMedian => "Impute missing values with the median",
            Self::ImputeMode => "Impute missing values with the most frequent value",
            Self::OneHotEncode => "One-hot encode (few categories)",
            Self::FrequencyOrTargetEncode => "Frequency or target encode (moderate cardinality)",
            Self::TargetEncode => "Target encode (high cardinality)",
            Self::ReviewOutliers => "Review outliers before modeling",
            Self::DropIdentifier => "Remove the column (likely an identifier)",
        }
    }
}

/// Statistics and findings for a single column of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAnalysis {
    pub name: String,
    pub index: usize,
    pub data_type: ColumnDataType,
    pub non_null_count: usize,
    pub null_count: usize,
    pub missing_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorical: Option<CategoricalStats>,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<Recommendation>,
    pub patterns: Vec<DetectedPattern>,
}

impl ColumnAnalysis {
    pub fn high_severity_issues(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::High)
            .count()
    }

    pub fn has_issue(&self, kind: QualityIssueKind) -> bool {
        self.issues.iter().any(|issue| issue.kind == kind)
    }
}

/// Analysis of one stage sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAnalysis {
    pub stage: u8,
    pub sample_ratio: f64,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnAnalysis>,
    /// Aggregate quality score in [0, 1].
    pub quality_score: f64,
    pub estimated_memory_bytes: usize,
}

impl SampleAnalysis {
    pub fn column(&self, name: &str) -> Option<&ColumnAnalysis> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn issue_count(&self) -> usize {
        self.columns.iter().map(|c| c.issues.len()).sum()
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Kind of preprocessing rule. Declaration order is application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    EncodingNormalization,
    WhitespaceNormalization,
    NumericFormatStandardization,
    TypeConversion,
    DateFormatStandardization,
    CategoryMapping,
    BusinessLogic,
    MissingValueStrategy,
    OutlierHandling,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncodingNormalization => "encoding_normalization",
            Self::WhitespaceNormalization => "whitespace_normalization",
            Self::NumericFormatStandardization => "numeric_format_standardization",
            Self::TypeConversion => "type_conversion",
            Self::DateFormatStandardization => "date_format_standardization",
            Self::CategoryMapping => "category_mapping",
            Self::BusinessLogic => "business_logic",
            Self::MissingValueStrategy => "missing_value_strategy",
            Self::OutlierHandling => "outlier_handling",
        }
    }

    /// Application priority; lower runs first.
    pub fn priority(&self) -> u32 {
        (*self as u32 + 1) * 10
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::EncodingNormalization => "Encoding normalization",
            Self::WhitespaceNormalization => "Whitespace normalization",
            Self::NumericFormatStandardization => "Numeric format standardization",
            Self::TypeConversion => "Type conversion",
            Self::DateFormatStandardization => "Date format standardization",
            Self::CategoryMapping => "Category mapping",
            Self::BusinessLogic => "Business logic decision",
            Self::MissingValueStrategy => "Missing value strategy",
            Self::OutlierHandling => "Outlier handling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Action a rule performs, chosen by discovery or by a HITL answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitlAction {
    Delete,
    KeepAsIs,
    ImputeMean,
    ImputeMedian,
    ImputeMode,
    ImputeCustom,
    RemoveOutliers,
    CapOutliers,
    FlagForReview,
    MergeCategories,
    ConvertType,
    CustomLogic,
}

impl HitlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::KeepAsIs => "keep_as_is",
            Self::ImputeMean => "impute_mean",
            Self::ImputeMedian => "impute_median",
            Self::ImputeMode => "impute_mode",
            Self::ImputeCustom => "impute_custom",
            Self::RemoveOutliers => "remove_outliers",
            Self::CapOutliers => "cap_outliers",
            Self::FlagForReview => "flag_for_review",
            Self::MergeCategories => "merge_categories",
            Self::ConvertType => "convert_type",
            Self::CustomLogic => "custom_logic",
        }
    }
}

/// Typed parameters a rule carries to the applier and script generator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_value: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_mapping: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_first: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layouts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_type: Option<ColumnDataType>,
}

/// A candidate data transformation discovered from a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingRule {
    /// `<rule-type>:<sorted columns>`
    pub id: String,
    pub rule_type: RuleType,
    pub columns: Vec<String>,
    pub description: String,
    /// Name of the issue or pattern that produced the rule.
    pub pattern: String,
    pub requires_hitl: bool,
    pub priority: u32,
    pub discovered_in_stage: u8,
    pub approval: ApprovalState,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
    pub action: HitlAction,
    #[serde(default)]
    pub parameters: RuleParameters,
    /// How many stages have observed this rule.
    pub observations: u32,
}

impl PreprocessingRule {
    pub fn new(
        rule_type: RuleType,
        columns: Vec<String>,
        pattern: impl Into<String>,
        description: impl Into<String>,
        action: HitlAction,
        stage: u8,
    ) -> Self {
        let mut columns = columns;
        columns.sort();
        columns.dedup();
        Self {
            id: Self::make_id(rule_type, &columns),
            rule_type,
            columns,
            description: description.into(),
            pattern: pattern.into(),
            requires_hitl: false,
            priority: rule_type.priority(),
            discovered_in_stage: stage,
            approval: ApprovalState::Pending,
            confidence: 1.0,
            user_feedback: None,
            action,
            parameters: RuleParameters::default(),
            observations: 1,
        }
    }

    /// Deterministic identity of a rule: its type plus its sorted column set.
    pub fn make_id(rule_type: RuleType, sorted_columns: &[String]) -> String {
        format!("{}:{}", rule_type.as_str(), sorted_columns.join(","))
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_hitl(mut self, requires_hitl: bool) -> Self {
        self.requires_hitl = requires_hitl;
        self
    }

    pub fn with_parameters(mut self, parameters: RuleParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalState::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.approval == ApprovalState::Pending
    }

    /// First target column. Rules always carry at least one column.
    pub fn column(&self) -> &str {
        self.columns.first().map(String::as_str).unwrap_or_default()
    }
}

// ============================================================================
// Rule application
// ============================================================================

/// Outcome of applying one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleApplicationResult {
    pub rule: PreprocessingRule,
    pub success: bool,
    pub rows_affected: usize,
    pub rows_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of applying a list of rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleApplicationBatchResult {
    pub total_rules: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<RuleApplicationResult>,
    pub total_duration_ms: u64,
    /// Rule that stopped the batch when failures are not tolerated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_by: Option<String>,
}

impl RuleApplicationBatchResult {
    /// Failed rules divided by attempted rules.
    pub fn error_rate(&self) -> f64 {
        let attempted = self.successful + self.failed;
        if attempted == 0 {
            0.0
        } else {
            self.failed as f64 / attempted as f64
        }
    }
}

/// Paths of the files written for a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableManifest {
    pub cleaned_data: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
    pub metadata: PathBuf,
    pub generated_at: DateTime<Utc>,
}
