//! Reusable preprocessing scripts.
//!
//! [`ScriptGenerator`] turns approved rules into the Rust source of a
//! standalone polars routine that replays them in application order. The
//! output depends only on the rules and the [`ScriptOptions`], so the same
//! session always produces the same script.

mod helpers;

use crate::analysis::patterns::resolve_layout;
use crate::config::ScriptOptions;
use crate::applier::execution_plan;
use crate::error::{Result, ResultExt};
use crate::types::{ColumnDataType, HitlAction, PreprocessingRule, RuleType};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// One emitted call: the helper it uses and the statement itself.
struct Step {
    helper: &'static str,
    call: String,
}

/// Generates Rust source from approved rules.
#[derive(Debug, Clone, Default)]
pub struct ScriptGenerator {
    options: ScriptOptions,
}

impl ScriptGenerator {
    pub fn new(options: ScriptOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    /// Source of a module replaying every approved rule of `rules`.
    pub fn generate(&self, rules: &[PreprocessingRule]) -> String {
        let (approved, _) = execution_plan(rules);

        let opts = &self.options;
        let mut used: HashSet<&'static str> = HashSet::new();
        let mut body = String::new();

        if opts.include_validation {
            let columns: BTreeSet<&str> = approved
                .iter()
                .flat_map(|r| r.columns.iter().map(String::as_str))
                .collect();
            let list: Vec<String> = columns.iter().map(|c| format!("{c:?}")).collect();
            used.insert("require_columns");
            let _ = writeln!(body, "require_columns(&df, &[{}])?;", list.join(", "));
        }

        let mut step_number = 0;
        for rule in &approved {
            for column in &rule.columns {
                let Some(step) = step_for(rule, column) else {
                    if opts.include_comments {
                        let _ = writeln!(
                            body,
                            "// Not replayable: {} ({})",
                            rule.id,
                            rule.action.as_str()
                        );
                    }
                    continue;
                };
                step_number += 1;
                if opts.include_comments {
                    let _ = writeln!(body, "// {step_number}. {}", single_line(&rule.description));
                }
                let _ = writeln!(body, "{}?;", step.call);
                if opts.include_logging {
                    let _ = writeln!(
                        body,
                        "tracing::info!(rule = {:?}, column = {:?}, \"Applied preprocessing step\");",
                        rule.id, column
                    );
                }
                used.insert(step.helper);
            }
        }
        body.push_str("Ok(df)\n");

        let mut out = String::new();
        if opts.include_comments {
            let _ = writeln!(out, "//! Preprocessing routine generated by lex-incremental.");
            let _ = writeln!(out, "//!");
            let _ = writeln!(
                out,
                "//! Replays {} approved rule(s) in application order.",
                approved.len()
            );
            out.push('\n');
        }
        let _ = writeln!(out, "pub mod {} {{", opts.module_name);
        let _ = writeln!(out, "    use polars::prelude::*;");
        out.push('\n');
        out.push_str(&indent(&self.struct_source(&body), 1));

        for helper in helpers::HELPERS {
            if required_helpers(&used).contains(helper.name) {
                out.push('\n');
                out.push_str(&indent(helper.source, 1));
            }
        }
        out.push_str("}\n");
        out
    }

    fn struct_source(&self, body: &str) -> String {
        let opts = &self.options;
        let name = &opts.struct_name;
        let mut out = String::new();

        if opts.include_comments {
            let _ = writeln!(out, "/// Applies the recorded preprocessing steps to a table.");
        }
        if opts.sealed {
            let _ = writeln!(out, "#[derive(Debug, Clone, Default)]");
            let _ = writeln!(out, "pub struct {name} {{");
            let _ = writeln!(out, "    _sealed: (),");
            let _ = writeln!(out, "}}");
        } else {
            let _ = writeln!(out, "#[derive(Debug, Clone, Copy, Default)]");
            let _ = writeln!(out, "pub struct {name};");
        }
        out.push('\n');
        let _ = writeln!(out, "impl {name} {{");
        let _ = writeln!(out, "    pub fn new() -> Self {{");
        let _ = writeln!(out, "        Self::default()");
        let _ = writeln!(out, "    }}");
        out.push('\n');
        let asyncness = if opts.async_style { "async " } else { "" };
        let _ = writeln!(
            out,
            "    pub {asyncness}fn apply(&self, df: DataFrame) -> PolarsResult<DataFrame> {{"
        );
        let _ = writeln!(out, "        let mut df = df;");
        out.push_str(&indent(body, 2));
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out
    }

    /// Write `source` to `path`, creating parent directories.
    pub fn save(&self, source: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, source).context(format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Saved preprocessing script");
        Ok(())
    }

    pub fn generate_and_save(&self, rules: &[PreprocessingRule], path: &Path) -> Result<String> {
        let source = self.generate(rules);
        self.save(&source, path)?;
        Ok(source)
    }
}

/// The call replaying `rule` on `column`, or `None` for actions without effect
/// or without a replayable form.
fn step_for(rule: &PreprocessingRule, column: &str) -> Option<Step> {
    let col = format!("{column:?}");
    let params = &rule.parameters;
    let simple = |helper: &'static str| Step {
        helper,
        call: format!("{helper}(&mut df, {col})"),
    };

    let step = match (rule.rule_type, rule.action) {
        (RuleType::MissingValueStrategy | RuleType::BusinessLogic, HitlAction::Delete) => {
            simple("drop_column")
        }
        (RuleType::MissingValueStrategy, HitlAction::ImputeMean) => simple("impute_mean"),
        (RuleType::MissingValueStrategy, HitlAction::ImputeMedian) => simple("impute_median"),
        (RuleType::MissingValueStrategy, HitlAction::ImputeMode) => simple("impute_mode"),
        (RuleType::MissingValueStrategy, HitlAction::ImputeCustom) => Step {
            helper: "impute_custom",
            call: format!(
                "impute_custom(&mut df, {col}, {:?})",
                params.custom_value.as_deref()?
            ),
        },
        (RuleType::OutlierHandling, HitlAction::CapOutliers) => simple("cap_outliers"),
        (RuleType::OutlierHandling, HitlAction::RemoveOutliers) => simple("remove_outliers"),
        (RuleType::OutlierHandling, HitlAction::FlagForReview) => simple("flag_outliers"),
        (RuleType::WhitespaceNormalization, HitlAction::ConvertType) => simple("trim_whitespace"),
        (RuleType::EncodingNormalization, HitlAction::ConvertType) => simple("repair_encoding"),
        (RuleType::NumericFormatStandardization, HitlAction::ConvertType) => Step {
            helper: "to_numeric",
            call: format!(
                "to_numeric(&mut df, {col}, true, {})",
                params.target_type == Some(ColumnDataType::Integer)
            ),
        },
        (RuleType::TypeConversion, HitlAction::ConvertType) => match params.target_type? {
            ColumnDataType::Boolean => simple("to_boolean"),
            target @ (ColumnDataType::Integer | ColumnDataType::Float) => Step {
                helper: "to_numeric",
                call: format!(
                    "to_numeric(&mut df, {col}, false, {})",
                    target == ColumnDataType::Integer
                ),
            },
            _ => return None,
        },
        (RuleType::DateFormatStandardization, HitlAction::ConvertType) => {
            let day_first = params.day_first.unwrap_or(true);
            let layouts: Vec<String> = params
                .layouts
                .iter()
                .map(|l| format!("{:?}", resolve_layout(l, day_first)))
                .collect();
            Step {
                helper: "standardize_dates",
                call: format!("standardize_dates(&mut df, {col}, &[{}])", layouts.join(", ")),
            }
        }
        (RuleType::CategoryMapping, HitlAction::MergeCategories) => {
            let pairs: Vec<String> = params
                .category_mapping
                .iter()
                .map(|(variant, canonical)| format!("({variant:?}, {canonical:?})"))
                .collect();
            Step {
                helper: "map_categories",
                call: format!("map_categories(&mut df, {col}, &[{}])", pairs.join(", ")),
            }
        }
        _ => return None,
    };
    Some(step)
}

/// `used` plus every helper they depend on.
fn required_helpers(used: &HashSet<&'static str>) -> HashSet<&'static str> {
    let mut required = HashSet::new();
    let mut stack: Vec<&'static str> = used.iter().copied().collect();
    while let Some(name) = stack.pop() {
        if required.insert(name)
            && let Some(helper) = helpers::helper(name)
        {
            stack.extend(helper.depends_on.iter().copied());
        }
    }
    required
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn indent(text: &str, levels: usize) -> String {
    let pad = "    ".repeat(levels);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                "\n".to_string()
            } else {
                format!("{pad}{line}\n")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApprovalState, RuleParameters};
    use std::collections::BTreeMap;

    fn approved(rule_type: RuleType, column: &str, action: HitlAction) -> PreprocessingRule {
        let mut rule =
            PreprocessingRule::new(rule_type, vec![column.to_string()], "p", "desc", action, 1);
        rule.approval = ApprovalState::Approved;
        rule
    }

    #[test]
    fn test_only_used_helpers_are_emitted() {
        let rules = vec![approved(
            RuleType::MissingValueStrategy,
            "age",
            HitlAction::ImputeMedian,
        )];
        let source = ScriptGenerator::default().generate(&rules);

        assert!(source.contains("fn impute_median("));
        assert!(source.contains("fn fill_numeric("));
        assert!(source.contains("fn numeric_values("));
        assert!(source.contains("impute_median(&mut df, \"age\")?;"));
        assert!(!source.contains("fn cap_outliers("));
        assert!(!source.contains("fn standardize_dates("));
    }

    #[test]
    fn test_rules_replay_in_application_order() {
        let rules = vec![
            approved(RuleType::OutlierHandling, "x", HitlAction::CapOutliers),
            approved(RuleType::WhitespaceNormalization, "name", HitlAction::ConvertType),
            approved(RuleType::MissingValueStrategy, "x", HitlAction::ImputeMean),
        ];
        let source = ScriptGenerator::default().generate(&rules);
        let trim = source.find("trim_whitespace(&mut df").unwrap();
        let mean = source.find("impute_mean(&mut df").unwrap();
        let cap = source.find("cap_outliers(&mut df").unwrap();
        assert!(trim < mean && mean < cap);
    }

    #[test]
    fn test_unapproved_rules_are_ignored() {
        let mut pending = approved(RuleType::OutlierHandling, "x", HitlAction::CapOutliers);
        pending.approval = ApprovalState::Pending;
        let source = ScriptGenerator::default().generate(&[pending]);
        assert!(!source.contains("cap_outliers"));
        assert!(source.contains("Ok(df)"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut mapping = approved(RuleType::CategoryMapping, "plan", HitlAction::MergeCategories);
        mapping.parameters = RuleParameters {
            category_mapping: BTreeMap::from([
                ("basic".to_string(), "Basic".to_string()),
                ("PREMIUM".to_string(), "Premium".to_string()),
            ]),
            ..Default::default()
        };
        let mut dates = approved(RuleType::DateFormatStandardization, "d", HitlAction::ConvertType);
        dates.parameters = RuleParameters {
            layouts: vec!["%d/%m/%Y".to_string()],
            day_first: Some(false),
            ..Default::default()
        };
        let rules = vec![mapping, dates];

        let generator = ScriptGenerator::default();
        let first = generator.generate(&rules);
        assert_eq!(first, generator.generate(&rules));
        assert!(first.contains("(\"PREMIUM\", \"Premium\")"));
        assert!(first.contains("&[\"%m/%d/%Y\"]"));
    }

    #[test]
    fn test_script_options() {
        let options = ScriptOptions {
            include_comments: false,
            include_validation: false,
            include_logging: true,
            module_name: "cleaning".to_string(),
            struct_name: "Cleaner".to_string(),
            async_style: true,
            sealed: false,
        };
        let rules = vec![approved(RuleType::BusinessLogic, "id", HitlAction::Delete)];
        let source = ScriptGenerator::new(options).generate(&rules);

        assert!(source.starts_with("pub mod cleaning {"));
        assert!(source.contains("pub struct Cleaner;"));
        assert!(source.contains("pub async fn apply("));
        assert!(source.contains("tracing::info!"));
        assert!(!source.contains("require_columns"));
        assert!(!source.contains("//"));
    }

    #[test]
    fn test_generate_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("script.rs");
        let rules = vec![approved(RuleType::BusinessLogic, "id", HitlAction::Delete)];
        let source = ScriptGenerator::default()
            .generate_and_save(&rules, &path)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), source);
    }
}
