//! Applying HITL answers to rules and keeping the decision audit log.

use super::question::{HITLQuestion, OptionHint};
use crate::error::{IncrementalError, Result};
use crate::types::{ApprovalState, HitlAction, PreprocessingRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Responder recorded for answers typed by a person.
pub const RESPONDER_USER: &str = "user";
/// Responder recorded when `skip_hitl` picks the recommended option.
pub const RESPONDER_SKIP_HITL: &str = "system:skip-hitl";
/// Responder recorded when a confident rule is approved automatically.
pub const RESPONDER_AUTO_APPROVAL: &str = "system:auto-approval";

/// Answer to one [`HITLQuestion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HITLAnswer {
    pub question_id: String,
    pub selected_option: String,
    /// Required when the selected option imputes a custom value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Time the responder took to answer.
    #[serde(default)]
    pub decision_time_ms: u64,
}

impl HITLAnswer {
    pub fn new(question_id: impl Into<String>, selected_option: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            selected_option: selected_option.into(),
            custom_value: None,
            rationale: None,
            decision_time_ms: 0,
        }
    }

    pub fn with_custom_value(mut self, value: impl Into<String>) -> Self {
        self.custom_value = Some(value.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Answer selecting the question's recommended option.
pub fn answer_with_recommendation(question: &HITLQuestion, rationale: &str) -> HITLAnswer {
    HITLAnswer::new(&question.id, &question.recommended_option).with_rationale(rationale)
}

/// Apply `answer` to `rule`.
///
/// The rule is left untouched when the answer is rejected.
pub fn apply_answer(
    rule: &mut PreprocessingRule,
    question: &HITLQuestion,
    answer: &HITLAnswer,
) -> Result<()> {
    let invalid = |reason: String| IncrementalError::InvalidAnswer {
        question_id: answer.question_id.clone(),
        reason,
    };

    if answer.question_id != question.id || question.rule_id != rule.id {
        return Err(invalid(format!(
            "answer targets '{}' but the question is '{}' for rule '{}'",
            answer.question_id, question.id, rule.id
        )));
    }

    let option = question.option(&answer.selected_option).ok_or_else(|| {
        let keys: Vec<&str> = question.options.iter().map(|o| o.key.as_str()).collect();
        invalid(format!(
            "unknown option '{}' (expected one of: {})",
            answer.selected_option,
            keys.join(", ")
        ))
    })?;

    let custom_value = answer
        .custom_value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if option.action == HitlAction::ImputeCustom && custom_value.is_none() {
        return Err(invalid("a custom value is required".to_string()));
    }

    rule.action = option.action;
    if let Some(value) = custom_value {
        rule.parameters.custom_value = Some(value.to_string());
    }
    if let Some(OptionHint::DayFirst(day_first)) = option.hint {
        rule.parameters.day_first = Some(day_first);
    }
    rule.approval = if option.action == HitlAction::KeepAsIs {
        ApprovalState::Rejected
    } else {
        ApprovalState::Approved
    };
    rule.user_feedback = answer.rationale.clone();
    Ok(())
}

/// Immutable record of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HITLDecisionLog {
    pub question: HITLQuestion,
    pub answer: HITLAnswer,
    pub resulting_rule: PreprocessingRule,
    pub responder: String,
    pub timestamp: DateTime<Utc>,
    pub followed_recommendation: bool,
}

impl HITLDecisionLog {
    pub fn is_automated(&self) -> bool {
        self.responder.starts_with("system:")
    }
}

/// Aggregates over the decision log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionStatistics {
    pub total_decisions: usize,
    pub automated_decisions: usize,
    pub human_decisions: usize,
    /// Share of decisions that picked the recommended option (0 without decisions).
    pub recommendation_follow_rate: f64,
    pub average_decision_time_ms: f64,
    pub action_distribution: BTreeMap<String, usize>,
}

/// Append-only audit log of HITL decisions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionLog {
    entries: Vec<HITLDecisionLog>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        question: &HITLQuestion,
        answer: &HITLAnswer,
        rule: &PreprocessingRule,
        responder: &str,
    ) {
        self.entries.push(HITLDecisionLog {
            followed_recommendation: answer.selected_option == question.recommended_option,
            question: question.clone(),
            answer: answer.clone(),
            resulting_rule: rule.clone(),
            responder: responder.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[HITLDecisionLog] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> DecisionStatistics {
        let total = self.entries.len();
        if total == 0 {
            return DecisionStatistics::default();
        }

        let automated = self.entries.iter().filter(|e| e.is_automated()).count();
        let followed = self
            .entries
            .iter()
            .filter(|e| e.followed_recommendation)
            .count();
        let total_time: u64 = self.entries.iter().map(|e| e.answer.decision_time_ms).sum();

        let mut action_distribution = BTreeMap::new();
        for entry in &self.entries {
            *action_distribution
                .entry(entry.resulting_rule.action.as_str().to_string())
                .or_insert(0) += 1;
        }

        DecisionStatistics {
            total_decisions: total,
            automated_decisions: automated,
            human_decisions: total - automated,
            recommendation_follow_rate: followed as f64 / total as f64,
            average_decision_time_ms: total_time as f64 / total as f64,
            action_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::QuestionGenerator;
    use crate::types::RuleType;
    use pretty_assertions::assert_eq;

    fn missing_rule() -> PreprocessingRule {
        PreprocessingRule::new(
            RuleType::MissingValueStrategy,
            vec!["age".to_string()],
            "moderate_missing",
            "Impute 'age'",
            HitlAction::ImputeMedian,
            1,
        )
        .with_hitl(true)
        .with_confidence(0.6)
    }

    #[test]
    fn test_apply_answer_approves_rule() {
        let mut rule = missing_rule();
        let question = QuestionGenerator::generate(&rule, None);
        let answer = HITLAnswer::new(&question.id, "mean").with_rationale("mean is fine");

        apply_answer(&mut rule, &question, &answer).unwrap();
        assert_eq!(rule.action, HitlAction::ImputeMean);
        assert_eq!(rule.approval, ApprovalState::Approved);
        assert_eq!(rule.user_feedback.as_deref(), Some("mean is fine"));
    }

    #[test]
    fn test_keep_as_is_rejects_rule() {
        let mut rule = missing_rule();
        let question = QuestionGenerator::generate(&rule, None);
        apply_answer(&mut rule, &question, &HITLAnswer::new(&question.id, "keep")).unwrap();
        assert_eq!(rule.approval, ApprovalState::Rejected);
    }

    #[test]
    fn test_invalid_answers() {
        let mut rule = missing_rule();
        let question = QuestionGenerator::generate(&rule, None);

        let err = apply_answer(&mut rule, &question, &HITLAnswer::new(&question.id, "nope"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ANSWER");

        let err = apply_answer(&mut rule, &question, &HITLAnswer::new("q-other", "mean"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ANSWER");

        let err = apply_answer(&mut rule, &question, &HITLAnswer::new(&question.id, "custom"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ANSWER");
        assert!(rule.is_pending());
    }

    #[test]
    fn test_custom_value_and_date_hint() {
        let mut rule = missing_rule();
        let question = QuestionGenerator::generate(&rule, None);
        let answer = HITLAnswer::new(&question.id, "custom").with_custom_value(" 42 ");
        apply_answer(&mut rule, &question, &answer).unwrap();
        assert_eq!(rule.parameters.custom_value.as_deref(), Some("42"));

        let mut date_rule = PreprocessingRule::new(
            RuleType::DateFormatStandardization,
            vec!["d".to_string()],
            "date_like",
            "dates",
            HitlAction::ConvertType,
            1,
        )
        .with_hitl(true);
        let question = QuestionGenerator::generate(&date_rule, None);
        apply_answer(
            &mut date_rule,
            &question,
            &HITLAnswer::new(&question.id, "month_first"),
        )
        .unwrap();
        assert_eq!(date_rule.parameters.day_first, Some(false));
        assert!(date_rule.is_approved());
    }

    #[test]
    fn test_decision_statistics() {
        let mut log = DecisionLog::new();
        assert_eq!(log.statistics(), DecisionStatistics::default());

        let mut rule = missing_rule();
        let question = QuestionGenerator::generate(&rule, None);

        let recommended = answer_with_recommendation(&question, "auto");
        apply_answer(&mut rule, &question, &recommended).unwrap();
        log.record(&question, &recommended, &rule, RESPONDER_SKIP_HITL);

        let mut human = HITLAnswer::new(&question.id, "mean");
        human.decision_time_ms = 400;
        apply_answer(&mut rule, &question, &human).unwrap();
        log.record(&question, &human, &rule, RESPONDER_USER);

        let stats = log.statistics();
        assert_eq!(stats.total_decisions, 2);
        assert_eq!(stats.automated_decisions, 1);
        assert_eq!(stats.human_decisions, 1);
        assert_eq!(stats.recommendation_follow_rate, 0.5);
        assert_eq!(stats.average_decision_time_ms, 200.0);
        assert_eq!(stats.action_distribution.get("impute_median"), Some(&1));
        assert_eq!(stats.action_distribution.get("impute_mean"), Some(&1));
    }
}
