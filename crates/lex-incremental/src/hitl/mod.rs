//! Human-in-the-loop protocol.
//!
//! Rules that need a decision are turned into [`HITLQuestion`]s. Answers
//! come back as [`HITLAnswer`]s, are applied to their rule and recorded in
//! the [`DecisionLog`]. Automated answers (skip-HITL, auto-approval) go
//! through the same path with a `system:` responder.

pub mod decision;
pub mod question;

pub use decision::{
    DecisionLog, DecisionStatistics, HITLAnswer, HITLDecisionLog, RESPONDER_AUTO_APPROVAL,
    RESPONDER_SKIP_HITL, RESPONDER_USER, answer_with_recommendation, apply_answer,
};
pub use question::{
    HITLContext, HITLOption, HITLQuestion, OptionHint, QuestionGenerator, QuestionType,
};
