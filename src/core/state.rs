//! 状态定义：TriageSession 与分诊结果
//!
//! 一次故障报告对应一个 TriageSession，由编排图独占并按顺序推进。
//! 字段写入只能走 record_* 方法，写入顺序（module → change_evidence → outcome）在这里强制：
//! module 只写一次，证据只在 module 之后写入，成功结果只在证据之后写入，结果写入后会话终止。

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::error::{CapabilityKind, TriageError};
use crate::core::policy;

/// 编排阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Triaging,
    GatheringEvidence,
    Assigning,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Triaging => "triaging",
            Self::GatheringEvidence => "gathering_evidence",
            Self::Assigning => "assigning",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// 工单优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P1 => f.write_str("P1"),
            Self::P2 => f.write_str("P2"),
        }
    }
}

/// 工单类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketType {
    WarrantyTicket,
    ProductionIncident,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WarrantyTicket => f.write_str("Warranty Ticket"),
            Self::ProductionIncident => f.write_str("Production Incident"),
        }
    }
}

/// 版本库近期变更查询结果；found 为 false 时其余字段无意义
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvidence {
    pub found: bool,
    pub commit_date: Option<NaiveDate>,
    pub author: Option<String>,
    pub change_id: Option<String>,
}

impl ChangeEvidence {
    /// 没有近期变更
    pub fn none() -> Self {
        Self::default()
    }

    pub fn found(author: impl Into<String>) -> Self {
        Self {
            found: true,
            author: Some(author.into()),
            ..Self::default()
        }
    }

    pub fn with_commit_date(mut self, date: NaiveDate) -> Self {
        self.commit_date = Some(date);
        self
    }

    pub fn with_change_id(mut self, id: impl Into<String>) -> Self {
        self.change_id = Some(id.into());
        self
    }
}

/// 成功分诊的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub module: String,
    pub assignment_group: String,
    pub ticket_type: TicketType,
    pub priority: Priority,
    /// 工单系统返回的回执，原样透出
    pub receipt_text: String,
    /// 面向用户的最终回复
    pub summary_text: String,
}

/// 会话的失败终态
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriageFailure {
    #[error("triage inconclusive after {iterations} classification rounds")]
    InconclusiveTriage { iterations: usize },

    #[error("capability {which} failed: {detail}")]
    CapabilityFailure { which: CapabilityKind, detail: String },

    #[error("session timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    #[error("session cancelled")]
    Cancelled,
}

/// 会话终态：成功或带标签的失败，二者必居其一
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Resolved(Resolution),
    Failed(TriageFailure),
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TriageFailure> {
        match self {
            Self::Resolved(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    /// 发回给报告人的文本
    pub fn final_response(&self) -> String {
        match self {
            Self::Resolved(r) => r.summary_text.clone(),
            Self::Failed(TriageFailure::InconclusiveTriage { .. }) => {
                "Error: Module name was not identified during triage.".to_string()
            }
            Self::Failed(f) => format!("Error: {f}"),
        }
    }
}

/// 一次故障报告的分诊会话
#[derive(Debug, Clone)]
pub struct TriageSession {
    id: String,
    input: String,
    incident_date: NaiveDate,
    history: Vec<String>,
    module: Option<String>,
    last_agent_output: Option<String>,
    change_evidence: Option<ChangeEvidence>,
    outcome: Option<Outcome>,
    iterations: usize,
}

impl TriageSession {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            id: format!("triage_{}", uuid::Uuid::new_v4()),
            input: input.into(),
            incident_date: chrono::Utc::now().date_naive(),
            history: Vec::new(),
            module: None,
            last_agent_output: None,
            change_evidence: None,
            outcome: None,
            iterations: 0,
        }
    }

    /// 故障发生日期，仅用于保修窗口判断（默认当天）
    pub fn with_incident_date(mut self, date: NaiveDate) -> Self {
        self.incident_date = date;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn incident_date(&self) -> NaiveDate {
        self.incident_date
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn last_agent_output(&self) -> Option<&str> {
        self.last_agent_output.as_deref()
    }

    pub fn change_evidence(&self) -> Option<&ChangeEvidence> {
        self.change_evidence.as_ref()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// 已执行的分类次数
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn phase(&self) -> Phase {
        policy::route(self)
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// 记录一次分类结果：给出模块则写入 module，否则把输出追加到 history 继续分诊。
    /// 返回是否已识别出模块。
    pub fn record_classification(
        &mut self,
        output: impl Into<String>,
        resolved_module: Option<&str>,
    ) -> Result<bool, TriageError> {
        if self.phase() != Phase::Triaging {
            return Err(TriageError::invariant(format!(
                "classification recorded in phase {}",
                self.phase()
            )));
        }
        let output = output.into();
        self.iterations += 1;
        self.last_agent_output = Some(output.clone());

        match resolved_module.map(str::trim).filter(|m| !m.is_empty()) {
            Some(module) => {
                self.module = Some(module.to_string());
                Ok(true)
            }
            None => {
                self.history.push(output);
                Ok(false)
            }
        }
    }

    pub fn record_evidence(&mut self, evidence: ChangeEvidence) -> Result<(), TriageError> {
        if self.module.is_none() {
            return Err(TriageError::invariant(
                "change evidence recorded before module was resolved",
            ));
        }
        if self.change_evidence.is_some() {
            return Err(TriageError::invariant("change evidence recorded twice"));
        }
        if self.is_terminal() {
            return Err(TriageError::invariant("change evidence recorded on a finished session"));
        }
        self.change_evidence = Some(evidence);
        Ok(())
    }

    /// 写入终态。失败结果任何阶段都可写入；成功结果必须在证据之后。
    pub fn record_outcome(&mut self, outcome: Outcome) -> Result<(), TriageError> {
        if self.is_terminal() {
            return Err(TriageError::invariant("outcome recorded twice"));
        }
        if outcome.is_resolved() && self.change_evidence.is_none() {
            return Err(TriageError::invariant(
                "resolved outcome recorded before change evidence",
            ));
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn into_outcome(self) -> Option<Outcome> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(module: &str) -> Outcome {
        Outcome::Resolved(Resolution {
            module: module.to_string(),
            assignment_group: "L2_Support_Triage".to_string(),
            ticket_type: TicketType::ProductionIncident,
            priority: Priority::P1,
            receipt_text: "ok".to_string(),
            summary_text: "done".to_string(),
        })
    }

    #[test]
    fn test_pending_classification_appends_history() {
        let mut session = TriageSession::new("checkout is down");
        let resolved = session.record_classification("need more context", None).unwrap();
        assert!(!resolved);
        assert_eq!(session.history(), &["need more context".to_string()]);
        assert_eq!(session.last_agent_output(), Some("need more context"));
        assert_eq!(session.iterations(), 1);
        assert_eq!(session.phase(), Phase::Triaging);
    }

    #[test]
    fn test_blank_module_is_not_resolution() {
        let mut session = TriageSession::new("x");
        assert!(!session.record_classification("module_name:", Some("  ")).unwrap());
        assert!(session.module().is_none());
    }

    #[test]
    fn test_module_is_write_once() {
        let mut session = TriageSession::new("x");
        assert!(session
            .record_classification("module_name: billing_service", Some(" billing_service "))
            .unwrap());
        assert_eq!(session.module(), Some("billing_service"));
        assert_eq!(session.phase(), Phase::GatheringEvidence);

        let err = session
            .record_classification("module_name: auth", Some("auth"))
            .unwrap_err();
        assert!(matches!(err, TriageError::InvariantViolation(_)));
        assert_eq!(session.module(), Some("billing_service"));
        // 追加失败不应污染 history
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_evidence_requires_module() {
        let mut session = TriageSession::new("x");
        let err = session.record_evidence(ChangeEvidence::none()).unwrap_err();
        assert!(matches!(err, TriageError::InvariantViolation(_)));
        assert!(session.change_evidence().is_none());
    }

    #[test]
    fn test_evidence_recorded_once() {
        let mut session = TriageSession::new("x");
        session.record_classification("m", Some("billing_service")).unwrap();
        session.record_evidence(ChangeEvidence::none()).unwrap();
        assert_eq!(session.phase(), Phase::Assigning);
        assert!(session.record_evidence(ChangeEvidence::found("Vendor_TCS")).is_err());
        assert_eq!(session.change_evidence(), Some(&ChangeEvidence::none()));
    }

    #[test]
    fn test_resolved_outcome_requires_evidence() {
        let mut session = TriageSession::new("x");
        session.record_classification("m", Some("billing_service")).unwrap();
        assert!(session.record_outcome(resolved("billing_service")).is_err());
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_failure_outcome_allowed_while_triaging() {
        let mut session = TriageSession::new("x");
        session
            .record_outcome(Outcome::Failed(TriageFailure::InconclusiveTriage { iterations: 0 }))
            .unwrap();
        assert_eq!(session.phase(), Phase::Done);
        assert!(session.record_classification("late", Some("m")).is_err());
    }

    #[test]
    fn test_outcome_is_terminal() {
        let mut session = TriageSession::new("x");
        session.record_classification("m", Some("billing_service")).unwrap();
        session.record_evidence(ChangeEvidence::none()).unwrap();
        session.record_outcome(resolved("billing_service")).unwrap();
        assert!(session.is_terminal());
        assert!(session.record_outcome(Outcome::Failed(TriageFailure::Cancelled)).is_err());
        assert!(session.into_outcome().unwrap().is_resolved());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(TicketType::WarrantyTicket.to_string(), "Warranty Ticket");
        assert_eq!(TicketType::ProductionIncident.to_string(), "Production Incident");
        assert_eq!(Priority::P1.to_string(), "P1");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::Failed(TriageFailure::CapabilityFailure {
            which: CapabilityKind::LookupChanges,
            detail: "boom".to_string(),
        }))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["detail"]["kind"], "capability_failure");
        assert_eq!(json["detail"]["which"], "lookup_changes");
    }
}
