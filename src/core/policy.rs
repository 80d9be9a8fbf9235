//! 决策策略：路由与分派
//!
//! - `route`：根据会话已写入的字段决定下一阶段
//! - `AssignmentPolicy::decide`：把变更证据映射为分派组 / 工单类型 / 优先级
//!
//! 三路分类，优先级从高到低：有无近期变更 > 作者是否带供应商标签。
//! 保修窗口可选；未配置时任何供应商变更都视为在保。

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use crate::config::TriageSection;
use crate::core::error::TriageError;
use crate::core::state::{ChangeEvidence, Phase, Priority, TicketType, TriageSession};

/// 下一阶段：结果已定 → Done；证据已有 → Assigning；模块已识别 → GatheringEvidence；否则继续 Triaging
pub fn route(session: &TriageSession) -> Phase {
    if session.outcome().is_some() {
        Phase::Done
    } else if session.change_evidence().is_some() {
        Phase::Assigning
    } else if session.module().is_some() {
        Phase::GatheringEvidence
    } else {
        Phase::Triaging
    }
}

/// 分派决策（派生值，不单独存储）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentDecision {
    pub assignment_group: String,
    pub ticket_type: TicketType,
    pub priority: Priority,
}

impl AssignmentDecision {
    /// 工单标题，如 `billing_service Production Issue - Warranty Ticket`
    pub fn ticket_summary(&self, module: &str) -> String {
        format!("{} Production Issue - {}", module, self.ticket_type)
    }

    /// 面向报告人的最终回复
    pub fn final_message(&self, module: &str, receipt_text: &str) -> String {
        format!(
            "Triage complete. Identified module: **{}**.\n{}\nAssigned based on **Warranty Check** ({}).",
            module, receipt_text, self.ticket_type
        )
    }
}

/// 分派策略
#[derive(Debug, Clone)]
pub struct AssignmentPolicy {
    vendor_pattern: Regex,
    vendor_group_template: String,
    l2_group: String,
    architect_prefix: String,
    priority: Priority,
    warranty_window_days: Option<u32>,
}

impl AssignmentPolicy {
    pub fn from_config(cfg: &TriageSection) -> Result<Self, TriageError> {
        let vendor_pattern = Regex::new(&cfg.vendor_pattern).map_err(|e| {
            TriageError::config(format!("invalid vendor_pattern '{}': {e}", cfg.vendor_pattern))
        })?;
        Ok(Self {
            vendor_pattern,
            vendor_group_template: cfg.vendor_group_template.clone(),
            l2_group: cfg.l2_group.clone(),
            architect_prefix: cfg.architect_prefix.clone(),
            priority: cfg.priority,
            warranty_window_days: cfg.warranty_window_days,
        })
    }

    pub fn with_warranty_window_days(mut self, days: Option<u32>) -> Self {
        self.warranty_window_days = days;
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// 作者带供应商标签时返回对应的供应商组名
    pub fn vendor_group(&self, author: &str) -> Option<String> {
        let caps = self.vendor_pattern.captures(author)?;
        let tag = caps
            .get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str())
            .filter(|t| !t.is_empty())?;
        Some(self.vendor_group_template.replace("{tag}", tag))
    }

    pub fn decide(
        &self,
        evidence: &ChangeEvidence,
        module: &str,
        incident_date: NaiveDate,
    ) -> AssignmentDecision {
        if !evidence.found {
            return AssignmentDecision {
                assignment_group: self.l2_group.clone(),
                ticket_type: TicketType::ProductionIncident,
                priority: self.priority,
            };
        }

        let vendor = evidence
            .author
            .as_deref()
            .and_then(|a| self.vendor_group(a))
            .filter(|_| self.within_warranty(evidence, incident_date));

        match vendor {
            Some(group) => AssignmentDecision {
                assignment_group: group,
                ticket_type: TicketType::WarrantyTicket,
                priority: self.priority,
            },
            None => AssignmentDecision {
                assignment_group: format!("{}{}", self.architect_prefix, module),
                ticket_type: TicketType::ProductionIncident,
                priority: self.priority,
            },
        }
    }

    /// 未配置窗口时恒为 true；配置后要求提交日期已知且落在 [incident - window, incident] 内
    fn within_warranty(&self, evidence: &ChangeEvidence, incident_date: NaiveDate) -> bool {
        let Some(window) = self.warranty_window_days else {
            return true;
        };
        match evidence.commit_date {
            Some(committed) => {
                let age = incident_date.signed_duration_since(committed).num_days();
                (0..=i64::from(window)).contains(&age)
            }
            None => false,
        }
    }
}
