//! 分诊过程事件：供 Slack 机器人 / 前端实时展示每一步

use serde::Serialize;

use crate::core::state::{Phase, Priority, TicketType, TriageFailure};

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriageEvent {
    /// 阶段切换
    PhaseChanged { session_id: String, phase: Phase },
    /// 一次分类完成（输出预览，避免过长）
    Classified {
        session_id: String,
        iteration: usize,
        resolved_module: Option<String>,
        preview: String,
    },
    /// 近期变更已查询
    EvidenceGathered {
        session_id: String,
        module: String,
        found: bool,
        author: Option<String>,
    },
    /// 策略给出分派
    Assigned {
        session_id: String,
        assignment_group: String,
        ticket_type: TicketType,
        priority: Priority,
    },
    /// 工单已创建
    TicketCreated { session_id: String, receipt_text: String },
    /// 会话以失败结束
    Failed { session_id: String, failure: TriageFailure },
}
