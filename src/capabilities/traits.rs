//! 外部能力契约
//!
//! 编排核心只通过这四个 trait 与外界交互；实现方（LLM、git、工单系统、Elasticsearch 或测试替身）
//! 由调用方注入。核心视其为无状态、可重入的服务，不做重试与限流。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{CapabilityError, ChangeEvidence, Priority};

/// 分类结果：resolved_module 仅在分类器认为模块识别完成时存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyResult {
    pub output: String,
    pub resolved_module: Option<String>,
}

impl ClassifyResult {
    pub fn resolved(output: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            resolved_module: Some(module.into()),
        }
    }

    /// 尚未识别出模块，输出会进入 history 供下一轮使用
    pub fn pending(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            resolved_module: None,
        }
    }
}

/// 建单请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketRequest {
    pub summary: String,
    pub description: String,
    pub assignment_group: String,
    pub priority: Priority,
}

/// 建单回执，receipt_text 原样透出到最终结果
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketReceipt {
    pub receipt_text: String,
}

/// 分类：从故障描述中识别受影响模块
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        input: &str,
        history: &[String],
    ) -> Result<ClassifyResult, CapabilityError>;
}

/// 近期变更查询
#[async_trait]
pub trait ChangeLookup: Send + Sync {
    async fn lookup_changes(&self, module: &str) -> Result<ChangeEvidence, CapabilityError>;
}

/// 工单系统写入
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn create_ticket(
        &self,
        request: &TicketRequest,
    ) -> Result<TicketReceipt, CapabilityError>;
}

/// 知识库检索（只在分类器内部使用）
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, CapabilityError>;
}
