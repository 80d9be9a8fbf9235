//! 分诊错误类型
//!
//! CapabilityError 由外部能力（分类 / 变更查询 / 建单 / 知识库）返回；
//! TriageError 是编排核心自身的错误：能力失败由 runner 收敛为失败 Outcome，
//! 不变量破坏说明状态机有 bug，直接中止会话。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 核心调用的外部能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Classify,
    LookupChanges,
    CreateTicket,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::LookupChanges => "lookup_changes",
            Self::CreateTicket => "create_ticket",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 外部能力调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("call failed: {0}")]
    Failed(String),

    /// 返回结果缺少必需字段或无法解析
    #[error("malformed result: {0}")]
    Malformed(String),

    #[error("timeout after {0}s")]
    Timeout(u64),
}

/// 编排核心错误
#[derive(Error, Debug)]
pub enum TriageError {
    /// 状态机内部不变量被破坏（不可达分支），中止会话而非生成 Outcome
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Capability {which} failed: {source}")]
    Capability {
        which: CapabilityKind,
        #[source]
        source: CapabilityError,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl TriageError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn capability(which: CapabilityKind, source: CapabilityError) -> Self {
        Self::Capability { which, source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
