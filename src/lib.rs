//! Triage - IT 故障分诊编排器
//!
//! 一条故障报告依次经过：分类到模块 → 查询该模块近期变更 → 按保修策略决定指派组 → 建单。
//!
//! 模块划分：
//! - **agent**: 按配置装配能力实现与编排图
//! - **capabilities**: 分类、变更查询、建单、知识库四类能力的 trait 与实现（含测试替身）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态机、指派策略、编排图与 run_triage 入口
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）
//! - **observability**: tracing 日志初始化
//! - **tools**: 分类器可调用的工具（知识库检索）与执行器

pub mod agent;
pub mod capabilities;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod tools;

pub use crate::agent::create_triage_graph;
pub use crate::config::{load_config, AppConfig};
pub use crate::core::{
    run_triage, run_triage_with, Outcome, RunOptions, TriageError, TriageFailure, TriageGraph,
};
