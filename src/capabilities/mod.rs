//! 外部能力：契约（traits）与实现
//!
//! - **traits**: Classifier / ChangeLookup / TicketSink / KnowledgeBase 契约
//! - **llm_classifier**: LLM + 知识库工具的模块识别
//! - **knowledge_base**: Elasticsearch 运维手册检索
//! - **git_changes**: git log 近期变更查询
//! - **ticketing**: HTTP 工单系统写入
//! - **mock**: 测试与离线演示用替身

pub mod git_changes;
pub mod knowledge_base;
pub mod llm_classifier;
pub mod mock;
pub mod ticketing;
pub mod traits;

pub use git_changes::GitChangeLookup;
pub use knowledge_base::{DisabledKnowledgeBase, ElasticsearchKnowledgeBase};
pub use llm_classifier::LlmClassifier;
pub use ticketing::HttpTicketSink;
pub use traits::{
    ChangeLookup, Classifier, ClassifyResult, KnowledgeBase, TicketReceipt, TicketRequest,
    TicketSink,
};
