//! 工具箱：分类器在识别模块前可调用的工具（目前只有知识库检索）与执行器

pub mod executor;
pub mod knowledge_base;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use knowledge_base::{KnowledgeBaseTool, SEARCH_KNOWLEDGE_BASE};
pub use registry::{Tool, ToolRegistry};
pub use schema::classifier_reply_schema_json;
