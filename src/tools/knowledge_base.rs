//! 知识库检索工具：把 KnowledgeBase 能力暴露给分类器 LLM

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capabilities::KnowledgeBase;
use crate::core::CapabilityError;
use crate::tools::Tool;

pub const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";

pub struct KnowledgeBaseTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl KnowledgeBaseTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        SEARCH_KNOWLEDGE_BASE
    }

    fn description(&self) -> &str {
        "Search the internal knowledge base for diagnostic information, runbooks, and module documentation. Args: {\"query\": \"text\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look up" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, CapabilityError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CapabilityError::Malformed("missing 'query' argument".to_string()))?;
        self.kb.search(query).await
    }
}
