//! 分类器回复格式的 JSON Schema（schemars 生成）
//!
//! 注入 system prompt，约束 LLM 只输出「识别结果」或「工具调用」两种 JSON。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 分类器回复格式（仅用于 Schema 生成，解析见 capabilities::llm_classifier）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ClassifierReplyFormat {
    /// 已识别出的受影响模块，如 billing_service；未识别时省略
    pub module_name: Option<String>,
    /// 需要更多信息时调用的工具名，如 search_knowledge_base
    pub tool: Option<String>,
    /// 工具参数，如 {"query": "checkout 500 errors"}
    pub args: Option<HashMap<String, String>>,
}

/// 返回分类器回复的 JSON Schema 字符串，可拼入 system prompt
pub fn classifier_reply_schema_json() -> String {
    let schema = schema_for!(ClassifierReplyFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mentions_reply_fields() {
        let schema = classifier_reply_schema_json();
        assert!(schema.contains("module_name"));
        assert!(schema.contains("tool"));
        assert!(schema.contains("args"));
    }
}
