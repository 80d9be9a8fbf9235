//! LLM 分类器：用大模型从故障描述中识别受影响模块
//!
//! 每次 classify 调用一次 LLM，回复必须是以下 JSON 之一：
//! - `{"module_name": "billing_service"}`：识别完成
//! - `{"tool": "search_knowledge_base", "args": {"query": "..."}}`：先查知识库，观察结果作为本轮输出返回，
//!   由编排图追加到 history 后再调一轮
//!
//! 其它纯文本视为「尚未识别」，同样进入 history。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::{Classifier, ClassifyResult};
use crate::core::CapabilityError;
use crate::llm::{LlmClient, Message};
use crate::tools::{classifier_reply_schema_json, ToolExecutor};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the Intelligent Triage, Warranty, and Vendor Management Agent. \
Your only task is to determine the 'module_name' the user is having a problem with. \
If you need external information, call one of the available tools. \
Once the module_name is identified, stop talking and reply with the module JSON.";

/// 工具观察结果写入 history 时的前缀
pub const OBSERVATION_PREFIX: &str = "Observation from ";

const CONTINUE_PROMPT: &str =
    "Continue the triage using the observations above. Reply with exactly one JSON object.";

/// 解析后的分类器回复
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierReply {
    Module(String),
    ToolCall { tool: String, args: Value },
    Text(String),
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    module_name: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Value,
}

/// 解析 LLM 输出：JSON 块（```json ... ``` 或裸 JSON）或 `module_name: xxx` 行；都没有则为纯文本。
/// 只有显式的 ```json 块无法解析时返回 Malformed；裸花括号解析失败（如日志模板 `{orderId}`）按纯文本处理。
pub fn parse_reply(output: &str) -> Result<ClassifierReply, CapabilityError> {
    let trimmed = output.trim();

    let raw: RawReply = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let json_str = rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
        serde_json::from_str(json_str)
            .map_err(|e| CapabilityError::Malformed(format!("{}: {}", e, json_str)))?
    } else {
        let json_str = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => return Ok(parse_plain(trimmed)),
        };
        match serde_json::from_str(json_str) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "brace slice is not JSON, treating reply as text");
                return Ok(parse_plain(trimmed));
            }
        }
    };

    if let Some(module) = non_blank(raw.module_name) {
        return Ok(ClassifierReply::Module(module));
    }
    if let Some(tool) = non_blank(raw.tool) {
        let args = if raw.args.is_null() {
            serde_json::json!({})
        } else {
            raw.args
        };
        return Ok(ClassifierReply::ToolCall { tool, args });
    }
    Ok(ClassifierReply::Text(trimmed.to_string()))
}

fn parse_plain(text: &str) -> ClassifierReply {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("module_name:"))
        .map(|m| m.trim().trim_matches(|c| c == '*' || c == '`').to_string())
        .find(|m| !m.is_empty())
        .map(ClassifierReply::Module)
        .unwrap_or_else(|| ClassifierReply::Text(text.to_string()))
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// LLM 分类器：持有 LLM、工具执行器与 system prompt
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    tools: ToolExecutor,
    system_prompt: String,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolExecutor) -> Self {
        Self {
            llm,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn system_message(&self) -> String {
        format!(
            "{}\n\nAvailable tools:\n{}\n\nReply with exactly one JSON object matching this schema:\n{}\n\nExamples:\n{{\"module_name\": \"billing_service\"}}\n{{\"tool\": \"search_knowledge_base\", \"args\": {{\"query\": \"checkout 500 errors\"}}}}",
            self.system_prompt,
            self.tools.tools_schema_json(),
            classifier_reply_schema_json()
        )
    }

    fn build_messages(&self, input: &str, history: &[String]) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_message()), Message::user(input)];
        messages.extend(history.iter().map(|h| {
            if h.starts_with(OBSERVATION_PREFIX) {
                Message::user(h.clone())
            } else {
                Message::assistant(h.clone())
            }
        }));
        if !history.is_empty() {
            messages.push(Message::user(CONTINUE_PROMPT));
        }
        messages
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        input: &str,
        history: &[String],
    ) -> Result<ClassifyResult, CapabilityError> {
        let messages = self.build_messages(input, history);
        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::debug!(prompt_tokens, completion_tokens, total_tokens, "classifier token usage");

        match parse_reply(&raw)? {
            ClassifierReply::Module(module) => Ok(ClassifyResult::resolved(raw, module)),
            ClassifierReply::ToolCall { tool, args } => {
                if !self.tools.has_tool(&tool) {
                    tracing::warn!(tool = %tool, "classifier requested an unknown tool");
                    return Ok(ClassifyResult::pending(format!(
                        "Unknown tool '{}'. Available tools: {}",
                        tool,
                        self.tools.tool_names().join(", ")
                    )));
                }
                let observation = self.tools.execute(&tool, args).await?;
                Ok(ClassifyResult::pending(format!(
                    "{}{}:\n{}",
                    OBSERVATION_PREFIX, tool, observation
                )))
            }
            ClassifierReply::Text(text) => Ok(ClassifyResult::pending(text)),
        }
    }
}
