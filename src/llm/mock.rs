//! 脚本化 Mock LLM（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本用完后重复最后一条（没有脚本时返回一条不含模块的纯文本）。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{LlmClient, LlmError, Message};

/// Mock 客户端：逐条回放脚本，并记录每次收到的消息
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    received: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            received: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用收到的完整消息列表
    pub async fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.received.lock().await.push(messages.to_vec());

        let next = self.replies.lock().await.pop_front();
        let mut last = self.last.lock().await;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                Ok(reply)
            }
            None => Ok(last
                .clone()
                .unwrap_or_else(|| "I need more details about the failing component.".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let llm = ScriptedLlmClient::new(["a", "b"]);
        let msgs = [Message::user("hi")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "a");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "b");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "b");
        assert_eq!(llm.received().await.len(), 3);
    }
}
