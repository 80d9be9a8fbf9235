//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock），供分类器使用

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use message::{Message, Role};
pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage, DEEPSEEK_BASE_URL};
pub use traits::{LlmClient, LlmError};
