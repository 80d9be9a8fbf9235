//! 组件装配：根据配置构建 TriageGraph
//!
//! 能力实现只在这里构造，再通过 TriageGraph::new 注入；核心从不自行创建外部客户端。
//! 分类器由 `llm.provider` 显式选择：keyword（离线关键词分类）或 openai / deepseek（需要 API Key）。
//! 配置了 LLM 却缺少 Key、provider 不合法时都直接报配置错误，不做隐式降级。

use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::mock::{KeywordClassifier, MockTicketSink, StaticChangeLookup};
use crate::capabilities::{
    ChangeLookup, Classifier, DisabledKnowledgeBase, ElasticsearchKnowledgeBase, GitChangeLookup,
    HttpTicketSink, KnowledgeBase, LlmClassifier, TicketSink,
};
use crate::config::AppConfig;
use crate::core::{AssignmentPolicy, TriageError, TriageGraph};
use crate::llm::{LlmClient, OpenAiClient, DEEPSEEK_BASE_URL};
use crate::tools::{KnowledgeBaseTool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端；provider 为 keyword（或 mock）时返回 None
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Option<Arc<dyn LlmClient>>, TriageError> {
    select_llm(
        cfg,
        std::env::var("DEEPSEEK_API_KEY").ok(),
        std::env::var("OPENAI_API_KEY").ok(),
    )
}

fn select_llm(
    cfg: &AppConfig,
    deepseek_key: Option<String>,
    openai_key: Option<String>,
) -> Result<Option<Arc<dyn LlmClient>>, TriageError> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);

    match provider.as_str() {
        "keyword" | "mock" => Ok(None),
        "deepseek" => {
            let key = deepseek_key.or(openai_key).ok_or_else(|| {
                TriageError::config("llm.provider = deepseek requires DEEPSEEK_API_KEY")
            })?;
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            let client = OpenAiClient::new(Some(base), &cfg.llm.model, Some(&key))
                .with_request_timeout(timeout);
            Ok(Some(Arc::new(client)))
        }
        "openai" => {
            let key = openai_key.ok_or_else(|| {
                TriageError::config("llm.provider = openai requires OPENAI_API_KEY")
            })?;
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&key))
                .with_request_timeout(timeout);
            Ok(Some(Arc::new(client)))
        }
        other => Err(TriageError::config(format!("unknown llm provider '{other}'"))),
    }
}

pub fn create_knowledge_base(cfg: &AppConfig) -> Result<Arc<dyn KnowledgeBase>, TriageError> {
    match cfg.knowledge_base.url.as_deref() {
        Some(url) => Ok(Arc::new(ElasticsearchKnowledgeBase::new(url, &cfg.knowledge_base)?)),
        None => {
            tracing::info!("Knowledge base not configured, searches will report unavailable");
            Ok(Arc::new(DisabledKnowledgeBase))
        }
    }
}

/// 分类器：provider 为 keyword 时用关键词分类器，否则用 LLM + 知识库工具
pub fn create_classifier(cfg: &AppConfig) -> Result<Arc<dyn Classifier>, TriageError> {
    let Some(llm) = create_llm_from_config(cfg)? else {
        tracing::info!("Using keyword classifier");
        return Ok(Arc::new(KeywordClassifier::with_defaults()));
    };

    let mut tools = ToolRegistry::new();
    tools.register(KnowledgeBaseTool::new(create_knowledge_base(cfg)?));
    let executor = ToolExecutor::new(tools, cfg.knowledge_base.timeout_secs);

    let mut classifier = LlmClassifier::new(llm, executor);
    if let Some(path) = &cfg.llm.system_prompt_path {
        let prompt = std::fs::read_to_string(path).map_err(|e| {
            TriageError::config(format!("system prompt {}: {e}", path.display()))
        })?;
        classifier = classifier.with_system_prompt(prompt);
    }
    Ok(Arc::new(classifier))
}

pub fn create_change_lookup(cfg: &AppConfig) -> Result<Arc<dyn ChangeLookup>, TriageError> {
    match cfg.changes.provider.to_lowercase().as_str() {
        "git" => {
            tracing::info!(
                repo = %cfg.changes.repo_root.display(),
                branch = %cfg.changes.branch,
                "Using git change lookup"
            );
            Ok(Arc::new(GitChangeLookup::from_config(&cfg.changes)))
        }
        "static" => Ok(Arc::new(StaticChangeLookup::with_defaults())),
        other => Err(TriageError::config(format!("unknown changes provider '{other}'"))),
    }
}

pub fn create_ticket_sink(cfg: &AppConfig) -> Result<Arc<dyn TicketSink>, TriageError> {
    match cfg.ticketing.provider.to_lowercase().as_str() {
        "http" => {
            let endpoint = cfg.ticketing.endpoint.as_deref().ok_or_else(|| {
                TriageError::config("ticketing.endpoint is required for the http provider")
            })?;
            Ok(Arc::new(HttpTicketSink::new(endpoint, cfg.ticketing.timeout_secs)?))
        }
        "mock" => Ok(Arc::new(MockTicketSink::new())),
        other => Err(TriageError::config(format!("unknown ticketing provider '{other}'"))),
    }
}

/// 按配置装配完整的编排图
pub fn create_triage_graph(cfg: &AppConfig) -> Result<TriageGraph, TriageError> {
    let policy = AssignmentPolicy::from_config(&cfg.triage)?;
    Ok(TriageGraph::new(
        create_classifier(cfg)?,
        create_change_lookup(cfg)?,
        create_ticket_sink(cfg)?,
        policy,
    )
    .with_capability_timeout(cfg.triage.capability_timeout_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "keyword".to_string();
        cfg
    }

    #[test]
    fn test_keyword_provider_has_no_llm() {
        assert!(select_llm(&mock_config(), None, None).unwrap().is_none());

        let mut cfg = mock_config();
        cfg.llm.provider = "mock".to_string();
        assert!(select_llm(&cfg, None, None).unwrap().is_none());
    }

    #[test]
    fn test_llm_provider_without_key_is_config_error() {
        let mut cfg = mock_config();
        cfg.llm.provider = "openai".to_string();
        assert!(matches!(select_llm(&cfg, None, None), Err(TriageError::Config(_))));
        // DeepSeek 的 Key 不能用于 openai
        assert!(matches!(
            select_llm(&cfg, Some("sk-ds".to_string()), None),
            Err(TriageError::Config(_))
        ));
        assert!(select_llm(&cfg, None, Some("sk-test".to_string())).unwrap().is_some());

        cfg.llm.provider = "deepseek".to_string();
        assert!(matches!(select_llm(&cfg, None, None), Err(TriageError::Config(_))));
        assert!(select_llm(&cfg, Some("sk-ds".to_string()), None).unwrap().is_some());

        cfg.llm.provider = "claude".to_string();
        assert!(matches!(
            select_llm(&cfg, None, Some("sk-test".to_string())),
            Err(TriageError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_providers_are_config_errors() {
        let mut cfg = mock_config();
        cfg.changes.provider = "svn".to_string();
        assert!(matches!(create_change_lookup(&cfg), Err(TriageError::Config(_))));

        let mut cfg = mock_config();
        cfg.ticketing.provider = "jira".to_string();
        assert!(matches!(create_ticket_sink(&cfg), Err(TriageError::Config(_))));
    }

    #[test]
    fn test_http_ticketing_requires_endpoint() {
        let mut cfg = mock_config();
        cfg.ticketing.provider = "http".to_string();
        assert!(create_ticket_sink(&cfg).is_err());
        cfg.ticketing.endpoint = Some("http://remedy.local/api/tickets".to_string());
        assert!(create_ticket_sink(&cfg).is_ok());
    }

    #[test]
    fn test_default_graph_assembles() {
        assert!(create_triage_graph(&mock_config()).is_ok());
    }
}
