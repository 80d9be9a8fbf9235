//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRIAGE__*` 覆盖（双下划线表示嵌套，如 `TRIAGE__TRIAGE__MAX_ITERATIONS=5`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::core::Priority;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub triage: TriageSection,
    pub knowledge_base: KnowledgeBaseSection,
    pub changes: ChangesSection,
    pub ticketing: TicketingSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：分类器背后的模型选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 分类器后端：keyword（离线关键词分类）/ openai / deepseek；后两者缺少 API Key 时装配失败
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 覆盖内置的分诊 system prompt
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "keyword".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            request_timeout_secs: 60,
            system_prompt_path: None,
        }
    }
}

/// [triage] 段：状态机上限、超时与分派策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriageSection {
    /// Triaging 自环的最大分类次数
    pub max_iterations: usize,
    /// 工单优先级（常量，不参与计算）
    pub priority: Priority,
    /// 单个会话的墙钟超时（秒），不设则不限
    pub session_timeout_secs: Option<u64>,
    /// 单次能力调用超时（秒）
    pub capability_timeout_secs: u64,
    /// 保修窗口（天）；不设时任何供应商变更都视为在保
    pub warranty_window_days: Option<u32>,
    /// 供应商作者识别正则，第一个捕获组为供应商标签
    pub vendor_pattern: String,
    /// 供应商组名模板，`{tag}` 替换为捕获到的标签
    pub vendor_group_template: String,
    /// 无近期变更时的默认组
    pub l2_group: String,
    /// 内部架构师组前缀，后接模块名
    pub architect_prefix: String,
}

impl Default for TriageSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            priority: Priority::P1,
            session_timeout_secs: None,
            capability_timeout_secs: 60,
            warranty_window_days: None,
            vendor_pattern: "^Vendor_([A-Za-z0-9]+)".to_string(),
            vendor_group_template: "Vendor_{tag}".to_string(),
            l2_group: "L2_Support_Triage".to_string(),
            architect_prefix: "SA_Architect_".to_string(),
        }
    }
}

/// [knowledge_base] 段：Elasticsearch 运维手册索引
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseSection {
    /// 未设置时知识库检索始终返回「不可用」提示
    pub url: Option<String>,
    pub index: String,
    /// 文档正文所在字段
    pub text_field: String,
    pub top_k: usize,
    pub timeout_secs: u64,
    /// 检索失败时是否降级为提示文本（false 则作为能力失败上抛）
    pub degrade_on_error: bool,
}

impl Default for KnowledgeBaseSection {
    fn default() -> Self {
        Self {
            url: None,
            index: "it_runbooks".to_string(),
            text_field: "text".to_string(),
            top_k: 3,
            timeout_secs: 15,
            degrade_on_error: true,
        }
    }
}

/// [changes] 段：近期变更查询
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChangesSection {
    /// git / static
    pub provider: String,
    pub repo_root: PathBuf,
    pub branch: String,
    pub commit_limit: usize,
    /// 模块名 -> 仓库内路径；未列出的模块按同名目录查询
    pub module_paths: HashMap<String, String>,
}

impl Default for ChangesSection {
    fn default() -> Self {
        Self {
            provider: "static".to_string(),
            repo_root: PathBuf::from("."),
            branch: "main".to_string(),
            commit_limit: 5,
            module_paths: HashMap::new(),
        }
    }
}

/// [ticketing] 段：工单系统写入
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TicketingSection {
    /// http / mock
    pub provider: String,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TicketingSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 TRIAGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRIAGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRIAGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_routing_groups() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.triage.max_iterations, 10);
        assert_eq!(cfg.llm.provider, "keyword");
        assert_eq!(cfg.triage.priority, Priority::P1);
        assert_eq!(cfg.triage.l2_group, "L2_Support_Triage");
        assert_eq!(cfg.triage.architect_prefix, "SA_Architect_");
        assert!(cfg.triage.warranty_window_days.is_none());
        assert_eq!(cfg.knowledge_base.index, "it_runbooks");
        assert_eq!(cfg.knowledge_base.top_k, 3);
    }

    #[test]
    fn test_load_config_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[triage]\nmax_iterations = 4\nwarranty_window_days = 30\npriority = \"P2\"\n\n[changes]\nprovider = \"git\"\n\n[changes.module_paths]\nbilling_service = \"services/billing\""
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.triage.max_iterations, 4);
        assert_eq!(cfg.triage.warranty_window_days, Some(30));
        assert_eq!(cfg.triage.priority, Priority::P2);
        // 未写的键保持默认
        assert_eq!(cfg.triage.l2_group, "L2_Support_Triage");
        assert_eq!(cfg.changes.provider, "git");
        assert_eq!(
            cfg.changes.module_paths.get("billing_service").map(String::as_str),
            Some("services/billing")
        );
    }
}
