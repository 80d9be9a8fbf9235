//! 能力替身（用于测试与离线演示，无需 LLM / git / 工单系统）
//!
//! - ScriptedClassifier：按脚本逐条返回分类结果
//! - KeywordClassifier：按关键词识别模块（无 API Key 时的默认分类器）
//! - StaticChangeLookup：内存中的变更表，默认含 billing_service 的供应商提交
//! - MockTicketSink：生成 `Remedy Ticket R-99001 ...` 形式的回执
//! - StaticKnowledgeBase：内存文档，按关键词命中

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::capabilities::knowledge_base::{format_hits, KbDocument};
use crate::capabilities::{
    ChangeLookup, Classifier, ClassifyResult, KnowledgeBase, TicketReceipt, TicketRequest,
    TicketSink,
};
use crate::core::{CapabilityError, ChangeEvidence};

const STILL_PENDING: &str = "I still need more information to identify the affected module.";

/// 脚本化分类器：脚本用完后一直返回「未识别」
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<ClassifyResult, CapabilityError>>>,
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Result<ClassifyResult, CapabilityError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
        }
    }

    /// 永不识别模块
    pub fn never_resolves() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用时收到的 history
    pub async fn histories(&self) -> Vec<Vec<String>> {
        self.histories.lock().await.clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        _input: &str,
        history: &[String],
    ) -> Result<ClassifyResult, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().await.push(history.to_vec());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(ClassifyResult::pending(STILL_PENDING)))
    }
}

/// 关键词分类器：报告（含 history）中出现关键词即识别为对应模块
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(String, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// 内置规则：结账/支付 → billing_service，登录/认证 → auth_service
    pub fn with_defaults() -> Self {
        Self::new()
            .rule("billing_service", &["checkout", "payment", "billing", "invoice"])
            .rule("auth_service", &["login", "password", "sign-in", "authentication"])
            .rule("search_service", &["search results", "search index"])
    }

    pub fn rule(mut self, module: &str, keywords: &[&str]) -> Self {
        self.rules.push((
            module.to_string(),
            keywords.iter().map(|k| k.to_lowercase()).collect(),
        ));
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        input: &str,
        history: &[String],
    ) -> Result<ClassifyResult, CapabilityError> {
        let haystack = std::iter::once(input)
            .chain(history.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();

        let hit = self
            .rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())));
        match hit {
            Some((module, _)) => Ok(ClassifyResult::resolved(
                format!("module_name: {}", module),
                module.clone(),
            )),
            None => Ok(ClassifyResult::pending(STILL_PENDING)),
        }
    }
}

/// 内存变更表，模块名不区分大小写
#[derive(Debug, Default)]
pub struct StaticChangeLookup {
    changes: HashMap<String, ChangeEvidence>,
    calls: Mutex<Vec<String>>,
}

impl StaticChangeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// billing_service 最近有一条 Vendor_TCS 的提交，其它模块没有变更
    pub fn with_defaults() -> Self {
        Self::new().with_change(
            "billing_service",
            ChangeEvidence {
                found: true,
                commit_date: NaiveDate::from_ymd_opt(2025, 11, 28),
                author: Some("Vendor_TCS".to_string()),
                change_id: Some("COMMIT-A123".to_string()),
            },
        )
    }

    pub fn with_change(mut self, module: &str, evidence: ChangeEvidence) -> Self {
        self.changes.insert(module.to_lowercase(), evidence);
        self
    }

    /// 按调用顺序记录的模块名
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ChangeLookup for StaticChangeLookup {
    async fn lookup_changes(&self, module: &str) -> Result<ChangeEvidence, CapabilityError> {
        self.calls.lock().await.push(module.to_string());
        Ok(self
            .changes
            .get(&module.to_lowercase())
            .cloned()
            .unwrap_or_else(ChangeEvidence::none))
    }
}

/// Mock 工单系统：编号从 R-99001 递增，并记录所有请求
#[derive(Debug)]
pub struct MockTicketSink {
    next_id: AtomicU64,
    requests: Mutex<Vec<TicketRequest>>,
}

impl MockTicketSink {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(99001),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<TicketRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockTicketSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketSink for MockTicketSink {
    async fn create_ticket(
        &self,
        request: &TicketRequest,
    ) -> Result<TicketReceipt, CapabilityError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        Ok(TicketReceipt {
            receipt_text: format!(
                "Remedy Ticket R-{} created. Assigned to: {}. Priority: {}.",
                id, request.assignment_group, request.priority
            ),
        })
    }
}

/// 内存知识库：查询中任一词（长度 ≥ 3）出现在文档里即命中
#[derive(Debug, Default)]
pub struct StaticKnowledgeBase {
    docs: Vec<KbDocument>,
}

impl StaticKnowledgeBase {
    pub fn new(docs: Vec<(&str, &str)>) -> Self {
        Self {
            docs: docs
                .into_iter()
                .map(|(source, content)| KbDocument {
                    source: source.to_string(),
                    content: content.to_string(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|t| t.chars().count() >= 3)
            .map(str::to_lowercase)
            .collect();
        let hits: Vec<KbDocument> = self
            .docs
            .iter()
            .filter(|d| {
                let content = d.content.to_lowercase();
                terms.iter().any(|t| content.contains(t.as_str()))
            })
            .take(3)
            .cloned()
            .collect();
        Ok(format_hits(&hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Priority;

    #[tokio::test]
    async fn test_keyword_classifier() {
        let c = KeywordClassifier::with_defaults();
        let r = c
            .classify("The checkout service is giving 500 errors", &[])
            .await
            .unwrap();
        assert_eq!(r.resolved_module.as_deref(), Some("billing_service"));

        let r = c.classify("Something is slow", &[]).await.unwrap();
        assert!(r.resolved_module.is_none());

        // history 中的线索同样生效
        let r = c
            .classify("Something is slow", &["users cannot login".to_string()])
            .await
            .unwrap();
        assert_eq!(r.resolved_module.as_deref(), Some("auth_service"));
    }

    #[tokio::test]
    async fn test_static_lookup_defaults() {
        let lookup = StaticChangeLookup::with_defaults();
        let ev = lookup.lookup_changes("Billing_Service").await.unwrap();
        assert!(ev.found);
        assert_eq!(ev.author.as_deref(), Some("Vendor_TCS"));
        assert_eq!(ev.change_id.as_deref(), Some("COMMIT-A123"));
        assert!(!lookup.lookup_changes("auth").await.unwrap().found);
        assert_eq!(lookup.calls().await, vec!["Billing_Service", "auth"]);
    }

    #[tokio::test]
    async fn test_mock_ticket_receipts() {
        let sink = MockTicketSink::new();
        let req = TicketRequest {
            summary: "s".to_string(),
            description: "d".to_string(),
            assignment_group: "Vendor_TCS".to_string(),
            priority: Priority::P1,
        };
        let first = sink.create_ticket(&req).await.unwrap();
        assert_eq!(
            first.receipt_text,
            "Remedy Ticket R-99001 created. Assigned to: Vendor_TCS. Priority: P1."
        );
        let second = sink.create_ticket(&req).await.unwrap();
        assert!(second.receipt_text.starts_with("Remedy Ticket R-99002"));
        assert_eq!(sink.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_static_kb_search() {
        let kb = StaticKnowledgeBase::new(vec![
            ("runbooks/billing.md", "Checkout payments go through billing_service."),
            ("runbooks/auth.md", "Login issues: check the SSO gateway."),
        ]);
        let hit = kb.search("checkout errors").await.unwrap();
        assert!(hit.contains("runbooks/billing.md"));
        assert!(!hit.contains("runbooks/auth.md"));
    }
}
