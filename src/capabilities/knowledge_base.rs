//! 知识库检索：Elasticsearch 运维手册索引
//!
//! 只做全文 match 查询并取前 top_k 条，不做向量化。检索失败时按配置降级为提示文本或上抛错误，
//! 由调用方决定，不在构造期静默回落。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::capabilities::KnowledgeBase;
use crate::config::KnowledgeBaseSection;
use crate::core::{CapabilityError, TriageError};

/// 知识库不可用时返回给分类器的提示
pub const UNAVAILABLE_NOTICE: &str =
    "Knowledge base search is currently unavailable. Proceeding with triage.";
/// 没有命中时的提示
pub const NO_RESULTS_NOTICE: &str = "No relevant knowledge base documents found.";

/// 一条命中文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbDocument {
    pub source: String,
    pub content: String,
}

/// 把命中文档格式化为分类器可读的文本
pub fn format_hits(docs: &[KbDocument]) -> String {
    if docs.is_empty() {
        return NO_RESULTS_NOTICE.to_string();
    }
    docs.iter()
        .map(|d| format!("Source: {}\nContent: {}", d.source, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 从 `_search` 响应中取出文档；来源优先 metadata.source，其次 source，缺省为 KB
pub fn parse_hits(response: &Value, text_field: &str) -> Vec<KbDocument> {
    response["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let src = &hit["_source"];
                    let content = src[text_field].as_str()?.trim();
                    if content.is_empty() {
                        return None;
                    }
                    let source = src["metadata"]["source"]
                        .as_str()
                        .or_else(|| src["source"].as_str())
                        .unwrap_or("KB");
                    Some(KbDocument {
                        source: source.to_string(),
                        content: content.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Elasticsearch 知识库
pub struct ElasticsearchKnowledgeBase {
    client: reqwest::Client,
    url: String,
    index: String,
    text_field: String,
    top_k: usize,
    degrade_on_error: bool,
}

impl ElasticsearchKnowledgeBase {
    pub fn new(url: &str, cfg: &KnowledgeBaseSection) -> Result<Self, TriageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| TriageError::config(format!("knowledge base client: {e}")))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            index: cfg.index.clone(),
            text_field: cfg.text_field.clone(),
            top_k: cfg.top_k,
            degrade_on_error: cfg.degrade_on_error,
        })
    }

    fn query_body(&self, query: &str) -> Value {
        let mut field = Map::new();
        field.insert(self.text_field.clone(), Value::String(query.to_string()));
        serde_json::json!({
            "size": self.top_k,
            "query": { "match": Value::Object(field) }
        })
    }

    async fn search_hits(&self, query: &str) -> Result<Vec<KbDocument>, CapabilityError> {
        let endpoint = format!("{}/{}/_search", self.url, self.index);
        let resp = self
            .client
            .post(&endpoint)
            .json(&self.query_body(query))
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::Failed(format!("HTTP {}: {}", status, body.trim())));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        Ok(parse_hits(&value, &self.text_field))
    }
}

#[async_trait]
impl KnowledgeBase for ElasticsearchKnowledgeBase {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        match self.search_hits(query).await {
            Ok(docs) => Ok(format_hits(&docs)),
            Err(e) if self.degrade_on_error => {
                tracing::warn!(
                    error = %e,
                    index = %self.index,
                    "knowledge base search failed, degrading"
                );
                Ok(UNAVAILABLE_NOTICE.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

/// 未配置知识库时使用：始终返回不可用提示
#[derive(Debug, Default)]
pub struct DisabledKnowledgeBase;

#[async_trait]
impl KnowledgeBase for DisabledKnowledgeBase {
    async fn search(&self, _query: &str) -> Result<String, CapabilityError> {
        Ok(UNAVAILABLE_NOTICE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hits_reads_metadata_source() {
        let resp = serde_json::json!({
            "hits": { "hits": [
                {
                    "_source": {
                        "text": "Restart the billing pods.",
                        "metadata": { "source": "runbooks/billing.md" }
                    }
                },
                { "_source": { "text": "Auth uses SSO.", "source": "wiki/auth" } },
                { "_source": { "text": "No source here." } },
                { "_source": { "other": "skipped" } }
            ]}
        });
        let docs = parse_hits(&resp, "text");
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].source, "runbooks/billing.md");
        assert_eq!(docs[1].source, "wiki/auth");
        assert_eq!(docs[2].source, "KB");
    }

    #[test]
    fn test_parse_hits_tolerates_garbage() {
        assert!(parse_hits(&serde_json::json!({"error": "index missing"}), "text").is_empty());
    }

    #[test]
    fn test_format_hits() {
        let docs = vec![
            KbDocument {
                source: "a".into(),
                content: "one".into(),
            },
            KbDocument {
                source: "b".into(),
                content: "two".into(),
            },
        ];
        assert_eq!(format_hits(&docs), "Source: a\nContent: one\n\nSource: b\nContent: two");
        assert_eq!(format_hits(&[]), NO_RESULTS_NOTICE);
    }

    #[test]
    fn test_query_body_uses_text_field() {
        let cfg = KnowledgeBaseSection {
            text_field: "page_content".to_string(),
            top_k: 5,
            ..KnowledgeBaseSection::default()
        };
        let kb = ElasticsearchKnowledgeBase::new("http://localhost:9200/", &cfg).unwrap();
        let body = kb.query_body("checkout 500");
        assert_eq!(body["size"], 5);
        assert_eq!(body["query"]["match"]["page_content"], "checkout 500");
        assert_eq!(kb.url, "http://localhost:9200");
    }

    #[tokio::test]
    async fn test_unreachable_search_degrades_or_fails() {
        // 端口 9 (discard) 上通常没有 HTTP 服务
        let cfg = KnowledgeBaseSection {
            timeout_secs: 2,
            ..KnowledgeBaseSection::default()
        };
        let kb = ElasticsearchKnowledgeBase::new("http://127.0.0.1:9", &cfg).unwrap();
        assert_eq!(kb.search("anything").await.unwrap(), UNAVAILABLE_NOTICE);

        let strict = KnowledgeBaseSection {
            degrade_on_error: false,
            ..cfg
        };
        let kb = ElasticsearchKnowledgeBase::new("http://127.0.0.1:9", &strict).unwrap();
        assert!(kb.search("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_kb() {
        assert_eq!(DisabledKnowledgeBase.search("q").await.unwrap(), UNAVAILABLE_NOTICE);
    }
}
