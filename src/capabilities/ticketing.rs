//! 工单系统写入：向配置的 HTTP 端点 POST 建单请求
//!
//! 响应为 `{"receipt_text": "..."}` 时取该字段，否则把响应体原样当作回执。

use std::time::Duration;

use async_trait::async_trait;

use crate::capabilities::{TicketReceipt, TicketRequest, TicketSink};
use crate::core::{CapabilityError, TriageError};

pub struct HttpTicketSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTicketSink {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, TriageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TriageError::config(format!("ticketing client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// 解析建单响应体
pub fn parse_receipt(body: &str) -> Result<TicketReceipt, CapabilityError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(CapabilityError::Malformed("empty ticket response".to_string()));
    }
    if body.starts_with('{') {
        return serde_json::from_str(body)
            .map_err(|e| CapabilityError::Malformed(format!("missing receipt_text: {e}")));
    }
    Ok(TicketReceipt {
        receipt_text: body.to_string(),
    })
}

#[async_trait]
impl TicketSink for HttpTicketSink {
    async fn create_ticket(
        &self,
        request: &TicketRequest,
    ) -> Result<TicketReceipt, CapabilityError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        if !status.is_success() {
            return Err(CapabilityError::Failed(format!("HTTP {}: {}", status, body.trim())));
        }
        parse_receipt(&body)
    }
}
