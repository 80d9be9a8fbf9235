//! 会话入口：run_triage
//!
//! 为每条故障报告新建 TriageSession，在迭代上限、可选墙钟超时与可选取消令牌下驱动编排图，
//! 并保证恰好返回一个 Outcome。只有不变量破坏（状态机 bug）会以 Err 返回。

use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::config::TriageSection;
use crate::core::error::TriageError;
use crate::core::graph::TriageGraph;
use crate::core::state::{Outcome, TriageFailure, TriageSession};

/// 单次会话的运行参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_iterations: usize,
    /// 墙钟超时，超时得到 TimedOut（区别于 InconclusiveTriage）
    pub timeout: Option<Duration>,
    pub cancel_token: Option<CancellationToken>,
    /// 故障日期，缺省为当天
    pub incident_date: Option<NaiveDate>,
}

impl RunOptions {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            timeout: None,
            cancel_token: None,
            incident_date: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_incident_date(mut self, date: NaiveDate) -> Self {
        self.incident_date = Some(date);
        self
    }
}

impl From<&TriageSection> for RunOptions {
    fn from(cfg: &TriageSection) -> Self {
        let mut opts = Self::new(cfg.max_iterations);
        if let Some(secs) = cfg.session_timeout_secs {
            opts = opts.with_timeout(Duration::from_secs(secs));
        }
        opts
    }
}

/// 对一条故障报告跑完分诊，最多分类 max_iterations 次
pub async fn run_triage(
    graph: &TriageGraph,
    input: &str,
    max_iterations: usize,
) -> Result<Outcome, TriageError> {
    run_triage_with(graph, input, RunOptions::new(max_iterations)).await
}

pub async fn run_triage_with(
    graph: &TriageGraph,
    input: &str,
    opts: RunOptions,
) -> Result<Outcome, TriageError> {
    let mut session = TriageSession::new(input);
    if let Some(date) = opts.incident_date {
        session = session.with_incident_date(date);
    }
    let session_id = session.id().to_string();
    tracing::info!(session = %session_id, max_iterations = opts.max_iterations, "triage started");

    let cancel = opts.cancel_token.clone().unwrap_or_default();
    let interrupted: Result<Option<TriageFailure>, TriageError> = {
        let drive = graph.drive(&mut session, opts.max_iterations);
        let bounded = async {
            match opts.timeout {
                Some(limit) => match tokio::time::timeout(limit, drive).await {
                    Ok(res) => res.map(|_| None),
                    Err(_) => Ok(Some(TriageFailure::TimedOut {
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })),
                },
                None => drive.await.map(|_| None),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Some(TriageFailure::Cancelled)),
            res = bounded => res,
        }
    };

    if let Some(failure) = interrupted? {
        if !session.is_terminal() {
            graph.fail(&mut session, failure)?;
        }
    }

    let outcome = session
        .into_outcome()
        .ok_or_else(|| TriageError::invariant("session finished without an outcome"))?;
    tracing::info!(session = %session_id, resolved = outcome.is_resolved(), "triage finished");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let cfg = TriageSection {
            max_iterations: 7,
            session_timeout_secs: Some(90),
            ..TriageSection::default()
        };
        let opts = RunOptions::from(&cfg);
        assert_eq!(opts.max_iterations, 7);
        assert_eq!(opts.timeout, Some(Duration::from_secs(90)));
        assert!(opts.cancel_token.is_none());

        let opts = RunOptions::from(&TriageSection::default());
        assert!(opts.timeout.is_none());
    }
}
