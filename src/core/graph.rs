//! 编排图：分诊状态机
//!
//! ```text
//! Triaging ──(识别出模块)──► GatheringEvidence ──► Assigning ──► Done
//!    ▲   │
//!    └───┘ 未识别：输出追加到 history 后自环（受 max_iterations 约束）
//! ```
//!
//! 除自环外，每次转移恰好调用一次外部能力，调用严格串行。每次调用都加超时并输出结构化审计日志。
//! 能力失败在 drive 中收敛为失败 Outcome；不变量破坏原样上抛。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::capabilities::{ChangeLookup, Classifier, TicketRequest, TicketSink};
use crate::core::error::{CapabilityError, CapabilityKind, TriageError};
use crate::core::events::TriageEvent;
use crate::core::policy::AssignmentPolicy;
use crate::core::state::{Outcome, Phase, Resolution, TriageFailure, TriageSession};

/// 单次能力调用的默认超时（秒）
pub const DEFAULT_CAPABILITY_TIMEOUT_SECS: u64 = 60;
/// 事件中输出预览的最大字符数
const OUTPUT_PREVIEW_CHARS: usize = 200;

/// 分诊编排图：持有注入的能力实现与分派策略，可被多个会话共享（Arc）
pub struct TriageGraph {
    classifier: Arc<dyn Classifier>,
    changes: Arc<dyn ChangeLookup>,
    tickets: Arc<dyn TicketSink>,
    policy: AssignmentPolicy,
    capability_timeout: Duration,
    event_tx: Option<mpsc::UnboundedSender<TriageEvent>>,
}

impl TriageGraph {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        changes: Arc<dyn ChangeLookup>,
        tickets: Arc<dyn TicketSink>,
        policy: AssignmentPolicy,
    ) -> Self {
        Self {
            classifier,
            changes,
            tickets,
            policy,
            capability_timeout: Duration::from_secs(DEFAULT_CAPABILITY_TIMEOUT_SECS),
            event_tx: None,
        }
    }

    pub fn with_capability_timeout(mut self, secs: u64) -> Self {
        self.capability_timeout = Duration::from_secs(secs);
        self
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<TriageEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn policy(&self) -> &AssignmentPolicy {
        &self.policy
    }

    /// 推进一次转移，返回转移后的阶段。对已结束的会话调用视为不变量破坏。
    pub async fn step(&self, session: &mut TriageSession) -> Result<Phase, TriageError> {
        let before = session.phase();
        match before {
            Phase::Triaging => self.triage(session).await?,
            Phase::GatheringEvidence => self.gather_evidence(session).await?,
            Phase::Assigning => self.assign(session).await?,
            Phase::Done => {
                return Err(TriageError::invariant("step called on a finished session"));
            }
        }

        let after = session.phase();
        if after != before {
            tracing::info!(session = %session.id(), from = %before, to = %after, "phase changed");
            self.emit(TriageEvent::PhaseChanged {
                session_id: session.id().to_string(),
                phase: after,
            });
        }
        Ok(after)
    }

    /// 驱动会话直到终态。分类次数达到 max_iterations 仍未识别模块则以 InconclusiveTriage 结束，
    /// 能力失败以 CapabilityFailure 结束；两者都写入会话而不是返回 Err。
    pub async fn drive(
        &self,
        session: &mut TriageSession,
        max_iterations: usize,
    ) -> Result<(), TriageError> {
        loop {
            match session.phase() {
                Phase::Done => return Ok(()),
                Phase::Triaging if session.iterations() >= max_iterations => {
                    let failure = TriageFailure::InconclusiveTriage {
                        iterations: session.iterations(),
                    };
                    return self.fail(session, failure);
                }
                _ => {}
            }

            match self.step(session).await {
                Ok(_) => {}
                Err(TriageError::Capability { which, source }) => {
                    let failure = TriageFailure::CapabilityFailure {
                        which,
                        detail: source.to_string(),
                    };
                    return self.fail(session, failure);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 以失败终态结束会话
    pub(crate) fn fail(
        &self,
        session: &mut TriageSession,
        failure: TriageFailure,
    ) -> Result<(), TriageError> {
        tracing::warn!(
            session = %session.id(),
            phase = %session.phase(),
            error = %failure,
            "triage failed"
        );
        self.emit(TriageEvent::Failed {
            session_id: session.id().to_string(),
            failure: failure.clone(),
        });
        session.record_outcome(Outcome::Failed(failure))
    }

    async fn triage(&self, session: &mut TriageSession) -> Result<(), TriageError> {
        let result = self
            .call(
                CapabilityKind::Classify,
                self.classifier.classify(session.input(), session.history()),
            )
            .await?;
        tracing::debug!(session = %session.id(), output = %result.output, "classifier output");

        let resolved = session
            .record_classification(result.output.as_str(), result.resolved_module.as_deref())?;
        self.emit(TriageEvent::Classified {
            session_id: session.id().to_string(),
            iteration: session.iterations(),
            resolved_module: session.module().map(str::to_string),
            preview: preview(&result.output),
        });
        if resolved {
            tracing::info!(
                session = %session.id(),
                module = ?session.module(),
                "module identified"
            );
        }
        Ok(())
    }

    async fn gather_evidence(&self, session: &mut TriageSession) -> Result<(), TriageError> {
        let module = session
            .module()
            .map(str::to_string)
            .ok_or_else(|| TriageError::invariant("evidence gathering without a resolved module"))?;

        let evidence = self
            .call(CapabilityKind::LookupChanges, self.changes.lookup_changes(&module))
            .await?;
        tracing::info!(
            session = %session.id(),
            module = %module,
            found = evidence.found,
            author = ?evidence.author,
            change_id = ?evidence.change_id,
            "change evidence gathered"
        );
        self.emit(TriageEvent::EvidenceGathered {
            session_id: session.id().to_string(),
            module,
            found: evidence.found,
            author: evidence.author.clone(),
        });
        session.record_evidence(evidence)
    }

    async fn assign(&self, session: &mut TriageSession) -> Result<(), TriageError> {
        let module = session
            .module()
            .map(str::to_string)
            .ok_or_else(|| TriageError::invariant("assignment without a resolved module"))?;
        let evidence = session
            .change_evidence()
            .cloned()
            .ok_or_else(|| TriageError::invariant("assignment without change evidence"))?;

        let decision = self.policy.decide(&evidence, &module, session.incident_date());
        tracing::info!(
            session = %session.id(),
            group = %decision.assignment_group,
            ticket_type = %decision.ticket_type,
            priority = %decision.priority,
            "assignment decided"
        );
        self.emit(TriageEvent::Assigned {
            session_id: session.id().to_string(),
            assignment_group: decision.assignment_group.clone(),
            ticket_type: decision.ticket_type,
            priority: decision.priority,
        });

        let request = TicketRequest {
            summary: decision.ticket_summary(&module),
            description: session.input().to_string(),
            assignment_group: decision.assignment_group.clone(),
            priority: decision.priority,
        };
        let receipt = self
            .call(CapabilityKind::CreateTicket, self.tickets.create_ticket(&request))
            .await?;
        if receipt.receipt_text.trim().is_empty() {
            return Err(TriageError::capability(
                CapabilityKind::CreateTicket,
                CapabilityError::Malformed("empty receipt_text".to_string()),
            ));
        }
        self.emit(TriageEvent::TicketCreated {
            session_id: session.id().to_string(),
            receipt_text: receipt.receipt_text.clone(),
        });

        let summary_text = decision.final_message(&module, &receipt.receipt_text);
        session.record_outcome(Outcome::Resolved(Resolution {
            module,
            assignment_group: decision.assignment_group,
            ticket_type: decision.ticket_type,
            priority: decision.priority,
            receipt_text: receipt.receipt_text,
            summary_text,
        }))
    }

    /// 在超时内等待一次能力调用，并输出 JSON 审计日志
    async fn call<T, F>(&self, which: CapabilityKind, fut: F) -> Result<T, TriageError>
    where
        F: Future<Output = Result<T, CapabilityError>>,
    {
        let start = Instant::now();
        let result = timeout(self.capability_timeout, fut).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "capability_audit",
            "capability": which.as_str(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "capability");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TriageError::capability(which, e)),
            Err(_) => Err(TriageError::capability(
                which,
                CapabilityError::Timeout(self.capability_timeout.as_secs()),
            )),
        }
    }

    fn emit(&self, event: TriageEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > OUTPUT_PREVIEW_CHARS {
        format!("{}...", s.chars().take(OUTPUT_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::mock::{MockTicketSink, ScriptedClassifier, StaticChangeLookup};
    use crate::capabilities::ClassifyResult;
    use crate::config::TriageSection;

    fn graph(classifier: ScriptedClassifier) -> TriageGraph {
        TriageGraph::new(
            Arc::new(classifier),
            Arc::new(StaticChangeLookup::with_defaults()),
            Arc::new(MockTicketSink::new()),
            AssignmentPolicy::from_config(&TriageSection::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_step_walks_each_phase() {
        let g = graph(ScriptedClassifier::new(vec![
            Ok(ClassifyResult::pending("searching knowledge base")),
            Ok(ClassifyResult::resolved("module_name: billing_service", "billing_service")),
        ]));
        let mut session = TriageSession::new("checkout returns 500");

        assert_eq!(g.step(&mut session).await.unwrap(), Phase::Triaging);
        assert_eq!(g.step(&mut session).await.unwrap(), Phase::GatheringEvidence);
        assert_eq!(g.step(&mut session).await.unwrap(), Phase::Assigning);
        assert_eq!(g.step(&mut session).await.unwrap(), Phase::Done);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_step_on_done_is_invariant_violation() {
        let g = graph(ScriptedClassifier::new(vec![]));
        let mut session = TriageSession::new("x");
        g.drive(&mut session, 0).await.unwrap();
        assert_eq!(session.phase(), Phase::Done);

        let err = g.step(&mut session).await.unwrap_err();
        assert!(matches!(err, TriageError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let g = graph(ScriptedClassifier::new(vec![Ok(ClassifyResult::resolved(
            "module_name: billing_service",
            "billing_service",
        ))]))
        .with_event_tx(tx);
        let mut session = TriageSession::new("checkout returns 500");
        g.drive(&mut session, 3).await.unwrap();
        drop(g);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            let v = serde_json::to_value(&ev).unwrap();
            kinds.push(v["type"].as_str().unwrap().to_string());
        }
        assert_eq!(
            kinds,
            vec![
                "classified",
                "phase_changed",
                "evidence_gathered",
                "phase_changed",
                "assigned",
                "ticket_created",
                "phase_changed",
            ]
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "检".repeat(OUTPUT_PREVIEW_CHARS + 10);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), OUTPUT_PREVIEW_CHARS + 3);
    }
}
