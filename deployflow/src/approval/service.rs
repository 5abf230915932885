//! Approval service for the manual deployment gate.
//!
//! A request parks a oneshot sender under a fresh token. Chat replies (or
//! an operator) resolve it through [`ApprovalService::decide`]; the gate
//! itself waits through [`ApprovalService::wait`], which also wakes on an
//! execution stop and on the optional timeout.

use crate::cancellation::CancellationToken;
use crate::errors::ApprovalError;
use crate::utils::{now_utc, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Approval gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Waiting for a decision.
    Pending,
    /// Approved; the execution continues to the build.
    Approved,
    /// Rejected; the execution ends.
    Rejected,
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// A decision on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Let the deployment proceed.
    Approve,
    /// Stop the deployment.
    Reject,
}

impl ApprovalDecision {
    /// The state this decision moves the gate to.
    #[must_use]
    pub fn state(self) -> ApprovalState {
        match self {
            Self::Approve => ApprovalState::Approved,
            Self::Reject => ApprovalState::Rejected,
        }
    }
}

impl FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown approval decision '{other}' (expected approve or reject)")),
        }
    }
}

/// Bounds the approval wait and names what happens when it elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalTimeout {
    /// How long to wait.
    pub after: Duration,
    /// Decision applied on expiry.
    pub outcome: ApprovalDecision,
}

/// How a wait on the approval gate ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalResolution {
    /// A reply approved the deployment.
    Approved,
    /// A reply rejected the deployment.
    Rejected,
    /// The timeout elapsed and its outcome was applied.
    TimedOut(ApprovalDecision),
    /// The execution was stopped while waiting.
    Stopped {
        /// Why the execution was stopped.
        reason: String,
    },
}

impl ApprovalResolution {
    /// Returns true if the execution may continue.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved | Self::TimedOut(ApprovalDecision::Approve))
    }
}

/// A pending approval as listed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Token a reply must present.
    pub token: Uuid,
    /// The pipeline waiting.
    pub pipeline_name: String,
    /// The execution waiting.
    pub execution_id: Uuid,
    /// When the approval was requested.
    pub requested_at: Timestamp,
}

/// Handle returned by [`ApprovalService::request`]; pass it to
/// [`ApprovalService::wait`].
#[derive(Debug)]
pub struct ApprovalTicket {
    /// The pending approval.
    pub approval: PendingApproval,
    rx: oneshot::Receiver<ApprovalDecision>,
}

impl ApprovalTicket {
    /// The approval token.
    #[must_use]
    pub fn token(&self) -> Uuid {
        self.approval.token
    }
}

#[derive(Debug)]
struct ApprovalRequest {
    approval: PendingApproval,
    response_tx: Option<oneshot::Sender<ApprovalDecision>>,
}

/// How many resolved tokens are remembered by default.
pub const DEFAULT_RESOLVED_HISTORY: usize = 1024;

/// Final states of resolved tokens, oldest evicted first.
#[derive(Debug)]
struct ResolvedLog {
    limit: usize,
    states: HashMap<Uuid, ApprovalState>,
    order: VecDeque<Uuid>,
}

impl ResolvedLog {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            states: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, token: Uuid, state: ApprovalState) {
        if self.states.insert(token, state).is_none() {
            self.order.push_back(token);
        }
        while self.order.len() > self.limit {
            if let Some(evicted) = self.order.pop_front() {
                self.states.remove(&evicted);
            }
        }
    }

    fn get(&self, token: &Uuid) -> Option<ApprovalState> {
        self.states.get(token).copied()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Service for managing approval requests.
pub struct ApprovalService {
    /// Pending requests.
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
    /// Recently resolved tokens, so late replies get a precise error.
    resolved: RwLock<ResolvedLog>,
}

impl Default for ApprovalService {
    fn default() -> Self {
        Self::with_resolved_history(DEFAULT_RESOLVED_HISTORY)
    }
}

impl ApprovalService {
    /// Creates a new approval service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that remembers at most `limit` resolved tokens.
    /// Replies to older tokens are refused as unknown.
    #[must_use]
    pub fn with_resolved_history(limit: usize) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            resolved: RwLock::new(ResolvedLog::new(limit.max(1))),
        }
    }

    /// Returns how many resolved tokens are currently remembered.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.read().len()
    }

    /// Opens a pending approval for an execution.
    pub fn request(&self, pipeline_name: impl Into<String>, execution_id: Uuid) -> ApprovalTicket {
        let (tx, rx) = oneshot::channel();
        let approval = PendingApproval {
            token: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            execution_id,
            requested_at: now_utc(),
        };

        debug!(
            token = %approval.token,
            pipeline = %approval.pipeline_name,
            execution_id = %execution_id,
            "Approval requested"
        );
        self.requests.write().insert(
            approval.token,
            ApprovalRequest {
                approval: approval.clone(),
                response_tx: Some(tx),
            },
        );

        ApprovalTicket { approval, rx }
    }

    /// Waits until the ticket is decided, the execution is stopped, or the
    /// timeout elapses. A stop wins over a decision that arrives at the
    /// same time.
    pub async fn wait(
        &self,
        ticket: ApprovalTicket,
        timeout: Option<ApprovalTimeout>,
        cancel: &CancellationToken,
    ) -> ApprovalResolution {
        let ApprovalTicket { approval, rx } = ticket;
        let token = approval.token;

        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout.after).await,
                None => std::future::pending::<()>().await,
            }
        };

        let resolution = tokio::select! {
            biased;
            () = cancel.cancelled() => ApprovalResolution::Stopped {
                reason: cancel.reason().unwrap_or_else(|| "execution stopped".to_string()),
            },
            decided = rx => match decided {
                Ok(ApprovalDecision::Approve) => ApprovalResolution::Approved,
                Ok(ApprovalDecision::Reject) => ApprovalResolution::Rejected,
                Err(_) => ApprovalResolution::Stopped {
                    reason: "approval withdrawn".to_string(),
                },
            },
            () = deadline => {
                let outcome = timeout.map_or(ApprovalDecision::Reject, |t| t.outcome);
                ApprovalResolution::TimedOut(outcome)
            }
        };

        if self.requests.write().remove(&token).is_some() {
            if let ApprovalResolution::TimedOut(outcome) = &resolution {
                info!(token = %token, outcome = ?outcome, "Approval timed out");
                self.resolved.write().insert(token, outcome.state());
            }
        }

        resolution
    }

    /// Resolves a pending approval on behalf of a named pipeline.
    ///
    /// # Errors
    ///
    /// Fails if the token is unknown, already resolved, or belongs to a
    /// different pipeline.
    pub fn decide(
        &self,
        token: Uuid,
        pipeline_name: &str,
        decision: ApprovalDecision,
    ) -> Result<ApprovalState, ApprovalError> {
        self.resolve(token, Some(pipeline_name), decision)
    }

    /// Approves a pending request.
    pub fn approve(&self, token: Uuid) -> Result<ApprovalState, ApprovalError> {
        self.resolve(token, None, ApprovalDecision::Approve)
    }

    /// Rejects a pending request.
    pub fn reject(&self, token: Uuid) -> Result<ApprovalState, ApprovalError> {
        self.resolve(token, None, ApprovalDecision::Reject)
    }

    fn resolve(
        &self,
        token: Uuid,
        pipeline_name: Option<&str>,
        decision: ApprovalDecision,
    ) -> Result<ApprovalState, ApprovalError> {
        let mut requests = self.requests.write();
        let Some(request) = requests.get(&token) else {
            drop(requests);
            let resolved = self.resolved.read().get(&token);
            return Err(match resolved {
                Some(state) => ApprovalError::AlreadyResolved {
                    state: state.to_string(),
                },
                None => ApprovalError::UnknownToken {
                    token: token.to_string(),
                },
            });
        };

        if let Some(actual) = pipeline_name {
            if request.approval.pipeline_name != actual {
                return Err(ApprovalError::PipelineMismatch {
                    token: token.to_string(),
                    expected: request.approval.pipeline_name.clone(),
                    actual: actual.to_string(),
                });
            }
        }

        let state = decision.state();
        if let Some(mut request) = requests.remove(&token) {
            if let Some(tx) = request.response_tx.take() {
                let _ = tx.send(decision);
            }
        }
        drop(requests);
        self.resolved.write().insert(token, state);

        info!(token = %token, state = %state, "Approval resolved");
        Ok(state)
    }

    /// Withdraws a pending request; its waiter ends as stopped.
    pub fn cancel(&self, token: Uuid) -> bool {
        self.requests.write().remove(&token).is_some()
    }

    /// Returns the state of a token, if it was ever issued and not withdrawn.
    #[must_use]
    pub fn state(&self, token: Uuid) -> Option<ApprovalState> {
        if self.requests.read().contains_key(&token) {
            return Some(ApprovalState::Pending);
        }
        self.resolved.read().get(&token)
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.read().len()
    }

    /// Lists pending approvals, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<_> = self
            .requests
            .read()
            .values()
            .map(|request| request.approval.clone())
            .collect();
        pending.sort_by_key(|approval| approval.requested_at);
        pending
    }

    /// Returns the pending approval of an execution, if any.
    #[must_use]
    pub fn pending_for(&self, execution_id: Uuid) -> Option<PendingApproval> {
        self.requests
            .read()
            .values()
            .find(|request| request.approval.execution_id == execution_id)
            .map(|request| request.approval.clone())
    }
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_approval_approved() {
        let service = Arc::new(ApprovalService::new());
        let cancel = Arc::new(CancellationToken::new());
        let ticket = service.request("backend-dev", Uuid::new_v4());
        let token = ticket.token();

        let handle = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.wait(ticket, None, &cancel).await })
        };

        assert_eq!(service.pending().len(), 1);
        assert_eq!(service.state(token), Some(ApprovalState::Pending));
        assert_eq!(service.approve(token), Ok(ApprovalState::Approved));

        assert_eq!(handle.await.unwrap(), ApprovalResolution::Approved);
        assert_eq!(service.pending_count(), 0);
        assert_eq!(service.state(token), Some(ApprovalState::Approved));
    }

    #[tokio::test]
    async fn test_approval_rejected() {
        let service = ApprovalService::new();
        let cancel = CancellationToken::new();
        let ticket = service.request("backend-dev", Uuid::new_v4());
        let token = ticket.token();

        service.reject(token).unwrap();
        let resolution = service.wait(ticket, None, &cancel).await;

        assert_eq!(resolution, ApprovalResolution::Rejected);
        assert!(!resolution.is_approved());
    }

    #[tokio::test]
    async fn test_second_decision_is_refused() {
        let service = ApprovalService::new();
        let ticket = service.request("backend-dev", Uuid::new_v4());
        let token = ticket.token();

        service.approve(token).unwrap();
        assert_eq!(
            service.reject(token),
            Err(ApprovalError::AlreadyResolved {
                state: "approved".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_token() {
        let service = ApprovalService::new();
        assert!(matches!(
            service.approve(Uuid::new_v4()),
            Err(ApprovalError::UnknownToken { .. })
        ));
    }

    #[test]
    fn test_decide_checks_pipeline() {
        let service = ApprovalService::new();
        let ticket = service.request("backend-dev", Uuid::new_v4());

        let err = service
            .decide(ticket.token(), "backend-prod", ApprovalDecision::Approve)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::PipelineMismatch { .. }));
        assert_eq!(service.state(ticket.token()), Some(ApprovalState::Pending));

        assert_eq!(
            service.decide(ticket.token(), "backend-dev", ApprovalDecision::Reject),
            Ok(ApprovalState::Rejected)
        );
    }

    #[tokio::test]
    async fn test_approval_timeout_applies_outcome() {
        let service = ApprovalService::new();
        let cancel = CancellationToken::new();
        let ticket = service.request("backend-dev", Uuid::new_v4());
        let token = ticket.token();

        let timeout = ApprovalTimeout {
            after: Duration::from_millis(20),
            outcome: ApprovalDecision::Reject,
        };
        let resolution = service.wait(ticket, Some(timeout), &cancel).await;

        assert_eq!(resolution, ApprovalResolution::TimedOut(ApprovalDecision::Reject));
        assert_eq!(service.state(token), Some(ApprovalState::Rejected));
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_wakes_waiter() {
        let service = Arc::new(ApprovalService::new());
        let cancel = Arc::new(CancellationToken::new());
        let execution_id = Uuid::new_v4();
        let ticket = service.request("backend-dev", execution_id);
        let token = ticket.token();

        let handle = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.wait(ticket, None, &cancel).await })
        };

        assert!(service.pending_for(execution_id).is_some());
        cancel.cancel("Superseded");

        assert_eq!(
            handle.await.unwrap(),
            ApprovalResolution::Stopped {
                reason: "Superseded".to_string()
            }
        );
        assert!(service.pending_for(execution_id).is_none());
        assert!(matches!(service.approve(token), Err(ApprovalError::UnknownToken { .. })));
    }

    #[tokio::test]
    async fn test_withdrawn_request_ends_as_stopped() {
        let service = ApprovalService::new();
        let cancel = CancellationToken::new();
        let ticket = service.request("backend-dev", Uuid::new_v4());

        assert!(service.cancel(ticket.token()));
        let resolution = service.wait(ticket, None, &cancel).await;
        assert!(matches!(resolution, ApprovalResolution::Stopped { .. }));
    }

    #[test]
    fn test_resolved_history_is_bounded() {
        let service = ApprovalService::with_resolved_history(2);
        let tokens: Vec<Uuid> = (0..3)
            .map(|_| {
                let token = service.request("backend-dev", Uuid::new_v4()).token();
                service.approve(token).unwrap();
                token
            })
            .collect();

        assert_eq!(service.resolved_count(), 2);
        assert_eq!(service.state(tokens[0]), None);
        assert!(matches!(service.reject(tokens[0]), Err(ApprovalError::UnknownToken { .. })));
        assert_eq!(service.state(tokens[2]), Some(ApprovalState::Approved));
        assert!(matches!(service.reject(tokens[2]), Err(ApprovalError::AlreadyResolved { .. })));
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("approve".parse(), Ok(ApprovalDecision::Approve));
        assert_eq!(" Reject ".parse(), Ok(ApprovalDecision::Reject));
        assert!("maybe".parse::<ApprovalDecision>().is_err());
    }
}
