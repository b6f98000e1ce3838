//! The authorization check handler.

use crate::metrics::Metrics;
use policy_agent_core::{evaluate, Decision, PolicyStore, RequestCache, Verdict};
use policy_agent_proto::authz::{
    check_response, CheckRequest, CheckResponse, Code, DeniedHttpResponse, HttpStatus,
    OkHttpResponse, RpcStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::debug;

/// Answers authorization checks against the shared policy store. The
/// transport shim mounts one of these as the check RPC handler.
#[derive(Clone, Debug)]
pub struct CheckService {
    store: Arc<PolicyStore>,
    metrics: Metrics,
    check_timeout: Duration,
}

// === impl CheckService ===

impl CheckService {
    pub fn new(store: Arc<PolicyStore>, metrics: Metrics, check_timeout: Duration) -> Self {
        Self {
            store,
            metrics,
            check_timeout,
        }
    }

    /// Evaluates one check request to a response.
    ///
    /// A decision is always produced within the deadline: malformed input
    /// and store lookup misses degrade to no-match, never to an error
    /// status. Only deadline expiry surfaces as a status, and no decision
    /// is recorded for it.
    pub async fn check(&self, request: CheckRequest) -> Result<CheckResponse, tonic::Status> {
        let decide = async {
            // One snapshot for the whole call: concurrent updates apply to
            // later calls.
            let snapshot = self.store.snapshot();
            let req = RequestCache::new(&snapshot, &request);
            evaluate(&req)
        };
        let verdict = match time::timeout(self.check_timeout, decide).await {
            Ok(verdict) => verdict,
            Err(_) => {
                return Err(tonic::Status::unavailable("authorization deadline expired"));
            }
        };
        debug!(decision = ?verdict.decision, applied = ?verdict.applied, "check evaluated");
        self.metrics.record_decision(&verdict);
        Ok(to_response(&verdict))
    }
}

fn to_response(verdict: &Verdict) -> CheckResponse {
    match verdict.decision {
        Decision::Allow => CheckResponse {
            status: Some(RpcStatus {
                code: Code::Ok as i32,
                message: String::new(),
            }),
            http_response: Some(check_response::HttpResponse::OkResponse(OkHttpResponse {})),
        },
        Decision::Deny(reason) => CheckResponse {
            status: Some(RpcStatus {
                code: Code::PermissionDenied as i32,
                message: reason.to_string(),
            }),
            http_response: Some(check_response::HttpResponse::DeniedResponse(
                DeniedHttpResponse {
                    status: Some(HttpStatus { code: 403 }),
                    body: String::new(),
                },
            )),
        },
    }
}
