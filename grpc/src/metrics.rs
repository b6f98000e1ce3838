use policy_agent_core::{Decision, Verdict};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family};
use prometheus_client::registry::Registry;

/// Decision and sync-health counters. Cheap to clone; clones share the
/// underlying metrics.
#[derive(Clone, Debug)]
pub struct Metrics {
    checks: Family<CheckLabels, Counter>,
    sync_resets: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct CheckLabels {
    decision: &'static str,
    reason: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let checks = Family::<CheckLabels, Counter>::default();
        reg.register(
            "checks",
            "Authorization decisions returned to the dataplane",
            checks.clone(),
        );

        let sync_resets = Counter::default();
        reg.register(
            "sync_resets",
            "Times the policy store was discarded after losing the sync stream",
            sync_resets.clone(),
        );

        Self {
            checks,
            sync_resets,
        }
    }

    pub(crate) fn record_decision(&self, verdict: &Verdict) {
        let labels = match verdict.decision {
            Decision::Allow => CheckLabels {
                decision: "allow",
                reason: "",
            },
            Decision::Deny(reason) => CheckLabels {
                decision: "deny",
                reason: reason.as_str(),
            },
        };
        self.checks.get_or_create(&labels).inc();
    }

    pub(crate) fn record_sync_reset(&self) {
        self.sync_resets.inc();
    }
}
