//! The policy evaluator.
//!
//! Walks the local endpoint's tiered policy list against one request and
//! produces a [`Verdict`]. Evaluation is bounded and performs no I/O: every
//! decision is a pure function of the snapshot and the request.

use crate::matcher;
use crate::request::RequestCache;
use policy_agent_proto::sync::{PolicyId, ProfileId, Rule};
use std::fmt;
use tracing::{debug, info, warn};

/// The outcome of one authorization call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,

    /// The policy or profile whose rule decided, when one did.
    pub applied: Option<AppliedRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// The store has not yet seen the control plane's in-sync marker.
    NotReady,

    /// No workload endpoint has been configured for this agent.
    NoEndpoint,

    /// A rule with a deny action matched.
    Policy,

    /// A tier had applicable policies and none of their rules matched.
    EndOfTierDrop,

    /// Nothing matched anywhere; the default is deny.
    NoRuleMatch,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotReady => "not-ready",
            DenyReason::NoEndpoint => "no-endpoint",
            DenyReason::Policy => "policy",
            DenyReason::EndOfTierDrop => "end-of-tier-drop",
            DenyReason::NoRuleMatch => "no-rule-match",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Names what decided a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppliedRef {
    Policy(PolicyId),
    Profile(String),
}

impl Verdict {
    fn allow(applied: AppliedRef) -> Self {
        Self {
            decision: Decision::Allow,
            applied: Some(applied),
        }
    }

    fn deny(reason: DenyReason, applied: Option<AppliedRef>) -> Self {
        Self {
            decision: Decision::Deny(reason),
            applied,
        }
    }
}

/// The action a rule requests when it matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RuleAction {
    Allow,
    Deny,
    Log,
    Pass,
}

impl RuleAction {
    /// Parses the wire action string, case-insensitively. Unrecognized
    /// actions yield `None`; the caller skips such rules.
    fn parse(action: &str) -> Option<Self> {
        if action.eq_ignore_ascii_case("allow") {
            Some(RuleAction::Allow)
        } else if action.eq_ignore_ascii_case("deny") {
            Some(RuleAction::Deny)
        } else if action.eq_ignore_ascii_case("log") {
            Some(RuleAction::Log)
        } else if action.eq_ignore_ascii_case("pass") {
            Some(RuleAction::Pass)
        } else {
            None
        }
    }
}

/// What a rule scan concluded: a terminal action, a tier skip, or nothing.
enum RulesOutcome {
    Allow,
    Deny,
    Pass,
    NoMatch,
}

/// Evaluates the request against the snapshot held by the cache.
///
/// The agent protects inbound traffic to the destination workload, so tiers
/// walk their ingress policy lists. The first matching rule decides; `pass`
/// abandons the current tier; a tier with applicable policies and no match
/// applies the implicit end-of-tier drop. Profiles are the fallback after
/// all tiers, and the final default is deny.
pub fn evaluate(req: &RequestCache<'_>) -> Verdict {
    let snapshot = req.snapshot();
    if !snapshot.in_sync {
        debug!("store not in sync; denying");
        return Verdict::deny(DenyReason::NotReady, None);
    }
    let Some(endpoint) = &snapshot.endpoint else {
        warn!("no workload endpoint configured; denying");
        return Verdict::deny(DenyReason::NoEndpoint, None);
    };

    for tier in &endpoint.tiers {
        let mut any_policy_applied = false;
        let mut passed = false;
        for name in &tier.ingress_policies {
            let id = PolicyId {
                tier: tier.name.clone(),
                name: name.clone(),
            };
            let Some(policy) = snapshot.policy_by_id.get(&id) else {
                warn!(tier = %id.tier, policy = %id.name, "active policy not in store");
                continue;
            };
            any_policy_applied = true;
            match check_rules(&policy.inbound_rules, req, &policy.namespace) {
                RulesOutcome::Allow => {
                    debug!(tier = %id.tier, policy = %id.name, "allowed by policy");
                    return Verdict::allow(AppliedRef::Policy(id));
                }
                RulesOutcome::Deny => {
                    debug!(tier = %id.tier, policy = %id.name, "denied by policy");
                    return Verdict::deny(DenyReason::Policy, Some(AppliedRef::Policy(id)));
                }
                RulesOutcome::Pass => {
                    debug!(tier = %id.tier, policy = %id.name, "passed to next tier");
                    passed = true;
                    break;
                }
                RulesOutcome::NoMatch => {}
            }
        }
        if passed {
            continue;
        }
        if any_policy_applied {
            debug!(tier = %tier.name, "end of tier, no rule matched; denying");
            return Verdict::deny(DenyReason::EndOfTierDrop, None);
        }
        // A tier with no applicable policies imposes nothing.
    }

    for name in &endpoint.profile_ids {
        let id = ProfileId { name: name.clone() };
        let Some(profile) = snapshot.profile_by_id.get(&id) else {
            warn!(profile = %id.name, "active profile not in store");
            continue;
        };
        // Profiles are global: no namespace scoping applies.
        match check_rules(&profile.inbound_rules, req, "") {
            RulesOutcome::Allow => {
                debug!(profile = %id.name, "allowed by profile");
                return Verdict::allow(AppliedRef::Profile(id.name));
            }
            RulesOutcome::Deny => {
                debug!(profile = %id.name, "denied by profile");
                return Verdict::deny(DenyReason::Policy, Some(AppliedRef::Profile(id.name)));
            }
            RulesOutcome::Pass | RulesOutcome::NoMatch => {}
        }
    }

    debug!("no tier or profile matched; denying");
    Verdict::deny(DenyReason::NoRuleMatch, None)
}

/// Scans a rule list in order. The first matching rule determines the
/// outcome, except that a matching `log` rule is recorded and the scan
/// continues.
fn check_rules(rules: &[Rule], req: &RequestCache<'_>, policy_namespace: &str) -> RulesOutcome {
    for rule in rules {
        let Some(action) = RuleAction::parse(&rule.action) else {
            warn!(action = %rule.action, "skipping rule with unrecognized action");
            continue;
        };
        if !matcher::match_rule(rule, req, policy_namespace) {
            continue;
        }
        match action {
            RuleAction::Allow => return RulesOutcome::Allow,
            RuleAction::Deny => return RulesOutcome::Deny,
            RuleAction::Pass => return RulesOutcome::Pass,
            RuleAction::Log => {
                info!(?rule, "request matched log rule");
            }
        }
    }
    RulesOutcome::NoMatch
}
