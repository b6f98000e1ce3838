//! The policy-sync stream contract: the discriminated union of updates the
//! control plane pushes to each agent, plus the policy model those updates
//! carry.

use std::collections::HashMap;

/// Opens the sync stream. Carries no state; the control plane replays the
/// full store on every connection.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncRequest {}

/// One update from the control plane. Updates must be applied in stream
/// order; the stream eventually carries an `InSync` marker after the initial
/// replay.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToDataplane {
    #[prost(uint64, tag = "1")]
    pub sequence_number: u64,

    #[prost(
        oneof = "to_dataplane::Payload",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13"
    )]
    pub payload: Option<to_dataplane::Payload>,
}

pub mod to_dataplane {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "2")]
        InSync(super::InSync),

        /// IP set updates are addressed to L3/L4 dataplanes; this agent
        /// ignores them.
        #[prost(message, tag = "3")]
        IpsetUpdate(super::IpsetUpdate),

        #[prost(message, tag = "4")]
        ActiveProfileUpdate(super::ActiveProfileUpdate),

        #[prost(message, tag = "5")]
        ActiveProfileRemove(super::ActiveProfileRemove),

        #[prost(message, tag = "6")]
        ActivePolicyUpdate(super::ActivePolicyUpdate),

        #[prost(message, tag = "7")]
        ActivePolicyRemove(super::ActivePolicyRemove),

        #[prost(message, tag = "8")]
        WorkloadEndpointUpdate(super::WorkloadEndpointUpdate),

        #[prost(message, tag = "9")]
        WorkloadEndpointRemove(super::WorkloadEndpointRemove),

        #[prost(message, tag = "10")]
        ServiceAccountUpdate(super::ServiceAccountUpdate),

        #[prost(message, tag = "11")]
        ServiceAccountRemove(super::ServiceAccountRemove),

        #[prost(message, tag = "12")]
        NamespaceUpdate(super::NamespaceUpdate),

        #[prost(message, tag = "13")]
        NamespaceRemove(super::NamespaceRemove),
    }
}

/// Marks the end of the initial replay; the local store is authoritative
/// from this point until the stream drops.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InSync {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpsetUpdate {
    #[prost(string, tag = "1")]
    pub id: String,

    #[prost(string, repeated, tag = "2")]
    pub members: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ProfileId {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct PolicyId {
    #[prost(string, tag = "1")]
    pub tier: String,

    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ServiceAccountId {
    #[prost(string, tag = "1")]
    pub namespace: String,

    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct NamespaceId {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActiveProfileUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ProfileId>,

    #[prost(message, optional, tag = "2")]
    pub profile: Option<Profile>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActiveProfileRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ProfileId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActivePolicyUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<PolicyId>,

    #[prost(message, optional, tag = "2")]
    pub policy: Option<Policy>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActivePolicyRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<PolicyId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpointUpdate {
    #[prost(message, optional, tag = "1")]
    pub endpoint: Option<WorkloadEndpoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpointRemove {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceAccountUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ServiceAccountId>,

    #[prost(map = "string, string", tag = "2")]
    pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceAccountRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<ServiceAccountId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamespaceUpdate {
    #[prost(message, optional, tag = "1")]
    pub id: Option<NamespaceId>,

    #[prost(map = "string, string", tag = "2")]
    pub labels: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamespaceRemove {
    #[prost(message, optional, tag = "1")]
    pub id: Option<NamespaceId>,
}

/// The workload this agent protects: its identity, labels, and the ordered
/// tiers and profiles that apply to it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkloadEndpoint {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, repeated, tag = "2")]
    pub tiers: Vec<TierInfo>,

    /// Fallback profiles, evaluated in order after all tiers.
    #[prost(string, repeated, tag = "3")]
    pub profile_ids: Vec<String>,

    #[prost(map = "string, string", tag = "4")]
    pub labels: HashMap<String, String>,
}

/// An ordered group of policies. Policy names reference `PolicyId`s within
/// this tier.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TierInfo {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(string, repeated, tag = "2")]
    pub ingress_policies: Vec<String>,

    #[prost(string, repeated, tag = "3")]
    pub egress_policies: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Policy {
    /// Empty for global (non-namespaced) policies.
    #[prost(string, tag = "1")]
    pub namespace: String,

    #[prost(message, repeated, tag = "2")]
    pub inbound_rules: Vec<Rule>,

    #[prost(message, repeated, tag = "3")]
    pub outbound_rules: Vec<Rule>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub inbound_rules: Vec<Rule>,

    #[prost(message, repeated, tag = "2")]
    pub outbound_rules: Vec<Rule>,
}

/// A single match clause plus the action to take when it matches.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rule {
    /// `allow`, `deny`, `log`, or `pass` (case-insensitive).
    #[prost(string, tag = "1")]
    pub action: String,

    /// Positive L4 protocol match. Takes precedence over `not_protocol`
    /// when both are present.
    #[prost(message, optional, tag = "2")]
    pub protocol: Option<Protocol>,

    /// Negative L4 protocol match.
    #[prost(message, optional, tag = "3")]
    pub not_protocol: Option<Protocol>,

    #[prost(message, optional, tag = "4")]
    pub http_match: Option<HttpMatch>,

    #[prost(message, optional, tag = "5")]
    pub src_service_account_match: Option<ServiceAccountMatch>,

    #[prost(message, optional, tag = "6")]
    pub dst_service_account_match: Option<ServiceAccountMatch>,

    /// The pod label selectors the policy was authored with, carried through
    /// so identity-based evaluation can reproduce their scoping.
    #[prost(string, tag = "7")]
    pub original_src_selector: String,

    #[prost(string, tag = "8")]
    pub original_dst_selector: String,

    #[prost(string, tag = "9")]
    pub original_not_src_selector: String,

    #[prost(string, tag = "10")]
    pub original_not_dst_selector: String,

    #[prost(string, tag = "11")]
    pub original_src_namespace_selector: String,

    #[prost(string, tag = "12")]
    pub original_dst_namespace_selector: String,
}

/// Matches peers by service account. The two clauses are conjunctive; an
/// empty `names` list matches any name and an empty `selector` matches any
/// labels.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceAccountMatch {
    #[prost(string, repeated, tag = "1")]
    pub names: Vec<String>,

    #[prost(string, tag = "2")]
    pub selector: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpMatch {
    /// ASCII case-sensitive; `"*"` matches any method; an empty list
    /// matches any method.
    #[prost(string, repeated, tag = "1")]
    pub methods: Vec<String>,
}

/// An L4 protocol, by IANA name or number.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Protocol {
    #[prost(oneof = "protocol::NumberOrName", tags = "1, 2")]
    pub number_or_name: Option<protocol::NumberOrName>,
}

pub mod protocol {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum NumberOrName {
        /// Compared case-insensitively.
        #[prost(string, tag = "1")]
        Name(String),

        #[prost(int32, tag = "2")]
        Number(i32),
    }
}

impl Protocol {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            number_or_name: Some(protocol::NumberOrName::Name(name.into())),
        }
    }

    pub fn number(number: i32) -> Self {
        Self {
            number_or_name: Some(protocol::NumberOrName::Number(number)),
        }
    }
}
