//! SPIFFE workload identity parsing.
//!
//! Peer principals arrive as URIs of the form
//! `spiffe://<trust-domain>/ns/<namespace>/sa/<service-account>`. Anything
//! else carries no identity this engine can use.

/// A workload identity extracted from a SPIFFE URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub trust_domain: String,
    pub namespace: String,
    pub service_account: String,
}

/// Parses a principal string into an [`Identity`].
///
/// Returns `None` for non-SPIFFE principals and for SPIFFE URIs that do not
/// follow the `ns/<namespace>/sa/<service-account>` path convention, so
/// callers can fall back to an empty identity without failing the request.
pub fn identity(principal: &str) -> Option<Identity> {
    let rest = principal.strip_prefix("spiffe://")?;
    let (trust_domain, path) = rest.split_once('/')?;
    let path = path.strip_prefix("ns/")?;
    let (namespace, rest) = path.split_once('/')?;
    let service_account = rest.strip_prefix("sa/")?;
    if trust_domain.is_empty()
        || namespace.is_empty()
        || service_account.is_empty()
        || service_account.contains('/')
    {
        return None;
    }
    Some(Identity {
        trust_domain: trust_domain.to_string(),
        namespace: namespace.to_string(),
        service_account: service_account.to_string(),
    })
}
