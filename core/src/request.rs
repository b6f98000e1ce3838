//! Per-request derived state.
//!
//! A [`RequestCache`] is created for one authorization call and dropped when
//! the call returns. It decodes the proxy-supplied attributes into canonical
//! peer and namespace records and memoizes both those records and any label
//! selectors parsed while matching, so each is computed at most once per
//! call. Nothing here outlives the call.

use crate::selector::Selector;
use crate::spiffe;
use crate::store::Snapshot;
use crate::Labels;
use ahash::AHashMap as HashMap;
use policy_agent_proto::authz::{address, attribute_context, CheckRequest};
use policy_agent_proto::sync::ServiceAccountId;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;
use tracing::warn;

/// A source or destination workload identity, as derived from its SPIFFE
/// principal. Peers with non-SPIFFE principals have empty names and
/// namespaces, which never match identity-narrowed clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
}

/// Namespace metadata for a peer. Labels are empty when the namespace is
/// unknown to the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub labels: Labels,
}

pub struct RequestCache<'a> {
    snapshot: &'a Snapshot,
    request: &'a CheckRequest,

    source_peer: OnceCell<Peer>,
    destination_peer: OnceCell<Peer>,
    source_namespace: OnceCell<Namespace>,
    destination_namespace: OnceCell<Namespace>,

    /// Compiled selectors keyed by their source string. Parse failures are
    /// cached too, so a bad selector is parsed (and warned about) once per
    /// call rather than once per clause.
    selectors: RefCell<HashMap<String, Option<Rc<Selector>>>>,
}

// === impl RequestCache ===

impl<'a> RequestCache<'a> {
    pub fn new(snapshot: &'a Snapshot, request: &'a CheckRequest) -> Self {
        Self {
            snapshot,
            request,
            source_peer: OnceCell::new(),
            destination_peer: OnceCell::new(),
            source_namespace: OnceCell::new(),
            destination_namespace: OnceCell::new(),
            selectors: RefCell::new(HashMap::default()),
        }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn source(&self) -> Option<&'a attribute_context::Peer> {
        self.request.attributes.as_ref()?.source.as_ref()
    }

    pub fn destination(&self) -> Option<&'a attribute_context::Peer> {
        self.request.attributes.as_ref()?.destination.as_ref()
    }

    pub fn http(&self) -> Option<&'a attribute_context::HttpRequest> {
        self.request
            .attributes
            .as_ref()?
            .request
            .as_ref()?
            .http
            .as_ref()
    }

    pub fn source_peer(&self) -> &Peer {
        self.source_peer.get_or_init(|| self.peer(self.source()))
    }

    /// The destination is the workload this agent protects, so its labels
    /// merge the endpoint's labels over the service account's.
    pub fn destination_peer(&self) -> &Peer {
        self.destination_peer.get_or_init(|| {
            let mut peer = self.peer(self.destination());
            if let Some(endpoint) = &self.snapshot.endpoint {
                for (key, value) in &endpoint.labels {
                    peer.labels.insert(key.clone(), value.clone());
                }
            }
            peer
        })
    }

    pub fn source_namespace(&self) -> &Namespace {
        self.source_namespace
            .get_or_init(|| self.namespace_meta(&self.source_peer().namespace))
    }

    pub fn destination_namespace(&self) -> &Namespace {
        self.destination_namespace
            .get_or_init(|| self.namespace_meta(&self.destination_peer().namespace))
    }

    /// The L4 protocol of the destination socket address; `"TCP"` when the
    /// address or socket-address fields are absent.
    pub fn destination_protocol(&self) -> &'static str {
        match self
            .destination()
            .and_then(|peer| peer.address.as_ref())
            .and_then(|address| address.address.as_ref())
        {
            Some(address::Address::SocketAddress(socket)) => socket.protocol().as_str_name(),
            None => "TCP",
        }
    }

    /// Parses a selector, memoizing per call. Returns `None` (after a warn)
    /// for selectors that do not parse; callers treat that as no-match.
    pub(crate) fn selector(&self, expr: &str) -> Option<Rc<Selector>> {
        if let Some(cached) = self.selectors.borrow().get(expr) {
            return cached.clone();
        }
        let parsed = match Selector::parse(expr) {
            Ok(selector) => Some(Rc::new(selector)),
            Err(error) => {
                warn!(%error, selector = %expr, "could not parse label selector");
                None
            }
        };
        self.selectors
            .borrow_mut()
            .insert(expr.to_string(), parsed.clone());
        parsed
    }

    fn peer(&self, peer: Option<&attribute_context::Peer>) -> Peer {
        let principal = peer.map_or("", |p| p.principal.as_str());
        let Some(identity) = spiffe::identity(principal) else {
            if !principal.is_empty() {
                warn!(%principal, "principal is not a SPIFFE workload identity");
            }
            return Peer::default();
        };
        let id = ServiceAccountId {
            namespace: identity.namespace.clone(),
            name: identity.service_account.clone(),
        };
        let labels = self
            .snapshot
            .service_account_labels(&id)
            .map(|labels| (**labels).clone())
            .unwrap_or_default();
        Peer {
            name: identity.service_account,
            namespace: identity.namespace,
            labels,
        }
    }

    fn namespace_meta(&self, name: &str) -> Namespace {
        let labels = self
            .snapshot
            .namespace_labels(name)
            .map(|labels| (**labels).clone())
            .unwrap_or_default();
        Namespace {
            name: name.to_string(),
            labels,
        }
    }
}
