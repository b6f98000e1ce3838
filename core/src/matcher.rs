//! Rule predicates.
//!
//! Everything here is a pure function of the rule and the per-call
//! [`RequestCache`]: no I/O, no state that outlives the call. Each predicate
//! follows the match-anything-when-empty convention, so a rule only
//! restricts the clauses it actually sets.

use crate::request::{Namespace, Peer, RequestCache};
use crate::Labels;
use policy_agent_proto::authz::attribute_context::HttpRequest;
use policy_agent_proto::sync::{protocol, HttpMatch, Protocol, Rule, ServiceAccountMatch};
use tracing::{trace, warn};

/// Checks whether a rule matches the request: source, destination, HTTP
/// request, and L4 protocol clauses are conjunctive, short-circuiting on the
/// first clause that fails.
pub fn match_rule(rule: &Rule, req: &RequestCache<'_>, policy_namespace: &str) -> bool {
    trace!(?rule, %policy_namespace, "checking rule");
    match_source(rule, req, policy_namespace)
        && match_destination(rule, req, policy_namespace)
        && match_http(rule.http_match.as_ref(), req.http())
        && match_l4_protocol(rule, req)
}

fn match_source(rule: &Rule, req: &RequestCache<'_>, policy_namespace: &str) -> bool {
    let ns_match = compute_namespace_match(
        policy_namespace,
        &rule.original_src_namespace_selector,
        &rule.original_src_selector,
        &rule.original_not_src_selector,
        rule.src_service_account_match.as_ref(),
    );
    match_service_accounts(req, rule.src_service_account_match.as_ref(), req.source_peer())
        && match_namespace(req, &ns_match, req.source_namespace())
}

fn match_destination(rule: &Rule, req: &RequestCache<'_>, policy_namespace: &str) -> bool {
    let ns_match = compute_namespace_match(
        policy_namespace,
        &rule.original_dst_namespace_selector,
        &rule.original_dst_selector,
        &rule.original_not_dst_selector,
        rule.dst_service_account_match.as_ref(),
    );
    match_service_accounts(
        req,
        rule.dst_service_account_match.as_ref(),
        req.destination_peer(),
    ) && match_namespace(req, &ns_match, req.destination_namespace())
}

/// The namespaces a rule's peer clause is allowed to match.
#[derive(Debug, Default, PartialEq, Eq)]
struct NamespaceMatch {
    names: Vec<String>,
    selector: String,
}

/// Derives the namespace restriction for one side of a rule.
///
/// A namespace label selector always takes precedence. Otherwise, a
/// namespaced policy that narrows by pod selector or service account is
/// restricted to its own namespace, so it cannot assert authority over
/// identities elsewhere; a namespaced policy with no such narrower still
/// matches cross-namespace traffic.
fn compute_namespace_match(
    policy_namespace: &str,
    ns_selector: &str,
    pod_selector: &str,
    not_pod_selector: &str,
    sa_match: Option<&ServiceAccountMatch>,
) -> NamespaceMatch {
    if !ns_selector.is_empty() {
        return NamespaceMatch {
            names: Vec::new(),
            selector: ns_selector.to_string(),
        };
    }
    let narrowed = !pod_selector.is_empty()
        || !not_pod_selector.is_empty()
        || sa_match.is_some_and(|sa| !sa.names.is_empty() || !sa.selector.is_empty());
    if !policy_namespace.is_empty() && narrowed {
        return NamespaceMatch {
            names: vec![policy_namespace.to_string()],
            selector: String::new(),
        };
    }
    NamespaceMatch::default()
}

/// An absent service-account clause matches any peer; otherwise the name
/// list and the label selector are conjunctive.
fn match_service_accounts(
    req: &RequestCache<'_>,
    sa_match: Option<&ServiceAccountMatch>,
    peer: &Peer,
) -> bool {
    let Some(sa_match) = sa_match else {
        return true;
    };
    trace!(name = %peer.name, namespace = %peer.namespace, ?sa_match, "matching service account");
    match_name(&sa_match.names, &peer.name) && match_labels(req, &sa_match.selector, &peer.labels)
}

fn match_namespace(req: &RequestCache<'_>, ns_match: &NamespaceMatch, ns: &Namespace) -> bool {
    trace!(namespace = %ns.name, ?ns_match, "matching namespace");
    match_name(&ns_match.names, &ns.name) && match_labels(req, &ns_match.selector, &ns.labels)
}

/// An empty name list matches any name.
fn match_name(names: &[String], name: &str) -> bool {
    names.is_empty() || names.iter().any(|n| n == name)
}

/// Evaluates a selector string against a label set, using the per-call
/// compiled-selector cache. A selector that does not parse matches nothing,
/// regardless of the polarity of the clause it appears in.
fn match_labels(req: &RequestCache<'_>, selector: &str, labels: &Labels) -> bool {
    match req.selector(selector) {
        Some(selector) => selector.evaluate(labels),
        None => false,
    }
}

/// An absent HTTP clause matches any request.
fn match_http(rule: Option<&HttpMatch>, http: Option<&HttpRequest>) -> bool {
    let Some(rule) = rule else {
        return true;
    };
    let method = http.map_or("", |http| http.method.as_str());
    match_http_methods(&rule.methods, method)
}

/// HTTP methods are ASCII case-sensitive, per RFC 2616. The literal `"*"`
/// matches any method, as does an empty list.
fn match_http_methods(methods: &[String], method: &str) -> bool {
    methods.is_empty() || methods.iter().any(|m| m == "*" || m == method)
}

/// Matches the rule's L4 protocol clauses against the destination socket
/// address.
///
/// A request with no destination peer matches nothing. The request protocol
/// defaults to TCP when the socket address is absent. `protocol` takes
/// precedence over `not_protocol` when a rule carries both; a rule with
/// neither matches every protocol.
fn match_l4_protocol(rule: &Rule, req: &RequestCache<'_>) -> bool {
    if req.destination().is_none() {
        warn!("request has no destination peer");
        return false;
    }
    let req_protocol = req.destination_protocol();
    if let Some(protocol) = &rule.protocol {
        return protocol_names(protocol, req_protocol);
    }
    if let Some(protocol) = &rule.not_protocol {
        return !protocol_names(protocol, req_protocol);
    }
    true
}

/// Whether a rule protocol names the given protocol string. Names compare
/// case-insensitively; numbers go through the IANA mapping the proxy wire
/// supports. Unknown numbers never match.
fn protocol_names(rule_protocol: &Protocol, name: &str) -> bool {
    match &rule_protocol.number_or_name {
        Some(protocol::NumberOrName::Name(rule_name)) => rule_name.eq_ignore_ascii_case(name),
        Some(protocol::NumberOrName::Number(number)) => match number {
            6 => "TCP".eq_ignore_ascii_case(name),
            17 => "UDP".eq_ignore_ascii_case(name),
            _ => false,
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;
    use maplit::hashmap;
    use policy_agent_proto::authz::{
        address, attribute_context, socket_address, Address, AttributeContext, CheckRequest,
        SocketAddress,
    };
    use policy_agent_proto::sync::NamespaceId;
    use std::sync::Arc;

    fn sock_addr(protocol: socket_address::Protocol) -> Address {
        Address {
            address: Some(address::Address::SocketAddress(SocketAddress {
                protocol: protocol as i32,
                ..Default::default()
            })),
        }
    }

    fn check_request(src: &str, dst: &str, method: &str) -> CheckRequest {
        CheckRequest {
            attributes: Some(AttributeContext {
                source: Some(attribute_context::Peer {
                    principal: src.to_string(),
                    ..Default::default()
                }),
                destination: Some(attribute_context::Peer {
                    principal: dst.to_string(),
                    ..Default::default()
                }),
                request: Some(attribute_context::Request {
                    http: Some(attribute_context::HttpRequest {
                        method: method.to_string(),
                        ..Default::default()
                    }),
                }),
            }),
        }
    }

    fn namespace_labels(snapshot: &mut Snapshot, name: &str, labels: &[(&str, &str)]) {
        snapshot.namespace_by_id.insert(
            NamespaceId {
                name: name.to_string(),
            },
            Arc::new(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        );
    }

    // An empty name list matches any name.
    #[test]
    fn name_matching() {
        let cases: &[(&[&str], &str, bool)] = &[
            (&[], "reginald", true),
            (&["susan", "jim", "reginald"], "reginald", true),
            (&["susan", "jim", "reginald"], "steven", false),
        ];
        for (names, name, expected) in cases {
            let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
            assert_eq!(match_name(&names, name), *expected, "{names:?} vs {name}");
        }
    }

    // An empty label selector matches any set of labels; a selector that
    // does not parse matches none.
    #[test]
    fn label_matching() {
        let snapshot = Snapshot::default();
        let request = CheckRequest::default();
        let req = RequestCache::new(&snapshot, &request);
        let labels: Labels = hashmap! {
            "app".to_string() => "foo".to_string(),
            "env".to_string() => "prod".to_string(),
        }
        .into_iter()
        .collect();

        assert!(match_labels(&req, "", &labels));
        assert!(!match_labels(&req, "not.a.real.selector", &labels));
        assert!(match_labels(&req, "app == 'foo'", &labels));
        assert!(!match_labels(&req, "app == 'bar'", &labels));
        assert!(match_labels(&req, "has(app)", &labels));
    }

    #[test]
    fn http_method_matching() {
        let cases: &[(&[&str], &str, bool)] = &[
            (&[], "GET", true),
            (&["GET", "HEAD"], "GET", true),
            // HTTP methods are case sensitive.
            (&["get", "HEAD"], "GET", false),
            (&["*"], "MADNESS", true),
        ];
        for (methods, method, expected) in cases {
            let methods: Vec<String> = methods.iter().map(|m| m.to_string()).collect();
            assert_eq!(
                match_http_methods(&methods, method),
                *expected,
                "{methods:?} vs {method}"
            );
        }
    }

    // An omitted HTTP clause always matches.
    #[test]
    fn absent_http_match_matches() {
        let http = attribute_context::HttpRequest::default();
        assert!(match_http(None, Some(&http)));
    }

    // Matching a whole rule requires matching all subclauses.
    #[test]
    fn whole_rule() {
        let rule = Rule {
            action: "allow".to_string(),
            src_service_account_match: Some(ServiceAccountMatch {
                names: vec!["john".to_string(), "stevie".to_string(), "sam".to_string()],
                ..Default::default()
            }),
            dst_service_account_match: Some(ServiceAccountMatch {
                names: vec!["ian".to_string()],
                ..Default::default()
            }),
            http_match: Some(HttpMatch {
                methods: vec!["GET".to_string(), "POST".to_string()],
            }),
            protocol: Some(Protocol::name("TCP")),
            ..Default::default()
        };

        let mut request = check_request(
            "spiffe://cluster.local/ns/default/sa/sam",
            "spiffe://cluster.local/ns/default/sa/ian",
            "GET",
        );
        if let Some(attributes) = request.attributes.as_mut() {
            if let Some(destination) = attributes.destination.as_mut() {
                destination.address = Some(sock_addr(socket_address::Protocol::Tcp));
            }
        }

        let snapshot = Snapshot::default();
        let req = RequestCache::new(&snapshot, &request);
        assert!(match_rule(&rule, &req, ""));
    }

    // Namespace selectors evaluate against the namespaces' labels.
    #[test]
    fn namespace_selectors() {
        let rule = Rule {
            original_src_namespace_selector: "place == 'src'".to_string(),
            original_dst_namespace_selector: "place == 'dst'".to_string(),
            ..Default::default()
        };

        let mut snapshot = Snapshot::default();
        namespace_labels(&mut snapshot, "src", &[("place", "src")]);
        namespace_labels(&mut snapshot, "dst", &[("place", "dst")]);

        let request = check_request(
            "spiffe://cluster.local/ns/src/sa/sam",
            "spiffe://cluster.local/ns/dst/sa/ian",
            "GET",
        );
        let req = RequestCache::new(&snapshot, &request);
        assert!(match_rule(&rule, &req, ""));
    }

    // A namespaced policy only matches its own namespace when a pod
    // selector or service-account clause narrows the rule.
    #[test]
    fn policy_namespace_scoping() {
        let snapshot = Snapshot::default();
        let request = check_request(
            "spiffe://cluster.local/ns/testns/sa/sam",
            "spiffe://cluster.local/ns/testns/sa/ian",
            "GET",
        );
        let req = RequestCache::new(&snapshot, &request);

        // With a pod selector.
        let mut rule = Rule {
            original_src_selector: "has(app)".to_string(),
            ..Default::default()
        };
        assert!(!match_rule(&rule, &req, "different"));
        assert!(match_rule(&rule, &req, "testns"));

        // With no pod selector or service-account clause.
        rule.original_src_selector = String::new();
        assert!(match_rule(&rule, &req, "different"));

        // With a service-account name list.
        rule.src_service_account_match = Some(ServiceAccountMatch {
            names: vec!["sam".to_string()],
            ..Default::default()
        });
        assert!(!match_rule(&rule, &req, "different"));
        assert!(match_rule(&rule, &req, "testns"));
    }

    #[test]
    fn namespace_match_unrestricted_without_narrowers() {
        assert_eq!(
            compute_namespace_match("", "", "", "", None),
            NamespaceMatch::default()
        );
        assert_eq!(
            compute_namespace_match("testns", "", "", "", None),
            NamespaceMatch::default()
        );
        // An empty service-account clause is not a narrower.
        assert_eq!(
            compute_namespace_match("testns", "", "", "", Some(&ServiceAccountMatch::default())),
            NamespaceMatch::default()
        );
        // A namespace selector takes precedence and imposes no name
        // restriction.
        assert_eq!(
            compute_namespace_match("testns", "place == 'src'", "has(app)", "", None),
            NamespaceMatch {
                names: Vec::new(),
                selector: "place == 'src'".to_string(),
            }
        );
    }

    #[test]
    fn l4_protocol() {
        let snapshot = Snapshot::default();
        let request = check_request(
            "spiffe://cluster.local/ns/testns/sa/sam",
            "spiffe://cluster.local/ns/testns/sa/ian",
            "GET",
        );

        // An empty rule does not restrict the protocol.
        let mut rule = Rule::default();
        {
            let req = RequestCache::new(&snapshot, &request);
            assert!(match_rule(&rule, &req, "testns"));
        }

        // Still unrestricted for a UDP request.
        let mut udp_request = request.clone();
        if let Some(attributes) = udp_request.attributes.as_mut() {
            if let Some(destination) = attributes.destination.as_mut() {
                destination.address = Some(sock_addr(socket_address::Protocol::Udp));
            }
        }
        {
            let req = RequestCache::new(&snapshot, &udp_request);
            assert!(match_rule(&rule, &req, "testns"));
        }

        // A request with no address defaults to TCP.
        for (protocol, expected) in [
            (Some(Protocol::name("TCP")), true),
            (Some(Protocol::number(6)), true),
            (Some(Protocol::number(17)), false),
        ] {
            rule.protocol = protocol;
            let req = RequestCache::new(&snapshot, &request);
            assert_eq!(match_rule(&rule, &req, "testns"), expected, "{rule:?}");
        }
        rule.protocol = None;

        // Negated protocol clauses.
        rule.not_protocol = Some(Protocol::name("UDP"));
        {
            let req = RequestCache::new(&snapshot, &request);
            assert!(match_rule(&rule, &req, "testns"));
        }

        rule.not_protocol = Some(Protocol::number(6));
        let mut tcp_request = request.clone();
        if let Some(attributes) = tcp_request.attributes.as_mut() {
            if let Some(destination) = attributes.destination.as_mut() {
                destination.address = Some(sock_addr(socket_address::Protocol::Tcp));
            }
        }
        {
            let req = RequestCache::new(&snapshot, &tcp_request);
            assert!(!match_rule(&rule, &req, "testns"));
        }
    }

    // A request with no destination peer matches no L4 clause.
    #[test]
    fn l4_protocol_without_destination() {
        let snapshot = Snapshot::default();
        let request = CheckRequest {
            attributes: Some(AttributeContext::default()),
        };
        let req = RequestCache::new(&snapshot, &request);
        assert!(!match_l4_protocol(&Rule::default(), &req));
    }

    // Protocol takes precedence when both protocol clauses are set.
    #[test]
    fn protocol_precedence_over_not_protocol() {
        let snapshot = Snapshot::default();
        let request = check_request(
            "spiffe://cluster.local/ns/testns/sa/sam",
            "spiffe://cluster.local/ns/testns/sa/ian",
            "GET",
        );
        let rule = Rule {
            protocol: Some(Protocol::name("TCP")),
            not_protocol: Some(Protocol::name("TCP")),
            ..Default::default()
        };
        let req = RequestCache::new(&snapshot, &request);
        assert!(match_l4_protocol(&rule, &req));
    }
}
