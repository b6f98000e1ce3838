//! The external-authorization check contract: the subset of the proxy's
//! `CheckRequest`/`CheckResponse` exchange that authorization decisions
//! depend on.

use std::collections::HashMap;

/// A single authorization question from the proxy data plane.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckRequest {
    #[prost(message, optional, tag = "1")]
    pub attributes: Option<AttributeContext>,
}

/// Everything the proxy knows about the intercepted connection and request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributeContext {
    /// The downstream peer that originated the request.
    #[prost(message, optional, tag = "1")]
    pub source: Option<attribute_context::Peer>,

    /// The upstream peer the request is addressed to.
    #[prost(message, optional, tag = "2")]
    pub destination: Option<attribute_context::Peer>,

    #[prost(message, optional, tag = "4")]
    pub request: Option<attribute_context::Request>,
}

pub mod attribute_context {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Peer {
        #[prost(message, optional, tag = "1")]
        pub address: Option<Address>,

        #[prost(string, tag = "2")]
        pub service: String,

        #[prost(map = "string, string", tag = "3")]
        pub labels: HashMap<String, String>,

        /// The authenticated identity of the peer, e.g. a SPIFFE URI.
        #[prost(string, tag = "4")]
        pub principal: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Request {
        #[prost(message, optional, tag = "2")]
        pub http: Option<HttpRequest>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HttpRequest {
        #[prost(string, tag = "1")]
        pub id: String,

        /// ASCII case-sensitive, per RFC 2616.
        #[prost(string, tag = "2")]
        pub method: String,

        #[prost(map = "string, string", tag = "3")]
        pub headers: HashMap<String, String>,

        #[prost(string, tag = "4")]
        pub path: String,

        #[prost(string, tag = "5")]
        pub host: String,

        #[prost(string, tag = "6")]
        pub scheme: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(oneof = "address::Address", tags = "1")]
    pub address: Option<address::Address>,
}

pub mod address {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Address {
        #[prost(message, tag = "1")]
        SocketAddress(super::SocketAddress),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SocketAddress {
    #[prost(enumeration = "socket_address::Protocol", tag = "1")]
    pub protocol: i32,

    #[prost(string, tag = "2")]
    pub address: String,

    #[prost(uint32, tag = "3")]
    pub port_value: u32,
}

pub mod socket_address {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Protocol {
        Tcp = 0,
        Udp = 1,
    }

    impl Protocol {
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Protocol::Tcp => "TCP",
                Protocol::Udp => "UDP",
            }
        }
    }
}

/// The verdict returned to the proxy.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckResponse {
    /// `OK` to allow the request, `PERMISSION_DENIED` to reject it.
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,

    #[prost(oneof = "check_response::HttpResponse", tags = "2, 3")]
    pub http_response: Option<check_response::HttpResponse>,
}

pub mod check_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum HttpResponse {
        /// Settings for a rejected request, e.g. the HTTP status to serve.
        #[prost(message, tag = "2")]
        DeniedResponse(super::DeniedHttpResponse),

        #[prost(message, tag = "3")]
        OkResponse(super::OkHttpResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeniedHttpResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<HttpStatus>,

    #[prost(string, tag = "3")]
    pub body: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OkHttpResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
}

/// A `google.rpc.Status`-shaped status.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(enumeration = "Code", tag = "1")]
    pub code: i32,

    #[prost(string, tag = "2")]
    pub message: String,
}

/// The `google.rpc.Code` values this service emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    PermissionDenied = 7,
    Unavailable = 14,
}
