//! JSON-RPC 2.0 envelopes for the meshplane control plane.
//!
//! Defines the request/response wire shapes, the fixed protocol error
//! codes, and decode helpers used by the dispatcher. One frame carries
//! exactly one envelope; the transport below this crate only moves text.

pub mod envelope;

pub use envelope::{
    id_is_truthy, Envelope, ProtoError, Response, RpcError, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR,
};
