//! Headless IPC: line-delimited JSON over stdin/stdout.
//!
//! - `protocol`: request/response/event wire unions
//! - `codec`: line decode/encode with terse error reporting
//! - `version`: protocol semver parsing and compatibility
//! - `worker`: the queueing, dispatching, cancellable worker itself

pub mod codec;
pub mod protocol;
pub mod version;
pub mod worker;

pub use codec::{decode_request, encode_response, DecodeError};
pub use protocol::{InitConfig, IpcRequest, IpcResponse, SendResult, ToolCallRecord, WorkerEvent};
pub use version::{check_compatibility, own_version, Compatibility, ProtocolVersion};
pub use worker::{
    normalize_error, run_stdio, run_stdio_with, NormalizedError, SessionFactory, Worker,
};
