//! Request Parser and RPC Dispatcher (spec §4.F, §4.G): decodes the host's
//! flat envelope, drives `AIManager`, and re-encodes the flat response.

mod confidence;
mod dispatcher;
mod envelope;
mod parser;

pub use dispatcher::Dispatcher;
pub use envelope::{RawRequest, RawResponse};
pub use parser::{normalize_provider_tag, parse, ParsedRequest};
