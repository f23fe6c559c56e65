//! Brokerage API access: credential lifecycle, endpoint registry, generic
//! invoker and the shared continuation cursor protocol.

pub mod auth;
pub mod endpoints;
pub mod invoker;
pub mod transport;

pub use auth::{CredentialManager, TokenSource};
pub use endpoints::{endpoint, endpoint_ids, EndpointDescriptor, PayloadShape};
pub use invoker::{ToolInvoker, MAX_CONTINUATION_PAGES, ROW_CAP};
pub use transport::{BrokerTransport, HttpTransport};
