// Otter client library
// Decision: The interceptor is a library so other Rust callers can reuse the refresh protocol

pub mod client;
pub mod error;
pub mod interceptor;
pub mod token_store;

pub use client::Client;
pub use error::ClientError;
pub use interceptor::{ApiRequest, ClientConfig, Exchange, Interceptor, RequestState};
pub use token_store::{FileTokenStore, MemoryTokenStore, RefreshTokenStore};
