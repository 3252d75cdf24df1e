//! HTTP side of the client.

pub mod client;
pub mod envelope;
pub mod pipeline;
pub mod request;

pub use client::{build_http_client, install_rustls_provider};
pub use envelope::{DataResponse, ErrorResponse};
pub use pipeline::ApiClient;
pub use request::ApiRequest;
