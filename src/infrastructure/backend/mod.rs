//! Step backend implementations

mod http;
mod http_client;

pub use http::HttpStepBackend;
pub use http_client::HttpClient;
