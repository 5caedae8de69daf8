//! Authentication backend clients.

pub mod http;

pub use http::HttpAuthApi;
