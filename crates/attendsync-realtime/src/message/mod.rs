//! Inbound message decoding and validation.

pub mod decode;
pub mod validator;

pub use decode::{Decoded, Ignored, ResourceFilter, decode_event};
