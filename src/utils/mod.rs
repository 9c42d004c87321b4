//! Utility functions and helpers.

pub mod http;
pub mod url;

pub use self::url::{ensure_trailing_slash, resolve, strip_parameters};
