//! HTTP client module: bearer-auth request dispatch and response error
//! classification.

mod classify;
mod client;

pub use classify::{ApiError, ErrorPayload, Recovery, classify_response};
pub use client::{ApiClient, BASE_URL_ENV};
