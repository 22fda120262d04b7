//! HTTP client for the account location API.
//!
//! [`AboutClient`] implements [`RemoteFetch`](whereabouts_core::RemoteFetch):
//! it serializes calls through a [`Pacer`], maps HTTP 429 to a rate-limit
//! outcome and extracts the about-profile fields from the GraphQL response.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod client;
mod pacer;

pub use client::{AboutClient, Credentials};
pub use pacer::Pacer;
