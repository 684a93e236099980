//! Managed Redis store used by the distributed rate limiter.
//!
//! This module provides:
//! - Credential management with the REST token kept in a secret
//! - A REST client with tracing and retry middleware

mod client;
mod credentials;

pub use client::{UpstashClient, UpstashClientBuilder};
pub use credentials::{
    CredentialsProvider, EnvCredentials, StaticCredentials, TOKEN_ENV_VAR, URL_ENV_VAR,
    UpstashCredentials,
};
