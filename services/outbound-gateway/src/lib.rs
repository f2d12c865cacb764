// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound API Gateway
//!
//! Proxies caller requests to a small set of third-party HTTP APIs while
//! keeping the API secrets on the server:
//!
//! - Destination allowlist with loopback/private address denial (SSRF guard)
//! - Per-client sliding-window rate limiting (60 rpm default)
//! - Provider registry supplying auth style, timeout and retry settings
//! - Credential injection (bearer, `X-API-Key` header, or query key)
//! - Per-attempt timeouts and linear-backoff retries for idempotent methods
//! - A single normalized JSON envelope for every outcome

pub mod allowlist;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod providers;
pub mod request;

pub use allowlist::{AllowlistGuard, GuardVerdict};
pub use client::AuthenticatedClient;
pub use config::{Config, SecretStore};
pub use envelope::ResponseEnvelope;
pub use error::{GatewayError, UpstreamError};
pub use gateway::Gateway;
pub use limiter::{RateLimitResult, RateLimiter};
pub use providers::ProviderRegistry;
