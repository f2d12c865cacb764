// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The only response shape the gateway hands back to its caller.

use crate::error::GatewayError;
use axum::http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;

/// Successful upstream exchange.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub success: bool,
    /// Upstream status code
    pub status: u16,
    /// Parsed JSON, or the raw body as a string when `is_text`
    pub data: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub response_time: u64,
    pub is_text: bool,
}

/// Failed proxy call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureEnvelope {
    pub success: bool,
    pub error: String,
    pub detail: String,
    pub response_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_requests: Option<u32>,
    #[serde(skip)]
    status: u16,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

/// Upstream response after body classification.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub data: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub is_text: bool,
}

impl ResponseEnvelope {
    pub fn success(response: UpstreamResponse, response_time: u64) -> Self {
        Self::Success(SuccessEnvelope {
            success: true,
            status: response.status,
            data: response.data,
            headers: response.headers,
            response_time,
            is_text: response.is_text,
        })
    }

    pub fn failure(err: &GatewayError, response_time: u64) -> Self {
        let (retry_after, remaining_requests) = match err {
            GatewayError::RateLimited {
                remaining,
                retry_after_secs,
            } => (Some(*retry_after_secs), Some(*remaining)),
            _ => (None, None),
        };

        Self::Failure(FailureEnvelope {
            success: false,
            error: err.summary().to_string(),
            detail: err.to_string(),
            response_time,
            retry_after,
            remaining_requests,
            status: err.status_code().as_u16(),
        })
    }

    /// HTTP status the gateway answers with. Success is always 200; the
    /// upstream status travels inside the envelope.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Success(_) => StatusCode::OK,
            Self::Failure(f) => {
                StatusCode::from_u16(f.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Retry hint in seconds, present on rate-limit failures.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => f.retry_after,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
