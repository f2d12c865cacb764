// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for attack simulation against the outbound gateway.
//!
//! Floods and SSRF attempts run against the allowlist guard and the rate
//! limiter directly, with a manual clock so windows can be crossed without
//! sleeping.

pub mod attacks;
pub mod generators;
pub mod metrics;
