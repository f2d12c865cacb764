// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Read-only table of known downstream providers, built once at startup.

use crate::allowlist::{host_matches, normalize_host};
use crate::config::ProviderConfig;
use std::collections::HashMap;
use url::Url;

/// Provider lookup by short name (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    /// Build the registry. A later entry with the same name replaces an
    /// earlier one.
    pub fn new(providers: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name.trim().to_lowercase(), p))
            .collect();
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(&name.trim().to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ProviderConfig {
    /// `true` if `target_url`'s host is this provider's host or a subdomain
    /// of it. Scheme and port are not compared.
    pub fn serves(&self, target_url: &str) -> bool {
        match (host_of(&self.base_url), host_of(target_url)) {
            (Some(own), Some(target)) => host_matches(&target, &own),
            _ => false,
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    url.host_str().map(normalize_host).filter(|h| !h.is_empty())
}
