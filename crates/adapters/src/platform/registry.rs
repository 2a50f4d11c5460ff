// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform client registry
//!
//! Maps a configured platform provider to a client instance. Clients are
//! built by a per-kind factory on first use, wrapped with tracing, and
//! cached by provider name.

use super::{PlatformClient, PlatformError};
use crate::traced::TracedPlatformClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tern_core::{PlatformKind, PlatformProviderConfig};

/// Builds a client for one kind of platform
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        provider: &PlatformProviderConfig,
    ) -> Result<Arc<dyn PlatformClient>, PlatformError>;
}

impl<F> ClientFactory for F
where
    F: Fn(&PlatformProviderConfig) -> Result<Arc<dyn PlatformClient>, PlatformError>
        + Send
        + Sync,
{
    fn build(
        &self,
        provider: &PlatformProviderConfig,
    ) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        self(provider)
    }
}

/// Registry of platform clients keyed by provider name
#[derive(Default)]
pub struct ClientRegistry {
    factories: HashMap<PlatformKind, Arc<dyn ClientFactory>>,
    clients: Mutex<HashMap<String, Arc<dyn PlatformClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used for providers of `kind`
    pub fn with_factory(mut self, kind: PlatformKind, factory: impl ClientFactory + 'static) -> Self {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    /// Register a ready-made client under a provider name
    pub fn insert(&self, name: impl Into<String>, client: impl PlatformClient) {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Arc::new(TracedPlatformClient::new(client)));
    }

    /// Client for `provider`, building and caching it on first use
    pub fn client(
        &self,
        provider: &PlatformProviderConfig,
    ) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&provider.name) {
            return Ok(Arc::clone(client));
        }

        let factory = self
            .factories
            .get(&provider.kind)
            .ok_or_else(|| PlatformError::Unsupported {
                name: provider.name.clone(),
                kind: provider.kind,
            })?;
        let client: Arc<dyn PlatformClient> =
            Arc::new(TracedPlatformClient::new(factory.build(provider)?));
        tracing::info!(provider = %provider.name, kind = ?provider.kind, "platform client created");
        clients.insert(provider.name.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Cached client by provider name
    pub fn get(&self, name: &str) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownProvider(name.to_string()))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
