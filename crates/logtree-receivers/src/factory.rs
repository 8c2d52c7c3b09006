//! Receiver lookup by type identifier.

use crate::{file, search, tcp, udp, Receiver, ReceiverError};
use serde::de::DeserializeOwned;

/// Static description of a receiver type plus its constructor.
#[derive(Clone, Copy)]
pub struct ReceiverInfo {
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub sample_config: &'static str,
    pub build: fn(serde_json::Value) -> Result<Box<dyn Receiver>, ReceiverError>,
}

impl std::fmt::Debug for ReceiverInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverInfo")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Deserialize typed settings, tagging failures with the receiver kind.
pub(crate) fn settings<T: DeserializeOwned>(
    kind: &'static str,
    value: serde_json::Value,
) -> Result<T, ReceiverError> {
    serde_json::from_value(value).map_err(|source| ReceiverError::Settings { kind, source })
}

/// Registry of receiver types, pre-populated with the built-in ones.
#[derive(Debug, Clone)]
pub struct ReceiverFactory {
    infos: Vec<ReceiverInfo>,
}

impl Default for ReceiverFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverFactory {
    pub fn new() -> Self {
        Self {
            infos: vec![file::INFO, tcp::INFO, udp::INFO, search::INFO],
        }
    }

    /// Add or replace a receiver type.
    pub fn register(&mut self, info: ReceiverInfo) {
        self.infos.retain(|i| i.kind != info.kind);
        self.infos.push(info);
    }

    pub fn get(&self, kind: &str) -> Option<&ReceiverInfo> {
        self.infos.iter().find(|i| i.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReceiverInfo> {
        self.infos.iter()
    }

    /// Build a receiver of type `kind` from its settings table.
    pub fn create(
        &self,
        kind: &str,
        settings: serde_json::Value,
    ) -> Result<Box<dyn Receiver>, ReceiverError> {
        let info = self
            .get(kind)
            .ok_or_else(|| ReceiverError::UnknownKind(kind.to_string()))?;
        (info.build)(settings)
    }
}
