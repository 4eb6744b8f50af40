//! Runtime-mutable configuration shared by the gateway and the HTTP surface.
//!
//! `Settings` replaces process-wide globals: it is created once at startup, handed to
//! [`crate::Gateway::new`] behind an `Arc`, and mutated only through the setters below.
//! Writes are last-write-wins; `snapshot()` gives a request a consistent view of every value.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::backend::BackendKind;
use crate::error::Result;
use crate::mode::ComputeMode;

/// A point-in-time copy of every runtime setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    pub compute_mode: ComputeMode,
    pub language: String,
    pub remote_host: Option<String>,
    pub threads: usize,
    pub model: String,
    /// Pin every request to one backend unless the request names its own.
    pub backend: Option<BackendKind>,
    /// Allow a single fallback hop for explicit `local`/`remote` modes (`auto` always may).
    pub allow_fallback: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            compute_mode: ComputeMode::Local,
            language: crate::language::FALLBACK_LANGUAGE.to_owned(),
            remote_host: None,
            threads: 4,
            model: "base".to_owned(),
            backend: None,
            allow_fallback: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct Settings {
    inner: RwLock<SettingsSnapshot>,
}

impl Settings {
    pub fn new(initial: SettingsSnapshot) -> Self {
        let mut initial = initial;
        initial.remote_host = normalize_host(initial.remote_host.as_deref());
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.read().clone()
    }

    pub fn compute_mode(&self) -> ComputeMode {
        self.read().compute_mode
    }

    pub fn set_compute_mode(&self, mode: ComputeMode) {
        self.write().compute_mode = mode;
    }

    /// Parse and store a compute mode, rejecting anything outside `local | remote | auto`.
    pub fn set_compute_mode_str(&self, raw: &str) -> Result<ComputeMode> {
        let mode = raw.parse::<ComputeMode>()?;
        self.set_compute_mode(mode);
        Ok(mode)
    }

    pub fn language(&self) -> String {
        self.read().language.clone()
    }

    pub fn set_language(&self, language: impl Into<String>) {
        self.write().language = language.into();
    }

    pub fn remote_host(&self) -> Option<String> {
        self.read().remote_host.clone()
    }

    /// Store a peer base URL. Blank input clears it.
    pub fn set_remote_host(&self, host: Option<&str>) -> Option<String> {
        let host = normalize_host(host);
        self.write().remote_host = host.clone();
        host
    }

    pub fn threads(&self) -> usize {
        self.read().threads
    }

    pub fn set_threads(&self, threads: usize) {
        self.write().threads = threads.max(1);
    }

    pub fn model(&self) -> String {
        self.read().model.clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.write().model = model.into();
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.read().backend
    }

    pub fn set_backend(&self, backend: Option<BackendKind>) {
        self.write().backend = backend;
    }

    pub fn allow_fallback(&self) -> bool {
        self.read().allow_fallback
    }

    pub fn set_allow_fallback(&self, allow: bool) {
        self.write().allow_fallback = allow;
    }

    // A writer cannot leave a half-updated field behind (each setter is a single assignment), so
    // the value behind a poisoned lock is still sound.
    fn read(&self) -> RwLockReadGuard<'_, SettingsSnapshot> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SettingsSnapshot> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Trim whitespace and trailing slashes; empty becomes `None`.
pub(crate) fn normalize_host(host: Option<&str>) -> Option<String> {
    host.map(|h| h.trim().trim_end_matches('/'))
        .filter(|h| !h.is_empty())
        .map(str::to_owned)
}
