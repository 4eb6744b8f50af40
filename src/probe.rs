use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendKind, CallContext};

/// Per-request reachability of every probed backend.
///
/// Built fresh for each request; kinds that were not probed count as unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AvailabilitySnapshot {
    entries: BTreeMap<BackendKind, bool>,
}

impl AvailabilitySnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = (BackendKind, bool)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.entries.get(&kind).copied().unwrap_or(false)
    }

    pub fn available(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.entries
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(kind, _)| *kind)
    }

    pub fn any_available(&self) -> bool {
        self.entries.values().any(|ok| *ok)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BackendKind, bool)> + '_ {
        self.entries.iter().map(|(kind, ok)| (*kind, *ok))
    }
}

/// Probe every given backend once, concurrently.
///
/// Each probe runs on its own scoped thread so a slow dependency only costs its own timeout. A
/// probe that panics is recorded as unavailable. No retries.
pub fn probe_all(backends: &[Arc<dyn Backend>], ctx: &CallContext) -> AvailabilitySnapshot {
    let results: Vec<(BackendKind, bool)> = std::thread::scope(|scope| {
        let handles: Vec<_> = backends
            .iter()
            .map(|backend| {
                let kind = backend.kind();
                (kind, scope.spawn(move || backend.probe(ctx)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(kind, handle)| {
                let ok = handle.join().unwrap_or_else(|_| {
                    warn!(backend = %kind, "probe panicked; treating backend as unavailable");
                    false
                });
                debug!(backend = %kind, available = ok, "probed backend");
                (kind, ok)
            })
            .collect()
    });

    AvailabilitySnapshot::from_entries(results)
}
