//! Backend selection policy.
//!
//! Both functions here are pure: identical inputs always give identical outputs. Nothing is
//! randomized or rotated.

use crate::backend::BackendKind;
use crate::error::{Error, Result};
use crate::mode::ComputeMode;
use crate::probe::AvailabilitySnapshot;

/// Local-class kinds, in preference order.
pub const LOCAL_PREFERENCE: [BackendKind; 2] = [BackendKind::LocalModel, BackendKind::LocalBinary];

/// Kinds considered by `auto` selection and fallback, in preference order.
///
/// The hosted API is only ever used when named explicitly.
pub const AUTO_PREFERENCE: [BackendKind; 3] = [
    BackendKind::LocalModel,
    BackendKind::LocalBinary,
    BackendKind::RemotePeer,
];

/// Inputs of one selection decision.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    pub mode: ComputeMode,
    pub snapshot: &'a AvailabilitySnapshot,
    pub explicit: Option<BackendKind>,
    pub remote_host: Option<&'a str>,
}

/// Pick exactly one backend for a request.
///
/// Rules, first match wins:
/// 1. an explicit backend must itself be available
/// 2. `local` takes the first available local-class backend
/// 3. `remote` needs a configured peer address and a reachable peer
/// 4. `auto` prefers local-class, then the peer
pub fn select(input: SelectionInput<'_>) -> Result<BackendKind> {
    let snapshot = input.snapshot;

    if let Some(kind) = input.explicit {
        if snapshot.is_available(kind) {
            return Ok(kind);
        }
        return Err(Error::selection(format!(
            "requested backend {kind} unavailable"
        )));
    }

    match input.mode {
        ComputeMode::Local => first_available(&LOCAL_PREFERENCE, snapshot)
            .ok_or_else(|| Error::selection("local backend unavailable")),
        ComputeMode::Remote => {
            let Some(host) = input.remote_host else {
                return Err(Error::Configuration(
                    "remote host not configured".to_owned(),
                ));
            };
            if snapshot.is_available(BackendKind::RemotePeer) {
                Ok(BackendKind::RemotePeer)
            } else {
                Err(Error::selection(format!(
                    "remote backend unavailable: {host}"
                )))
            }
        }
        ComputeMode::Auto => first_available(&AUTO_PREFERENCE, snapshot)
            .ok_or_else(|| Error::Availability("no backend available".to_owned())),
    }
}

/// The single secondary backend to try after `primary` failed, if any.
///
/// Explicit backends never fall back. `auto` always may; `local` and `remote` only when
/// `allow_fallback` is set.
pub fn fallback_for(
    primary: BackendKind,
    input: SelectionInput<'_>,
    allow_fallback: bool,
) -> Option<BackendKind> {
    if input.explicit.is_some() {
        return None;
    }

    let permitted = match input.mode {
        ComputeMode::Auto => true,
        ComputeMode::Local | ComputeMode::Remote => allow_fallback,
    };
    if !permitted {
        return None;
    }

    AUTO_PREFERENCE
        .into_iter()
        .filter(|kind| *kind != primary)
        .filter(|kind| *kind != BackendKind::RemotePeer || input.remote_host.is_some())
        .find(|kind| input.snapshot.is_available(*kind))
}

/// Which backends need probing for this request.
///
/// Explicit requests only probe the named backend; `local`/`remote` without fallback only probe
/// their own class.
pub fn relevant_kinds(
    mode: ComputeMode,
    explicit: Option<BackendKind>,
    allow_fallback: bool,
) -> Vec<BackendKind> {
    if let Some(kind) = explicit {
        return vec![kind];
    }

    match mode {
        ComputeMode::Local if !allow_fallback => LOCAL_PREFERENCE.to_vec(),
        ComputeMode::Remote if !allow_fallback => vec![BackendKind::RemotePeer],
        _ => AUTO_PREFERENCE.to_vec(),
    }
}

fn first_available(order: &[BackendKind], snapshot: &AvailabilitySnapshot) -> Option<BackendKind> {
    order.iter().copied().find(|kind| snapshot.is_available(*kind))
}
