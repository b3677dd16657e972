//! Pick what the live environment actually supports from a preference list.
//!
//! For each candidate, in order: normalize its name to the facility the
//! kernel knows it by, probe, try to enable it once if missing, probe again.
//! The first supported candidate wins. If none is supported the first
//! candidate is chosen anyway and a warning is logged; negotiation never
//! fails the run.

mod storage;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ProbeError;

pub use storage::{select_storage_driver, storage_negotiator};

/// Live view of a facility registry (filesystems, modules, ...).
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn is_supported(&self, facility: &str) -> Result<bool, ProbeError>;

    async fn enable(&self, facility: &str) -> Result<(), ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDecision {
    pub chosen: String,
    /// False when the choice is the best-effort default.
    pub supported: bool,
}

pub struct Negotiator<'a> {
    label: &'static str,
    probe: &'a dyn CapabilityProbe,
    aliases: HashMap<String, String>,
}

impl<'a> Negotiator<'a> {
    pub fn new(label: &'static str, probe: &'a dyn CapabilityProbe) -> Self {
        Self {
            label,
            probe,
            aliases: HashMap::new(),
        }
    }

    /// Candidate `from` is known to the kernel as `to`.
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.insert(from.to_string(), to.to_string());
        self
    }

    pub fn facility_name<'s>(&'s self, candidate: &'s str) -> &'s str {
        self.aliases
            .get(candidate)
            .map(String::as_str)
            .unwrap_or(candidate)
    }

    /// `None` only when `candidates` is empty.
    pub async fn negotiate<S: AsRef<str>>(&self, candidates: &[S]) -> Option<CapabilityDecision> {
        let first = candidates.first()?.as_ref();

        for candidate in candidates {
            let candidate = candidate.as_ref();
            let facility = self.facility_name(candidate);

            match self.probe.is_supported(facility).await {
                Ok(true) => return Some(self.select(candidate)),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("{e}");
                    continue;
                }
            }

            if let Err(e) = self.probe.enable(facility).await {
                tracing::warn!("{e}");
            }

            match self.probe.is_supported(facility).await {
                Ok(true) => return Some(self.select(candidate)),
                Ok(false) => tracing::warn!(
                    "{:?} {} was specified, but {:?} is not supported",
                    candidate,
                    self.label,
                    facility
                ),
                Err(e) => tracing::warn!("{e}"),
            }
        }

        tracing::warn!(
            "No {} was supported from {:?}, will default to {:?}",
            self.label,
            candidates.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            first
        );
        Some(CapabilityDecision {
            chosen: first.to_string(),
            supported: false,
        })
    }

    fn select(&self, candidate: &str) -> CapabilityDecision {
        tracing::info!("Using supported {} {:?}", self.label, candidate);
        CapabilityDecision {
            chosen: candidate.to_string(),
            supported: true,
        }
    }
}
