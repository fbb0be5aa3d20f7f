//! Shared domain types: discovered peripherals, the configured target and
//! the observable relay state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A peripheral as seen during one discovery event. Immutable per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralDescriptor {
    /// Advertised local name ("Unknown" when the advertisement carries none).
    pub name: String,
    /// Stable hardware identifier, e.g. "AA:BB:CC:DD:EE:FF".
    pub address: String,
    /// Raw advertisement payload, kept for diagnostics.
    pub raw_advertisement: Vec<u8>,
}

impl PeripheralDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            raw_advertisement: Vec::new(),
        }
    }

    /// Human-readable label used in status text and logs.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.address)
    }
}

/// Policy for combining the configured target filters.
///
/// Deployments differ here: some identify the remote by name alone, some
/// require name and address. Both behaviours stay available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every configured filter must match.
    #[default]
    All,
    /// One matching configured filter suffices.
    Any,
}

/// Which peripheral the relay should lock onto. At least one of the two
/// filters must be set; `RelayWorker::start` rejects an empty spec.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
}

impl TargetSpec {
    /// Target identified by advertised name only.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Target identified by hardware address only.
    pub fn by_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none()
    }

    /// Evaluate a discovered peripheral against this target.
    ///
    /// Pure and deterministic; an unconfigured filter never participates.
    pub fn matches(&self, peripheral: &PeripheralDescriptor) -> bool {
        let name_ok = self.name.as_deref().map(|n| n == peripheral.name);
        let address_ok = self.address.as_deref().map(|a| a == peripheral.address);

        match self.match_mode {
            MatchMode::All => {
                !self.is_empty() && name_ok.unwrap_or(true) && address_ok.unwrap_or(true)
            }
            MatchMode::Any => name_ok.unwrap_or(false) || address_ok.unwrap_or(false),
        }
    }
}

/// Authoritative state of one relay worker, mutated only by the connection
/// manager and published over a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Ready,
    Disconnected,
    Failed(String),
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Idle => write!(f, "idle"),
            RelayState::Scanning => write!(f, "scanning"),
            RelayState::Connecting => write!(f, "connecting"),
            RelayState::Ready => write!(f, "ready"),
            RelayState::Disconnected => write!(f, "disconnected"),
            RelayState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon() -> PeripheralDescriptor {
        PeripheralDescriptor::new("beacon-1", "AA:BB")
    }

    #[test]
    fn test_match_name_only_ignores_address() {
        let target = TargetSpec::by_name("beacon-1");
        assert!(target.matches(&beacon()));
        assert!(target.matches(&PeripheralDescriptor::new("beacon-1", "11:22")));
        assert!(!target.matches(&PeripheralDescriptor::new("other", "AA:BB")));
    }

    #[test]
    fn test_match_address_only_ignores_name() {
        let target = TargetSpec::by_address("AA:BB");
        assert!(target.matches(&beacon()));
        assert!(target.matches(&PeripheralDescriptor::new("renamed", "AA:BB")));
        assert!(!target.matches(&PeripheralDescriptor::new("beacon-1", "11:22")));
    }

    #[test]
    fn test_match_all_requires_both_when_configured() {
        let target = TargetSpec {
            name: Some("beacon-1".into()),
            address: Some("AA:BB".into()),
            match_mode: MatchMode::All,
        };
        assert!(target.matches(&beacon()));
        assert!(!target.matches(&PeripheralDescriptor::new("beacon-1", "11:22")));
        assert!(!target.matches(&PeripheralDescriptor::new("other", "AA:BB")));
    }

    #[test]
    fn test_match_any_accepts_single_field() {
        let target = TargetSpec {
            name: Some("beacon-1".into()),
            address: Some("AA:BB".into()),
            match_mode: MatchMode::Any,
        };
        assert!(target.matches(&PeripheralDescriptor::new("beacon-1", "11:22")));
        assert!(target.matches(&PeripheralDescriptor::new("other", "AA:BB")));
        assert!(!target.matches(&PeripheralDescriptor::new("other", "11:22")));
    }

    #[test]
    fn test_empty_target_never_matches() {
        let empty = TargetSpec::default();
        assert!(empty.is_empty());
        assert!(!empty.matches(&beacon()));
        assert!(!empty.with_match_mode(MatchMode::Any).matches(&beacon()));
    }

    #[test]
    fn test_match_is_deterministic() {
        let target = TargetSpec::by_name("beacon-1");
        let peripheral = beacon();
        let first = target.matches(&peripheral);
        for _ in 0..10 {
            assert_eq!(target.matches(&peripheral), first);
        }
    }
}
