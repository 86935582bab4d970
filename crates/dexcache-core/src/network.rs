//! Network quality signals for the preloader.
//!
//! The platform capability is optional. When nothing reports connection
//! quality the monitor assumes a fast link and preloading stays on.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveConnectionType {
    pub fn is_slow(&self) -> bool {
        matches!(self, EffectiveConnectionType::Slow2g | EffectiveConnectionType::TwoG)
    }
}

impl FromStr for EffectiveConnectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(EffectiveConnectionType::Slow2g),
            "2g" => Ok(EffectiveConnectionType::TwoG),
            "3g" => Ok(EffectiveConnectionType::ThreeG),
            "4g" => Ok(EffectiveConnectionType::FourG),
            other => Err(format!("unknown connection type: {}", other)),
        }
    }
}

impl fmt::Display for EffectiveConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveConnectionType::Slow2g => write!(f, "slow-2g"),
            EffectiveConnectionType::TwoG => write!(f, "2g"),
            EffectiveConnectionType::ThreeG => write!(f, "3g"),
            EffectiveConnectionType::FourG => write!(f, "4g"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionInfo {
    pub effective_type: Option<EffectiveConnectionType>,
    pub save_data: bool,
}

impl ConnectionInfo {
    pub fn is_slow(&self) -> bool {
        self.save_data || self.effective_type.map_or(false, |t| t.is_slow())
    }
}

/// Platform capability reporting connection quality.
pub trait NetworkInformation: Send + Sync {
    /// `None` when the platform cannot tell
    fn connection(&self) -> Option<ConnectionInfo>;
}

/// Capability for platforms that report nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownNetwork;

impl NetworkInformation for UnknownNetwork {
    fn connection(&self) -> Option<ConnectionInfo> {
        None
    }
}

/// Fixed connection info, e.g. from user settings. Can be updated at runtime;
/// call [`NetworkConditionMonitor::handle_change`] afterwards.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    info: Mutex<ConnectionInfo>,
}

impl StaticNetwork {
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info: Mutex::new(info),
        }
    }

    pub fn set(&self, info: ConnectionInfo) {
        *self.info.lock().unwrap_or_else(|p| p.into_inner()) = info;
    }
}

impl NetworkInformation for StaticNetwork {
    fn connection(&self) -> Option<ConnectionInfo> {
        Some(*self.info.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

pub struct NetworkConditionMonitor {
    source: Arc<dyn NetworkInformation>,
    slow_tx: watch::Sender<bool>,
}

impl NetworkConditionMonitor {
    pub fn new(source: Arc<dyn NetworkInformation>) -> Self {
        let slow = evaluate(source.as_ref());
        let (slow_tx, _) = watch::channel(slow);
        Self { source, slow_tx }
    }

    /// Monitor with no capability behind it; never reports slow
    pub fn unknown() -> Self {
        Self::new(Arc::new(UnknownNetwork))
    }

    pub fn is_slow(&self) -> bool {
        *self.slow_tx.borrow()
    }

    pub fn should_preload(&self) -> bool {
        !self.is_slow()
    }

    /// Re-evaluate after the platform signals a connection change.
    pub fn handle_change(&self) {
        let slow = evaluate(self.source.as_ref());
        let changed = self.slow_tx.send_if_modified(|current| {
            if *current == slow {
                false
            } else {
                *current = slow;
                true
            }
        });
        if changed {
            debug!(slow, "Network condition changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.slow_tx.subscribe()
    }
}

fn evaluate(source: &dyn NetworkInformation) -> bool {
    source.connection().map_or(false, |info| info.is_slow())
}
