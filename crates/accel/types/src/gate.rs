//! Named exclusion scopes
//!
//! Two independent gates serialize the agent's periodic work: one is held for
//! a whole reconciliation run, the other for an image-catalog refresh. A
//! refresh may happen on its own or inside a run; because the scopes are
//! distinct, neither path ever acquires the same gate twice.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Gate held for a whole reconciliation run
pub const RESOURCE_GATE: &str = "agent_resources";

/// Gate held while refreshing the image catalog cache
pub const IMAGE_GATE: &str = "agent_image";

/// An async mutual-exclusion scope with a fixed name
///
/// Clones share the same underlying lock.
#[derive(Debug, Clone)]
pub struct NamedGate {
    name: &'static str,
    lock: Arc<Mutex<()>>,
}

/// Proof of holding a gate; the gate is released on drop
#[derive(Debug)]
pub struct GateGuard<'a> {
    name: &'static str,
    _guard: MutexGuard<'a, ()>,
}

impl NamedGate {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait until the gate is free and take it
    pub async fn acquire(&self) -> GateGuard<'_> {
        tracing::trace!(gate = self.name, "Acquiring gate");
        let guard = self.lock.lock().await;
        tracing::trace!(gate = self.name, "Gate acquired");
        GateGuard {
            name: self.name,
            _guard: guard,
        }
    }

    /// Take the gate only if nobody holds it
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.lock.try_lock().ok().map(|guard| GateGuard {
            name: self.name,
            _guard: guard,
        })
    }

    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

impl GateGuard<'_> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(gate = self.name, "Gate released");
    }
}

/// The agent's two gates
#[derive(Debug, Clone)]
pub struct Gates {
    pub resources: NamedGate,
    pub images: NamedGate,
}

impl Gates {
    pub fn new() -> Self {
        Self {
            resources: NamedGate::new(RESOURCE_GATE),
            images: NamedGate::new(IMAGE_GATE),
        }
    }
}

impl Default for Gates {
    fn default() -> Self {
        Self::new()
    }
}
