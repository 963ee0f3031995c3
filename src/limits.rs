// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::exceptions::{raise, ExcType, Result};

use serde::{Deserialize, Serialize};

/// Resource ceilings for one run of a script.
///
/// All limits are optional; an absent limit means unlimited. Limit
/// breaches surface as script-visible exceptions (`MemoryError`,
/// `RecursionError`, `RuntimeError`) and therefore participate in
/// script-level `try`/`except`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Cap on container and iterator allocations.
    pub max_allocations: Option<u64>,
    /// Cap on evaluation steps per `start`/`resume` invocation.
    pub max_steps: Option<u64>,
    /// Cap on call depth.
    pub max_depth: Option<u32>,
}

impl ResourceLimits {
    pub const fn unlimited() -> Self {
        Self {
            max_allocations: None,
            max_steps: None,
            max_depth: None,
        }
    }

    pub const fn with_max_allocations(mut self, n: u64) -> Self {
        self.max_allocations = Some(n);
        self
    }

    pub const fn with_max_steps(mut self, n: u64) -> Self {
        self.max_steps = Some(n);
        self
    }

    pub const fn with_max_depth(mut self, n: u32) -> Self {
        self.max_depth = Some(n);
        self
    }
}

/// Per-run counters checked against [`ResourceLimits`].
///
/// The allocation counter is cumulative across a whole run and monotonic
/// within each invocation; the step counter is reset on every
/// `start`/`resume` entry.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    limits: ResourceLimits,
    allocations: u64,
    steps: u64,
    depth: u32,
}

impl ResourceTracker {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    /// Checked before each allocation, so the counter never passes the
    /// configured ceiling.
    pub fn allocate(&mut self) -> Result<()> {
        if let Some(max) = self.limits.max_allocations {
            if self.allocations >= max {
                return Err(raise(ExcType::MemoryError, "allocation limit exceeded"));
            }
        }
        self.allocations += 1;
        Ok(())
    }

    pub fn step(&mut self) -> Result<()> {
        if let Some(max) = self.limits.max_steps {
            if self.steps >= max {
                return Err(raise(
                    ExcType::RuntimeError,
                    "execution step limit exceeded",
                ));
            }
        }
        self.steps += 1;
        Ok(())
    }

    pub fn enter_call(&mut self) -> Result<()> {
        if let Some(max) = self.limits.max_depth {
            if self.depth >= max {
                return Err(raise(
                    ExcType::RecursionError,
                    "maximum recursion depth exceeded",
                ));
            }
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn reset_steps(&mut self) {
        self.steps = 0;
    }

    pub const fn allocations(&self) -> u64 {
        self.allocations
    }

    pub const fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_ceiling() {
        let mut tracker = ResourceTracker::new(ResourceLimits::unlimited().with_max_allocations(2));
        assert!(tracker.allocate().is_ok());
        assert!(tracker.allocate().is_ok());
        let err = tracker.allocate().unwrap_err();
        assert_eq!(err.class(), ExcType::MemoryError);
        assert_eq!(tracker.allocations(), 2);
    }

    #[test]
    fn step_ceiling_resets_per_invocation() {
        let mut tracker = ResourceTracker::new(ResourceLimits::unlimited().with_max_steps(3));
        for _ in 0..3 {
            tracker.step().unwrap();
        }
        let err = tracker.step().unwrap_err();
        let exc = &err;
        assert_eq!(exc.class(), ExcType::RuntimeError);
        assert_eq!(exc.message(), "execution step limit exceeded");

        tracker.reset_steps();
        assert!(tracker.step().is_ok());
    }

    #[test]
    fn depth_ceiling() {
        let mut tracker = ResourceTracker::new(ResourceLimits::unlimited().with_max_depth(1));
        tracker.enter_call().unwrap();
        let err = tracker.enter_call().unwrap_err();
        assert_eq!(err.class(), ExcType::RecursionError);
        tracker.exit_call();
        assert!(tracker.enter_call().is_ok());
    }
}
