//! Adaptive batch sizing.
//!
//! The batch size is a two-rule state machine: grow by a small step after a
//! batch that indexed quickly and without pressure, shrink by a larger step
//! after a slow, rate-limited or partially failed batch. The size never
//! leaves `[min, max]`.

use std::time::Duration;

use anyhow::{bail, Result};

/// Bounds and steps of the batch size controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSizeConfig {
    pub min: usize,
    pub max: usize,
    pub grow_step: usize,
    pub shrink_step: usize,
    /// Batches indexed faster than this may grow the size
    pub target_latency: Duration,
}

impl Default for BatchSizeConfig {
    fn default() -> Self {
        Self {
            min: 100,
            max: 5000,
            grow_step: 100,
            shrink_step: 500,
            target_latency: Duration::from_secs(2),
        }
    }
}

impl BatchSizeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min == 0 {
            bail!("min_batch_size must be at least 1");
        }
        if self.min > self.max {
            bail!(
                "min_batch_size ({}) must not exceed max_batch_size ({})",
                self.min,
                self.max
            );
        }
        if self.grow_step == 0 {
            bail!("batch_grow_step must be at least 1");
        }
        if self.shrink_step < self.grow_step {
            bail!(
                "batch_shrink_step ({}) must be at least batch_grow_step ({})",
                self.shrink_step,
                self.grow_step
            );
        }
        Ok(())
    }
}

/// What the indexer observed for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchFeedback {
    pub latency: Duration,
    pub rate_limited: bool,
    pub partial_failure: bool,
}

/// Transition taken by [`BatchSizer::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeChange {
    Grew { from: usize, to: usize },
    Shrank { from: usize, to: usize },
    Held(usize),
}

#[derive(Debug, Clone)]
pub struct BatchSizer {
    config: BatchSizeConfig,
    current: usize,
}

impl BatchSizer {
    /// Start at the minimum size.
    pub fn new(config: BatchSizeConfig) -> Self {
        let current = config.min;
        Self { config, current }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn config(&self) -> &BatchSizeConfig {
        &self.config
    }

    /// Apply feedback from a successfully indexed batch.
    pub fn record(&mut self, feedback: BatchFeedback) -> SizeChange {
        let pressured = feedback.rate_limited
            || feedback.partial_failure
            || feedback.latency > self.config.target_latency;

        if pressured {
            self.shrink()
        } else if feedback.latency < self.config.target_latency {
            self.grow()
        } else {
            SizeChange::Held(self.current)
        }
    }

    pub fn grow(&mut self) -> SizeChange {
        let from = self.current;
        self.current = from.saturating_add(self.config.grow_step).min(self.config.max);
        if self.current == from {
            SizeChange::Held(from)
        } else {
            SizeChange::Grew {
                from,
                to: self.current,
            }
        }
    }

    pub fn shrink(&mut self) -> SizeChange {
        let from = self.current;
        self.current = from
            .saturating_sub(self.config.shrink_step)
            .max(self.config.min);
        if self.current == from {
            SizeChange::Held(from)
        } else {
            SizeChange::Shrank {
                from,
                to: self.current,
            }
        }
    }
}
