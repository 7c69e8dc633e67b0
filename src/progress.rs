//! Synthetic progress for the two remote calls.
//!
//! The value only reassures the user that work is happening. It climbs
//! quickly, then crawls, and stops at a ceiling below 100 so that completion
//! is signalled by the state change and never by the bar.

use crate::config::ProgressConfig;

pub const DONE: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct ProgressMeter {
    config: ProgressConfig,
    value: f32,
}

impl ProgressMeter {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config, value: 0.0 }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn start(&mut self) {
        self.value = self.config.initial.min(self.ceiling());
    }

    pub fn tick(&mut self) -> f32 {
        let step = if self.value > self.config.slow_above {
            self.config.slow_step
        } else {
            self.config.fast_step
        };
        self.value = (self.value + step.max(0.0)).min(self.ceiling());
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    // Guards against a config that slipped past validation.
    fn ceiling(&self) -> f32 {
        if self.config.ceiling < DONE {
            self.config.ceiling
        } else {
            DONE - 1.0
        }
    }
}
