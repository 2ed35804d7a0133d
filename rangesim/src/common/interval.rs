//! Continuous and discretized intervals used by the sensor models.

use super::linear_space;
use serde::{Deserialize, Serialize};

/// A closed interval `[min, max]`, used for the valid range of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check if a value lies inside the interval, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min >= 0.0 && self.min <= self.max
    }
}

/// An interval sampled at `size` evenly spaced values, with the first value at `min` and the last
/// at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscreteInterval {
    pub min: f64,
    pub max: f64,
    pub size: u32,
}

impl DiscreteInterval {
    pub fn new(min: f64, max: f64, size: u32) -> Self {
        Self { min, max, size }
    }

    /// The spacing between adjacent values. An interval with one (or zero) values has a step of
    /// zero.
    pub fn step(&self) -> f64 {
        if self.size < 2 {
            0.0
        } else {
            (self.max - self.min) / (self.size - 1) as f64
        }
    }

    /// The value at the discrete index `id`.
    pub fn value(&self, id: u32) -> f64 {
        self.min + id as f64 * self.step()
    }

    pub fn values(&self) -> Vec<f64> {
        linear_space(self.min, self.max, self.size as usize)
    }
}
