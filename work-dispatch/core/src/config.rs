// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::ConfigError;
use crate::partition::Z_SCORE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// How the batch is spread across participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Master hands out one task at a time as workers free up
    #[default]
    Dynamic,
    /// One-shot partition sizing, no compute
    Static,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" => Ok(Self::Dynamic),
            "static" => Ok(Self::Static),
            other => Err(format!("unknown dispatch mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of tasks in the batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of participants, master included
    #[serde(default = "default_participants")]
    pub participants: usize,
    /// Whether the master also computes tasks between drains
    #[serde(default = "default_master_computes")]
    pub master_computes: bool,
    /// Multiplier applied to every simulated compute delay (1.0 = real time)
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    /// Base random seed; each participant adds its rank. Time-based when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub mode: DispatchMode,
    /// Z constant of the static partition window
    #[serde(default = "default_z_score")]
    pub z_score: f64,
}

/// Largest accepted `time_scale`; keeps every scaled delay within `Duration`
pub const MAX_TIME_SCALE: f64 = 1_000.0;

fn default_batch_size() -> usize {
    1024
}

fn default_participants() -> usize {
    4
}

fn default_master_computes() -> bool {
    true
}

fn default_time_scale() -> f64 {
    0.001
}

fn default_z_score() -> f64 {
    Z_SCORE
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            participants: default_participants(),
            master_computes: default_master_computes(),
            time_scale: default_time_scale(),
            seed: None,
            mode: DispatchMode::default(),
            z_score: default_z_score(),
        }
    }
}

impl DispatchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: DispatchConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if self.participants == 0 {
            return Err(ConfigError::NoParticipants);
        }
        if !self.master_computes && self.participants < 2 {
            return Err(ConfigError::NoComputeParticipants {
                participants: self.participants,
            });
        }
        if !(0.0..=MAX_TIME_SCALE).contains(&self.time_scale) {
            return Err(ConfigError::InvalidTimeScale(self.time_scale));
        }
        Ok(())
    }

    /// Seed used by the participant with the given rank.
    pub fn seed_for(&self, rank: usize) -> u64 {
        let base = self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        base.wrapping_add(rank as u64)
    }

    pub fn print_summary(&self) {
        println!("Configuration:");
        println!("  - Mode: {:?}", self.mode);
        println!("  - Batch size: {}", self.batch_size);
        println!("  - Participants: {}", self.participants);
        println!("  - Master computes: {}", self.master_computes);
        println!("  - Time scale: {}", self.time_scale);
        match self.seed {
            Some(seed) => println!("  - Seed: {}", seed),
            None => println!("  - Seed: time-based"),
        }
        if self.mode == DispatchMode::Static {
            println!("  - Z score: {}", self.z_score);
        }
    }
}
