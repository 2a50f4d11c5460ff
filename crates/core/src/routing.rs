// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weighted traffic split between target groups behind a load balancer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Total weight every routing config must add up to
pub const TOTAL_WEIGHT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("traffic weights must sum to {TOTAL_WEIGHT}, got {0}")]
    InvalidTotal(u64),
    #[error("target group {0} appears more than once")]
    DuplicateTargetGroup(String),
    #[error("target group identifier must not be empty")]
    EmptyTargetGroup,
    #[error("primary weight {0} exceeds {TOTAL_WEIGHT}")]
    WeightOutOfRange(u32),
}

/// Weight assigned to one target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTarget {
    pub target_group_arn: String,
    pub weight: u32,
}

/// Ordered set of (target group, weight) pairs summing to 100
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRoutingConfig")]
pub struct TrafficRoutingConfig {
    targets: Vec<RoutingTarget>,
}

impl TrafficRoutingConfig {
    /// Build and validate a routing config
    pub fn new(targets: Vec<RoutingTarget>) -> Result<Self, RoutingError> {
        let mut seen = std::collections::HashSet::new();
        for target in &targets {
            if target.target_group_arn.is_empty() {
                return Err(RoutingError::EmptyTargetGroup);
            }
            if !seen.insert(target.target_group_arn.as_str()) {
                return Err(RoutingError::DuplicateTargetGroup(
                    target.target_group_arn.clone(),
                ));
            }
        }
        let total: u64 = targets.iter().map(|t| u64::from(t.weight)).sum();
        if total != u64::from(TOTAL_WEIGHT) {
            return Err(RoutingError::InvalidTotal(total));
        }
        Ok(Self { targets })
    }

    /// Split between a primary and a canary group, canary taking the remainder
    pub fn primary_canary(
        primary: impl Into<String>,
        canary: impl Into<String>,
        primary_weight: u32,
    ) -> Result<Self, RoutingError> {
        if primary_weight > TOTAL_WEIGHT {
            return Err(RoutingError::WeightOutOfRange(primary_weight));
        }
        Self::new(vec![
            RoutingTarget {
                target_group_arn: primary.into(),
                weight: primary_weight,
            },
            RoutingTarget {
                target_group_arn: canary.into(),
                weight: TOTAL_WEIGHT - primary_weight,
            },
        ])
    }

    /// All traffic back on the primary group
    pub fn all_primary(
        primary: impl Into<String>,
        canary: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        Self::primary_canary(primary, canary, TOTAL_WEIGHT)
    }

    pub fn targets(&self) -> &[RoutingTarget] {
        &self.targets
    }

    /// Weight of a group. Groups not listed receive no traffic.
    pub fn weight_of(&self, target_group_arn: &str) -> u32 {
        self.targets
            .iter()
            .find(|t| t.target_group_arn == target_group_arn)
            .map(|t| t.weight)
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct RawRoutingConfig {
    targets: Vec<RoutingTarget>,
}

impl TryFrom<RawRoutingConfig> for TrafficRoutingConfig {
    type Error = RoutingError;

    fn try_from(raw: RawRoutingConfig) -> Result<Self, Self::Error> {
        Self::new(raw.targets)
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
