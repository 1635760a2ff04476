use std::iter::Sum;
use std::ops::Add;

use crate::error::{PipelineError, Result};

use super::Scene;

/// Longest clip the video model will render for one scene.
pub const MAX_SCENE_SECONDS: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneAggregate {
    /// Saturating sum of scene durations.
    pub total_duration_seconds: u64,
    pub scene_count: usize,
}

impl Add for SceneAggregate {
    type Output = SceneAggregate;

    fn add(self, rhs: SceneAggregate) -> SceneAggregate {
        SceneAggregate {
            total_duration_seconds: self
                .total_duration_seconds
                .saturating_add(rhs.total_duration_seconds),
            scene_count: self.scene_count.saturating_add(rhs.scene_count),
        }
    }
}

impl Sum for SceneAggregate {
    fn sum<I: Iterator<Item = SceneAggregate>>(iter: I) -> Self {
        iter.fold(SceneAggregate::default(), Add::add)
    }
}

pub struct ScenePlanner;

impl ScenePlanner {
    /// Reports every scene over the cap at once, in ascending order.
    pub fn validate(scenes: &[Scene]) -> Result<()> {
        let mut offending: Vec<u32> = scenes
            .iter()
            .filter(|s| s.duration_seconds > MAX_SCENE_SECONDS)
            .map(|s| s.scene_number)
            .collect();

        if offending.is_empty() {
            return Ok(());
        }

        offending.sort_unstable();
        offending.dedup();
        Err(PipelineError::DurationExceeded { scenes: offending })
    }

    pub fn aggregate(scenes: &[Scene]) -> SceneAggregate {
        scenes
            .iter()
            .map(|s| SceneAggregate {
                total_duration_seconds: u64::from(s.duration_seconds),
                scene_count: 1,
            })
            .sum()
    }

    /// Fewest scenes that cover `total_seconds` under the cap: full-length
    /// scenes first, remainder last.
    pub fn partition(total_seconds: u64) -> Vec<u32> {
        let cap = u64::from(MAX_SCENE_SECONDS);
        let full = total_seconds / cap;
        let rest = (total_seconds % cap) as u32;

        let mut durations = vec![MAX_SCENE_SECONDS; full as usize];
        if rest > 0 {
            durations.push(rest);
        }
        durations
    }

    /// Length of `partition(total_seconds)` without building it.
    pub fn minimal_scene_count(total_seconds: u64) -> u64 {
        total_seconds.div_ceil(u64::from(MAX_SCENE_SECONDS))
    }

    /// Whether the script already uses the minimal scene count for its length.
    pub fn is_minimal(scenes: &[Scene]) -> bool {
        let aggregate = Self::aggregate(scenes);
        aggregate.scene_count as u64 == Self::minimal_scene_count(aggregate.total_duration_seconds)
    }
}
