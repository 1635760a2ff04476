use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Script,
    Transform,
    ConceptArt,
    Images,
    Narration,
    Video,
    Merge,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Script,
        Stage::Transform,
        Stage::ConceptArt,
        Stage::Images,
        Stage::Narration,
        Stage::Video,
        Stage::Merge,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Script => "script generation",
            Stage::Transform => "script transformation",
            Stage::ConceptArt => "concept art",
            Stage::Images => "image generation",
            Stage::Narration => "narration",
            Stage::Video => "video generation",
            Stage::Merge => "video merge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed(String),
}

/// One state machine per stage: Idle -> Running -> Completed | Failed.
#[derive(Debug, Default)]
pub struct StageBoard {
    states: HashMap<Stage, StageState>,
}

impl StageBoard {
    pub fn state(&self, stage: Stage) -> StageState {
        self.states.get(&stage).cloned().unwrap_or_default()
    }

    pub fn running(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|s| self.states.get(s) == Some(&StageState::Running))
    }

    pub fn is_busy(&self) -> bool {
        self.running().is_some()
    }

    /// Moves `stage` to Running unless something else already is.
    pub fn begin(&mut self, stage: Stage) -> Result<()> {
        if let Some(active) = self.running() {
            return Err(PipelineError::Busy(active));
        }
        self.states.insert(stage, StageState::Running);
        Ok(())
    }

    pub fn complete(&mut self, stage: Stage) {
        self.states.insert(stage, StageState::Completed);
    }

    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        self.states.insert(stage, StageState::Failed(message.into()));
    }
}
