//! Sequential per-scene generation with per-item bookkeeping.
//!
//! Every batch walks the scenes in the order given and awaits each item before
//! starting the next. What happens on failure is the caller's choice:
//! image and narration batches keep going, video batches stop at the first
//! failed scene. Results are handed to the caller as soon as an item
//! finishes, so whatever completed before an abort is kept.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Image,
    Narration,
    Video,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Image => write!(f, "image"),
            BatchKind::Narration => write!(f, "narration"),
            BatchKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and move on to the next scene.
    BestEffort,
    /// Stop the batch; later scenes are never attempted.
    AbortOnFirstFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus<T> {
    Pending,
    InProgress,
    /// Already produced by an earlier run.
    Skipped,
    Done(T),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based position of the scene being processed
    pub current: usize,
    pub total: usize,
    pub message: String,
}

pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

#[derive(Debug)]
pub struct GenerationRun<T> {
    pub kind: BatchKind,
    pub items: BTreeMap<u32, ItemStatus<T>>,
    pub state: RunState,
    first_failure: Option<(u32, String)>,
    cancelled: bool,
}

impl<T> GenerationRun<T> {
    fn new(kind: BatchKind, scenes: &[Scene]) -> Self {
        Self {
            kind,
            items: scenes
                .iter()
                .map(|s| (s.scene_number, ItemStatus::Pending))
                .collect(),
            state: RunState::Idle,
            first_failure: None,
            cancelled: false,
        }
    }

    fn set(&mut self, scene_number: u32, status: ItemStatus<T>) {
        self.items.insert(scene_number, status);
    }

    pub fn status(&self, scene_number: u32) -> Option<&ItemStatus<T>> {
        self.items.get(&scene_number)
    }

    pub fn completed(&self) -> Vec<u32> {
        self.scenes_where(|s| matches!(s, ItemStatus::Done(_)))
    }

    pub fn failures(&self) -> Vec<u32> {
        self.scenes_where(|s| matches!(s, ItemStatus::Failed(_)))
    }

    pub fn skipped(&self) -> Vec<u32> {
        self.scenes_where(|s| matches!(s, ItemStatus::Skipped))
    }

    pub fn pending(&self) -> Vec<u32> {
        self.scenes_where(|s| matches!(s, ItemStatus::Pending))
    }

    fn scenes_where(&self, pred: impl Fn(&ItemStatus<T>) -> bool) -> Vec<u32> {
        self.items
            .iter()
            .filter(|(_, status)| pred(status))
            .map(|(n, _)| *n)
            .collect()
    }

    /// Scene number and message of the first item that failed.
    pub fn first_failure(&self) -> Option<(u32, &str)> {
        self.first_failure
            .as_ref()
            .map(|(n, msg)| (*n, msg.as_str()))
    }

    pub fn is_aborted(&self) -> bool {
        self.state == RunState::Aborted
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

pub struct BatchOrchestrator {
    kind: BatchKind,
    policy: FailurePolicy,
    progress: Option<ProgressFn>,
    cancel: CancelToken,
}

impl BatchOrchestrator {
    pub fn new(kind: BatchKind, policy: FailurePolicy) -> Self {
        Self {
            kind,
            policy,
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn report(&self, progress: Progress) {
        debug!("{} ({}/{})", progress.message, progress.current, progress.total);
        if let Some(f) = &self.progress {
            f(&progress);
        }
    }

    /// Runs `op` for every scene not yet `already_done`, one at a time.
    /// `on_item` sees each finished item, done or failed, the moment it settles.
    pub async fn run<T, D, F, Fut, S>(
        &self,
        scenes: &[Scene],
        already_done: D,
        mut op: F,
        mut on_item: S,
    ) -> GenerationRun<T>
    where
        D: Fn(u32) -> bool,
        F: FnMut(Scene) -> Fut,
        Fut: Future<Output = Result<T>>,
        S: FnMut(u32, &ItemStatus<T>),
    {
        let mut run = GenerationRun::new(self.kind, scenes);
        run.state = RunState::Running;
        let total = scenes.len();

        for (index, scene) in scenes.iter().enumerate() {
            let scene_number = scene.scene_number;

            if self.cancel.is_cancelled() {
                warn!("{} batch cancelled before scene {}", self.kind, scene_number);
                run.cancelled = true;
                run.state = RunState::Aborted;
                break;
            }

            if already_done(scene_number) {
                info!("Scene {} {} already exists, skipping...", scene_number, self.kind);
                run.set(scene_number, ItemStatus::Skipped);
                continue;
            }

            run.set(scene_number, ItemStatus::InProgress);
            self.report(Progress {
                current: index + 1,
                total,
                message: format!(
                    "Generating {} for scene {} ({}/{})",
                    self.kind,
                    scene_number,
                    index + 1,
                    total
                ),
            });

            let result = self.cancel.run(op(scene.clone())).await;
            let failure = match result {
                Ok(value) => {
                    run.set(scene_number, ItemStatus::Done(value));
                    info!("Generated {} for scene {} ({}/{})", self.kind, scene_number, index + 1, total);
                    None
                }
                Err(err) => {
                    let message = if err.is_cancelled() {
                        "cancelled".to_string()
                    } else {
                        err.to_string()
                    };
                    warn!("Scene {} {} failed: {}", scene_number, self.kind, message);
                    run.set(scene_number, ItemStatus::Failed(message.clone()));
                    if run.first_failure.is_none() {
                        run.first_failure = Some((scene_number, message));
                    }
                    Some(err)
                }
            };

            if let Some(status) = run.items.get(&scene_number) {
                on_item(scene_number, status);
            }

            if let Some(err) = failure {
                if err.is_cancelled() {
                    run.cancelled = true;
                    run.state = RunState::Aborted;
                    break;
                }
                if self.policy == FailurePolicy::AbortOnFirstFailure {
                    run.state = RunState::Aborted;
                    break;
                }
            }
        }

        if run.state == RunState::Running {
            run.state = RunState::Completed;
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use parking_lot::Mutex;

    fn scenes(count: u32) -> Vec<Scene> {
        (1..=count)
            .map(|n| Scene::new(n, format!("scene {}", n), 8))
            .collect()
    }

    #[tokio::test]
    async fn items_run_strictly_one_after_another() {
        let log = Mutex::new(Vec::new());
        let batch = BatchOrchestrator::new(BatchKind::Image, FailurePolicy::BestEffort);

        let run = batch
            .run(
                &scenes(3),
                |_| false,
                |scene| {
                    let log = &log;
                    async move {
                        log.lock().push(format!("start {}", scene.scene_number));
                        tokio::task::yield_now().await;
                        log.lock().push(format!("end {}", scene.scene_number));
                        Ok(scene.scene_number)
                    }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(
            log.into_inner(),
            vec!["start 1", "end 1", "start 2", "end 2", "start 3", "end 3"]
        );
    }

    #[tokio::test]
    async fn best_effort_keeps_going_after_a_failure() {
        let mut stored = Vec::new();
        let batch = BatchOrchestrator::new(BatchKind::Image, FailurePolicy::BestEffort);

        let run = batch
            .run(
                &scenes(3),
                |_| false,
                |scene| async move {
                    if scene.scene_number == 2 {
                        Err(PipelineError::generation("safety filter"))
                    } else {
                        Ok(scene.scene_number * 10)
                    }
                },
                |n, status| {
                    if let ItemStatus::Done(value) = status {
                        stored.push((n, *value));
                    }
                },
            )
            .await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.completed(), vec![1, 3]);
        assert_eq!(run.failures(), vec![2]);
        assert_eq!(stored, vec![(1, 10), (3, 30)]);
        assert_eq!(run.first_failure().map(|(n, _)| n), Some(2));
    }

    #[tokio::test]
    async fn abort_policy_leaves_later_scenes_untouched() {
        let mut attempted = Vec::new();
        let mut stored = Vec::new();
        let batch = BatchOrchestrator::new(BatchKind::Video, FailurePolicy::AbortOnFirstFailure);

        let run = batch
            .run(
                &scenes(3),
                |_| false,
                |scene| {
                    attempted.push(scene.scene_number);
                    async move {
                        if scene.scene_number == 2 {
                            Err(PipelineError::generation("no link"))
                        } else {
                            Ok(())
                        }
                    }
                },
                |n, status| {
                    if matches!(status, ItemStatus::Done(_)) {
                        stored.push(n);
                    }
                },
            )
            .await;

        assert!(run.is_aborted());
        assert_eq!(attempted, vec![1, 2]);
        assert_eq!(stored, vec![1]);
        assert_eq!(run.pending(), vec![3]);
        assert!(!run.was_cancelled());
    }

    #[tokio::test]
    async fn already_done_items_are_skipped() {
        let mut attempted = Vec::new();
        let batch = BatchOrchestrator::new(BatchKind::Narration, FailurePolicy::BestEffort);

        let run = batch
            .run(
                &scenes(3),
                |n| n != 2,
                |scene| {
                    attempted.push(scene.scene_number);
                    async { Ok(()) }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(attempted, vec![2]);
        assert_eq!(run.skipped(), vec![1, 3]);
        assert_eq!(run.completed(), vec![2]);
    }

    #[tokio::test]
    async fn progress_is_reported_per_started_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |p: &Progress| sink.lock().push((p.current, p.total)));

        let batch = BatchOrchestrator::new(BatchKind::Narration, FailurePolicy::BestEffort)
            .with_progress(Some(progress));
        batch
            .run(&scenes(3), |n| n == 1, |_| async { Ok(()) }, |_, _| {})
            .await;

        assert_eq!(*seen.lock(), vec![(2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_rest() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut attempted = Vec::new();

        let batch = BatchOrchestrator::new(BatchKind::Image, FailurePolicy::BestEffort)
            .with_cancel(cancel);
        let run = batch
            .run(
                &scenes(3),
                |_| false,
                |scene| {
                    attempted.push(scene.scene_number);
                    if scene.scene_number == 1 {
                        trigger.cancel();
                    }
                    async { Ok(()) }
                },
                |_, _| {},
            )
            .await;

        assert!(run.is_aborted());
        assert!(run.was_cancelled());
        assert_eq!(attempted, vec![1]);
        assert_eq!(run.status(1), Some(&ItemStatus::Failed("cancelled".to_string())));
        assert_eq!(run.pending(), vec![2, 3]);
    }
}
