//! Determinate progress reporting for long runs.

use tracing::{debug, info};

/// Handle of a task registered with a [`Progress`] sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(usize);

/// Receives progress updates. Totals are declared before any work starts.
pub trait Progress {
    /// Registers a task with a known total.
    fn add_task(&mut self, description: &str, total: u64) -> TaskId;

    /// Changes the description shown for a task.
    fn set_description(&mut self, task: TaskId, description: &str);

    /// Advances a task by `delta` units.
    fn advance(&mut self, task: TaskId, delta: u64);

    /// Marks a task complete.
    fn finish(&mut self, task: TaskId, description: &str);
}

#[derive(Debug, Clone)]
struct TaskState {
    description: String,
    total: u64,
    done: u64,
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress {
    tasks: Vec<TaskState>,
}

impl LogProgress {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn task(&mut self, task: TaskId) -> Option<&mut TaskState> {
        self.tasks.get_mut(task.0)
    }
}

impl Progress for LogProgress {
    fn add_task(&mut self, description: &str, total: u64) -> TaskId {
        self.tasks.push(TaskState {
            description: description.to_string(),
            total,
            done: 0,
        });
        debug!("{description} (0/{total})");
        TaskId(self.tasks.len() - 1)
    }

    fn set_description(&mut self, task: TaskId, description: &str) {
        if let Some(state) = self.task(task) {
            state.description = description.to_string();
            info!("{} ({}/{})", state.description, state.done, state.total);
        }
    }

    fn advance(&mut self, task: TaskId, delta: u64) {
        if let Some(state) = self.task(task) {
            state.done = (state.done + delta).min(state.total);
            debug!("{} ({}/{})", state.description, state.done, state.total);
        }
    }

    fn finish(&mut self, task: TaskId, description: &str) {
        if let Some(state) = self.task(task) {
            state.done = state.total;
            state.description = description.to_string();
            info!("✓ {description}");
        }
    }
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn add_task(&mut self, _description: &str, _total: u64) -> TaskId {
        TaskId(0)
    }

    fn set_description(&mut self, _task: TaskId, _description: &str) {}

    fn advance(&mut self, _task: TaskId, _delta: u64) {}

    fn finish(&mut self, _task: TaskId, _description: &str) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every update for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProgress {
        pub(crate) totals: Vec<(String, u64)>,
        pub(crate) advanced: Vec<(usize, u64)>,
        pub(crate) descriptions: Vec<String>,
        pub(crate) finished: Vec<usize>,
    }

    impl Progress for RecordingProgress {
        fn add_task(&mut self, description: &str, total: u64) -> TaskId {
            self.totals.push((description.to_string(), total));
            TaskId(self.totals.len() - 1)
        }

        fn set_description(&mut self, _task: TaskId, description: &str) {
            self.descriptions.push(description.to_string());
        }

        fn advance(&mut self, task: TaskId, delta: u64) {
            self.advanced.push((task.0, delta));
        }

        fn finish(&mut self, task: TaskId, _description: &str) {
            self.finished.push(task.0);
        }
    }

    impl RecordingProgress {
        pub(crate) fn total_advanced(&self, task: usize) -> u64 {
            self.advanced
                .iter()
                .filter(|(t, _)| *t == task)
                .map(|(_, d)| d)
                .sum()
        }
    }

    #[test]
    fn test_log_progress_clamps_to_total() {
        let mut progress = LogProgress::new();
        let task = progress.add_task("Processing", 2);
        progress.advance(task, 1);
        progress.advance(task, 5);
        assert_eq!(progress.tasks[0].done, 2);

        progress.finish(task, "Done");
        assert_eq!(progress.tasks[0].description, "Done");
    }

    #[test]
    fn test_unknown_task_is_ignored() {
        let mut progress = LogProgress::new();
        progress.advance(TaskId(3), 1);
        assert!(progress.tasks.is_empty());
    }
}
