//! Task scheduling and library assembly.
//!
//! The planner collects every task up front, runs them on a bounded pool
//! of worker threads, and merges each task's partial `cell` group into the
//! library. Tasks are independent by construction: no two tasks write the
//! same table point, so merge order does not affect the assembled library.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use liberty::Group;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::procedures::{Task, TaskCtx};

/// Runs characterization tasks and folds their results into the library.
pub struct Planner {
    jobs: usize,
    omit_on_failure: bool,
}

impl Planner {
    /// Creates a planner running at most `jobs` tasks concurrently.
    pub fn new(jobs: usize, omit_on_failure: bool) -> Self {
        Self {
            jobs: jobs.max(1),
            omit_on_failure,
        }
    }

    /// Runs every task to completion and merges the partial cell groups
    /// into `library`.
    ///
    /// When `omit_on_failure` is set, a failed task is logged and its
    /// results are dropped while the rest of the run proceeds. Otherwise
    /// the first failure cancels outstanding tasks, in-flight simulations
    /// are drained, and that failure is returned.
    pub fn execute(&self, tasks: Vec<Task>, library: &mut Group) -> Result<()> {
        let total = tasks.len();
        info!(tasks = total, jobs = self.jobs, "starting characterization");
        let cancel = Arc::new(AtomicBool::new(false));
        let (task_tx, task_rx) = unbounded::<Task>();
        let (result_tx, result_rx) = unbounded::<Result<Group>>();
        for task in tasks {
            // Unbounded send: cannot block or fail while task_rx is live.
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let mut first_failure = None;
        std::thread::scope(|scope| {
            for _ in 0..self.jobs {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let ctx = TaskCtx {
                    cancel: cancel.clone(),
                };
                scope.spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        if ctx.cancel.load(Ordering::Relaxed) {
                            // Drain the queue without running.
                            continue;
                        }
                        if result_tx.send(task.execute(&ctx)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            let mut done = 0usize;
            while let Ok(result) = result_rx.recv() {
                match result {
                    Ok(group) => {
                        done += 1;
                        debug!(done, total, "task finished");
                        library.add_item(group);
                    }
                    Err(error) if self.omit_on_failure => {
                        warn!(%error, "task failed; omitting its results");
                    }
                    Err(error) if first_failure.is_none() => {
                        cancel.store(true, Ordering::Relaxed);
                        first_failure = Some(error);
                    }
                    Err(error) => {
                        // Follow-on failures of cancelled in-flight tasks.
                        debug!(%error, "task failed after cancellation");
                    }
                }
            }
        });
        match first_failure {
            Some(error) => Err(error),
            None => {
                info!(tasks = total, "characterization complete");
                Ok(())
            }
        }
    }
}

/// Places every table template referenced by the library's cells at the
/// front of the library group, ahead of the cell definitions.
pub fn attach_templates(library: &mut Group) {
    let templates = library.referenced_templates();
    library.prepend_items(templates.into_iter().map(Into::into));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::error::Error;

    fn cell_task(name: &str, pin: &str) -> Task {
        let cell = arcstr::ArcStr::from(name);
        let pin = arcstr::ArcStr::from(pin);
        Task::new(cell.clone(), "test", pin.to_string(), move |_| {
            let mut group = Group::with_identifier("cell", cell.clone())?;
            group.add_group(Group::with_identifier("pin", pin.clone())?);
            Ok(group)
        })
    }

    fn failing_task(name: &str) -> Task {
        Task::new(
            arcstr::ArcStr::from(name),
            "test",
            "boom".to_string(),
            |_| Err(Error::Internal("injected failure".to_string())),
        )
    }

    #[test]
    fn results_merge_into_one_cell_group() {
        let mut library = Group::with_identifier("library", "lib").unwrap();
        let tasks = vec![cell_task("INVX1", "A"), cell_task("INVX1", "Y")];
        Planner::new(2, false).execute(tasks, &mut library).unwrap();
        let cell = library.sub_group("cell", Some("INVX1")).unwrap();
        assert!(cell.sub_group("pin", Some("A")).is_some());
        assert!(cell.sub_group("pin", Some("Y")).is_some());
        assert_eq!(library.sub_groups().count(), 1);
    }

    #[test]
    fn first_failure_wins_and_cancels_in_flight_tasks() {
        // The late task behaves like a simulation honoring cancellation:
        // it waits for the flag, then reports its own abort.
        let late = Task::new(
            arcstr::ArcStr::from("BUFX1"),
            "test",
            "late".to_string(),
            move |ctx| {
                while !ctx.cancel.load(Ordering::Relaxed) {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Err(Error::Internal("aborted".to_string()))
            },
        );
        let mut library = Group::with_identifier("library", "lib").unwrap();
        let result =
            Planner::new(2, false).execute(vec![failing_task("INVX1"), late], &mut library);
        match result.unwrap_err() {
            Error::ProcedureFailed { variation, .. } => assert_eq!(variation, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn omitted_failures_keep_the_run_alive() {
        let mut library = Group::with_identifier("library", "lib").unwrap();
        let tasks = vec![failing_task("INVX1"), cell_task("BUFX1", "A")];
        Planner::new(1, true).execute(tasks, &mut library).unwrap();
        assert!(library.sub_group("cell", Some("INVX1")).is_none());
        assert!(library.sub_group("cell", Some("BUFX1")).is_some());
    }
}
