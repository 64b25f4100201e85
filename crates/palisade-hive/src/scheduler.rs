//! # Scheduler
//!
//! Named periodic tasks with per-task enable flags and run counters. A
//! single worker thread wakes every second, runs whatever is due, and
//! observes the running flag so shutdown completes within one tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::hive::now_secs;
use crate::{HiveError, Result};

/// Task table capacity.
pub const MAX_TASKS: usize = 50;

type TaskFn = Box<dyn FnMut() + Send>;

struct Task {
    id: u32,
    name: String,
    callback: TaskFn,
    interval_secs: u64,
    next_run: u64,
    last_run: u64,
    enabled: bool,
    run_count: u64,
}

/// Snapshot of one task's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u32,
    pub name: String,
    pub interval_secs: u64,
    pub enabled: bool,
    pub run_count: u64,
    pub last_run: u64,
}

/// The periodic task scheduler.
pub struct Scheduler {
    tasks: Arc<Mutex<Vec<Task>>>,
    next_id: Mutex<u32>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(1),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Register a task. Fails with `Exhausted` when the table is full.
    pub fn add_task(
        &self,
        name: &str,
        interval_secs: u64,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<u32> {
        if interval_secs == 0 {
            return Err(HiveError::InvalidInput("interval must be non-zero".into()));
        }
        let mut tasks = self.tasks.lock().expect("task lock");
        if tasks.len() >= MAX_TASKS {
            return Err(HiveError::Exhausted("task table".into()));
        }
        let mut next_id = self.next_id.lock().expect("id lock");
        let id = *next_id;
        *next_id += 1;
        tasks.push(Task {
            id,
            name: name.to_string(),
            callback: Box::new(callback),
            interval_secs,
            next_run: now_secs() + interval_secs,
            last_run: 0,
            enabled: true,
            run_count: 0,
        });
        tracing::debug!(task = name, id, interval = interval_secs, "task registered");
        Ok(id)
    }

    /// Enable or disable a task by id.
    pub fn set_enabled(&self, task_id: u32, enabled: bool) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task lock");
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.enabled = enabled;
                Ok(())
            }
            None => Err(HiveError::NotFound(format!("task {task_id}"))),
        }
    }

    /// Run every due task once; returns how many ran. The worker thread
    /// calls this each second, and tests call it directly.
    pub fn run_due(&self) -> usize {
        let now = now_secs();
        let mut ran = 0;
        let mut tasks = self.tasks.lock().expect("task lock");
        for task in tasks.iter_mut() {
            if !task.enabled || now < task.next_run {
                continue;
            }
            (task.callback)();
            task.run_count += 1;
            task.last_run = now;
            task.next_run = now + task.interval_secs;
            ran += 1;
        }
        ran
    }

    /// Force-run one task by id regardless of its schedule.
    pub fn run_now(&self, task_id: u32) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task lock");
        match tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                (task.callback)();
                task.run_count += 1;
                task.last_run = now_secs();
                Ok(())
            }
            None => Err(HiveError::NotFound(format!("task {task_id}"))),
        }
    }

    /// Start the worker thread.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = Arc::clone(&self.tasks);
        let running = Arc::clone(&self.running);
        let handle = std::thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || {
                tracing::info!("scheduler started");
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_secs(1));
                    let now = now_secs();
                    let mut tasks = tasks.lock().expect("task lock");
                    for task in tasks.iter_mut() {
                        if !task.enabled || now < task.next_run {
                            continue;
                        }
                        (task.callback)();
                        task.run_count += 1;
                        task.last_run = now;
                        task.next_run = now + task.interval_secs;
                    }
                }
                tracing::info!("scheduler stopped");
            })
            .expect("spawn scheduler");
        *self.handle.lock().expect("handle lock") = Some(handle);
    }

    /// Clear the running flag and join the worker; returns within one
    /// tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("handle lock").take() {
            let _ = handle.join();
        }
    }

    /// Bookkeeping snapshot for every task.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .lock()
            .expect("task lock")
            .iter()
            .map(|t| TaskInfo {
                id: t.id,
                name: t.name.clone(),
                interval_secs: t.interval_secs,
                enabled: t.enabled,
                run_count: t.run_count,
                last_run: t.last_run,
            })
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
