use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::data::Data;

/// A background task run function
pub type TaskRun =
    Box<dyn Send + Sync + for<'a> Fn(&'a Data) -> BoxFuture<'a, Result<(), crate::Error>>>;

/// A periodic background task
pub struct Task {
    /// The name of the task
    pub name: &'static str,
    /// The description of the task
    pub description: &'static str,
    /// How often the task should run
    pub duration: std::time::Duration,
    /// Whether the task is enabled or not
    pub enabled: bool,
    /// The function to run
    pub run: TaskRun,
}

/// Starts all enabled tasks, each ticking on its own interval. Returns
/// once every task has stopped, which under normal operation is never;
/// callers are expected to spawn this.
pub async fn start_all_tasks(tasks: Vec<Task>, data: Arc<Data>) {
    let mut set = tokio::task::JoinSet::new();

    for task in tasks {
        if !task.enabled {
            log::info!("Skipping disabled task: {}", task.name);
            continue;
        }

        set.spawn(run_task(task, data.clone()));
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            log::error!("Error while joining on a background task: {}", e);
        }
    }
}

async fn run_task(task: Task, data: Arc<Data>) {
    log::info!(
        "Starting task: {} ({}), running every {:?}",
        task.name,
        task.description,
        task.duration
    );

    let mut interval = tokio::time::interval(task.duration);

    loop {
        interval.tick().await;

        log::debug!("Running task: {}", task.name);

        if let Err(e) = (task.run)(&data).await {
            log::error!("Task {} failed: {}", task.name, e);
        }
    }
}
