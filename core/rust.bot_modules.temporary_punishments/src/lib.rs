pub mod tasks;

use futures_util::future::FutureExt;

/// How often the expiry sweep runs. Fixed cadence; a punishment lapsing
/// mid-cycle is picked up on the next tick.
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

pub fn task() -> tribunal::taskman::Task {
    tribunal::taskman::Task {
        name: "Temporary Punishment Task",
        description: "Handle expired punishments",
        duration: SWEEP_INTERVAL,
        enabled: true,
        run: Box::new(move |data| tasks::temporary_punishment_task(data).boxed()),
    }
}
