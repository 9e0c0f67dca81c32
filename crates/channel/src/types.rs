//! Control channel event names (the orchestrator contract)

/// out: `{workerId, host}` on every (re)connection
pub const EVENT_ANNOUNCE: &str = "worker.announce";

/// in, acknowledged with `{cpu, tasks}`
pub const EVENT_STATS: &str = "worker.stats";

/// in: `{taskId, payload: {args, cwd, env}}`
pub const EVENT_TASK_REQUEST: &str = "worker.task.request";

/// out: `{taskId, status, result?, exitCode?, error?}`
pub const EVENT_TASK_UPDATE: &str = "worker.task.update";

/// in: `{taskId}`
pub const EVENT_TASK_KILL: &str = "worker.task.kill";
