// Control Channel Port (outbound half)

use crate::domain::TaskUpdate;

/// Outbound side of the orchestrator connection
///
/// Fire-and-forget: delivery is best effort and never reported back.
pub trait ControlChannel: Send + Sync {
    fn emit_update(&self, update: TaskUpdate);
}

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every update in emission order
    #[derive(Clone, Default)]
    pub struct RecordingChannel {
        updates: Arc<Mutex<Vec<TaskUpdate>>>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn updates(&self) -> Vec<TaskUpdate> {
            self.updates.lock().unwrap().clone()
        }

        pub fn updates_for(&self, task_id: &str) -> Vec<TaskUpdate> {
            self.updates()
                .into_iter()
                .filter(|u| u.task_id == task_id)
                .collect()
        }
    }

    impl ControlChannel for RecordingChannel {
        fn emit_update(&self, update: TaskUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }
}
