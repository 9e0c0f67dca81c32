// Worker identity (fixed for the process lifetime)

use serde::{Deserialize, Serialize};

use crate::port::IdProvider;

/// worker.announce payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub host: String,
}

impl WorkerIdentity {
    /// Generate a fresh identity for this process
    pub fn generate(id_provider: &dyn IdProvider, host: impl Into<String>) -> Self {
        Self {
            worker_id: id_provider.generate_id(),
            host: host.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequenceIdProvider;

    #[test]
    fn test_announce_payload_shape() {
        let identity = WorkerIdentity::generate(&SequenceIdProvider::new("worker"), "node-a");
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"workerId": "worker-1", "host": "node-a"})
        );
    }
}
