//! Message types for the lifecycle supervisor.

use std::sync::Arc;

use ractor::RpcReplyPort;

use crate::processor::Processor;

/// Messages for the Supervisor.
///
/// The supervisor handles one message at a time, so concurrent start and
/// stop requests are applied in arrival order.
pub(crate) enum SupervisorMessage {
    /// Spawn workers with the given processor. Replies `false` if already running.
    Start {
        processor: Arc<dyn Processor>,
        reply: RpcReplyPort<bool>,
    },

    /// Stop all workers after their current job. Replies `false` if already stopped.
    Stop { reply: RpcReplyPort<bool> },
}

impl std::fmt::Debug for SupervisorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorMessage::Start { processor, .. } => f
                .debug_struct("Start")
                .field("processor", &processor.name())
                .finish(),
            SupervisorMessage::Stop { .. } => f.write_str("Stop"),
        }
    }
}
