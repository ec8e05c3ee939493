//! Supervisor actor owning the worker pool lifecycle.

use std::marker::PhantomData;

use db::JobStore;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::SupervisorMessage;
use crate::pool::WorkerPool;

/// Lifecycle controller for one worker pool.
///
/// Start and stop requests arrive as messages, so they are serialized: a
/// `Start` sent while a `Stop` is still joining workers waits its turn
/// instead of racing it.
pub(crate) struct Supervisor<S>(PhantomData<fn() -> S>);

impl<S> Default for Supervisor<S> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<S: JobStore> Actor for Supervisor<S> {
    type Msg = SupervisorMessage;
    type State = WorkerPool<S>;
    type Arguments = WorkerPool<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        pool: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");
        Ok(pool)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        pool: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Start { processor, reply } => {
                let started = pool.start(processor);
                let _ = reply.send(started);
            }

            SupervisorMessage::Stop { reply } => {
                let stopped = pool.stop().await;
                let _ = reply.send(stopped);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        pool: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Workers never outlive their supervisor.
        pool.stop().await;
        tracing::info!("Job queue supervisor stopped");
        Ok(())
    }
}

/// Spawn an unnamed supervisor for `pool`.
pub(crate) async fn start_supervisor<S: JobStore>(
    pool: WorkerPool<S>,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor::<S>::default(), pool).await
}
