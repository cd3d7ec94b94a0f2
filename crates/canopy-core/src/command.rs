//! Engine commands: edits submitted while the scheduler owns the engine.
//!
//! The scheduler loop holds the only `&mut Engine` for as long as it runs.
//! Everything else reaches the engine through an [`EngineHandle`], which
//! sends an [`EngineCommand`] over a bounded channel and waits for the
//! reply. The loop applies commands between ticks, so the engine keeps a
//! single writer and an edit never lands in the middle of a sweep.

use std::sync::Arc;

use canopy_topology::Topology;
use canopy_types::{
    CultivationSession, CultivationSpace, Phase, Plant, PlantId, PlantVariety, SessionId, SpaceId,
    VarietyId,
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::alerts::{Alert, AlertSink};
use crate::engine::{Engine, EngineError, TickSummary};
use crate::transfer::PlantTransfer;

type Reply<T> = oneshot::Sender<T>;

/// A request to the engine. Each variant mirrors the [`Engine`] method of
/// the same name and answers on `reply`.
#[derive(Debug)]
pub enum EngineCommand {
    /// [`Engine::insert_space`].
    InsertSpace {
        /// The new space.
        space: CultivationSpace,
        /// Outcome.
        reply: Reply<Result<(), EngineError>>,
    },

    /// [`Engine::update_plant`].
    UpdatePlant {
        /// The replacement plant.
        plant: Plant,
        /// Outcome.
        reply: Reply<Result<(), EngineError>>,
    },

    /// [`Engine::update_plant_batch`].
    UpdatePlantBatch {
        /// The replacement plants.
        plants: Vec<Plant>,
        /// Outcome.
        reply: Reply<Result<(), EngineError>>,
    },

    /// [`Engine::update_plant_state`].
    UpdatePlantState {
        /// The plant.
        plant: PlantId,
        /// Phase to set.
        state: Phase,
        /// Edit time.
        now: DateTime<Utc>,
        /// Outcome.
        reply: Reply<Result<(), EngineError>>,
    },

    /// [`Engine::update_plants_batch_state`].
    UpdatePlantsBatchState {
        /// The plants.
        plants: Vec<PlantId>,
        /// Phase to set.
        state: Phase,
        /// Edit time.
        now: DateTime<Utc>,
        /// Outcome.
        reply: Reply<Result<(), EngineError>>,
    },

    /// [`Engine::add_row`].
    AddRow {
        /// Space to extend.
        space: SpaceId,
        /// Variety of the new plants.
        variety: VarietyId,
        /// Creation time.
        now: DateTime<Utc>,
        /// Ids of the plants created.
        reply: Reply<Result<Vec<PlantId>, EngineError>>,
    },

    /// [`Engine::delete_row`].
    DeleteRow {
        /// Space to shrink.
        space: SpaceId,
        /// Row number to remove.
        row: u32,
        /// Ids of the plants removed.
        reply: Reply<Result<Vec<PlantId>, EngineError>>,
    },

    /// [`Engine::transfer_plant_to_flowering`].
    TransferToFlowering {
        /// The plant.
        plant: PlantId,
        /// Flowering space to move it to.
        target: SpaceId,
        /// Transfer time.
        now: DateTime<Utc>,
        /// The relocation performed.
        reply: Reply<Result<PlantTransfer, EngineError>>,
    },

    /// [`Engine::update_variety`].
    UpdateVariety {
        /// The edited variety.
        variety: PlantVariety,
        /// Edit time.
        now: DateTime<Utc>,
        /// Plants updated.
        reply: Reply<usize>,
    },

    /// [`Engine::refresh_catalog`].
    RefreshCatalog {
        /// The full variety list.
        varieties: Vec<PlantVariety>,
        /// Refresh time.
        now: DateTime<Utc>,
        /// Plants updated.
        reply: Reply<usize>,
    },

    /// [`Engine::set_current_session`].
    SetCurrentSession {
        /// The session to anchor on.
        session: CultivationSession,
        /// Tick time.
        now: DateTime<Utc>,
        /// The eager tick's summary.
        reply: Reply<Result<TickSummary, EngineError>>,
    },

    /// [`Engine::clear_session_if`].
    ClearSessionIf {
        /// Session to clear if it is current.
        id: SessionId,
        /// The session cleared, if any.
        reply: Reply<Option<CultivationSession>>,
    },

    /// The current session.
    CurrentSession {
        /// A copy of the current session.
        reply: Reply<Option<CultivationSession>>,
    },

    /// [`Engine::snapshot`].
    Snapshot {
        /// The published snapshot.
        reply: Reply<Arc<Topology>>,
    },

    /// Deliver an alert to the engine's sink.
    RaiseAlert {
        /// The alert.
        alert: Alert,
    },
}

impl EngineCommand {
    /// Apply the command to `engine` and send the reply. A caller that
    /// stopped waiting is ignored.
    pub fn apply<A: AlertSink>(self, engine: &mut Engine<A>) {
        let delivered = match self {
            Self::InsertSpace { space, reply } => reply.send(engine.insert_space(space)).is_ok(),
            Self::UpdatePlant { plant, reply } => reply.send(engine.update_plant(plant)).is_ok(),
            Self::UpdatePlantBatch { plants, reply } => {
                reply.send(engine.update_plant_batch(plants)).is_ok()
            }
            Self::UpdatePlantState {
                plant,
                state,
                now,
                reply,
            } => reply
                .send(engine.update_plant_state(plant, state, now))
                .is_ok(),
            Self::UpdatePlantsBatchState {
                plants,
                state,
                now,
                reply,
            } => reply
                .send(engine.update_plants_batch_state(&plants, state, now))
                .is_ok(),
            Self::AddRow {
                space,
                variety,
                now,
                reply,
            } => reply.send(engine.add_row(space, variety, now)).is_ok(),
            Self::DeleteRow { space, row, reply } => {
                reply.send(engine.delete_row(space, row)).is_ok()
            }
            Self::TransferToFlowering {
                plant,
                target,
                now,
                reply,
            } => reply
                .send(engine.transfer_plant_to_flowering(plant, target, now))
                .is_ok(),
            Self::UpdateVariety {
                variety,
                now,
                reply,
            } => reply.send(engine.update_variety(variety, now)).is_ok(),
            Self::RefreshCatalog {
                varieties,
                now,
                reply,
            } => reply.send(engine.refresh_catalog(varieties, now)).is_ok(),
            Self::SetCurrentSession {
                session,
                now,
                reply,
            } => reply.send(engine.set_current_session(session, now)).is_ok(),
            Self::ClearSessionIf { id, reply } => reply.send(engine.clear_session_if(id)).is_ok(),
            Self::CurrentSession { reply } => {
                reply.send(engine.clock().current().cloned()).is_ok()
            }
            Self::Snapshot { reply } => reply.send(engine.snapshot()).is_ok(),
            Self::RaiseAlert { alert } => {
                engine.sink_mut().notify(alert);
                true
            }
        };
        if !delivered {
            debug!("Engine command reply dropped, caller no longer waiting");
        }
    }
}

/// Cloneable handle to an engine owned by the running scheduler.
///
/// Every method waits until the scheduler has applied the command. Once
/// the scheduler has stopped, every method returns [`EngineError::Stopped`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    /// Command queue drained by the scheduler.
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// A handle and the receiver to pass to
    /// [`run_scheduler`](crate::runner::run_scheduler). A zero capacity is
    /// raised to one.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_closed| EngineError::Stopped)?;
        response.await.map_err(|_dropped| EngineError::Stopped)
    }

    /// See [`Engine::insert_space`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn insert_space(&self, space: CultivationSpace) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::InsertSpace { space, reply })
            .await?
    }

    /// See [`Engine::update_plant`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn update_plant(&self, plant: Plant) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::UpdatePlant { plant, reply })
            .await?
    }

    /// See [`Engine::update_plant_batch`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn update_plant_batch(&self, plants: Vec<Plant>) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::UpdatePlantBatch { plants, reply })
            .await?
    }

    /// See [`Engine::update_plant_state`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn update_plant_state(
        &self,
        plant: PlantId,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::UpdatePlantState {
            plant,
            state,
            now,
            reply,
        })
        .await?
    }

    /// See [`Engine::update_plants_batch_state`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn update_plants_batch_state(
        &self,
        plants: Vec<PlantId>,
        state: Phase,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.request(|reply| EngineCommand::UpdatePlantsBatchState {
            plants,
            state,
            now,
            reply,
        })
        .await?
    }

    /// See [`Engine::add_row`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn add_row(
        &self,
        space: SpaceId,
        variety: VarietyId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PlantId>, EngineError> {
        self.request(|reply| EngineCommand::AddRow {
            space,
            variety,
            now,
            reply,
        })
        .await?
    }

    /// See [`Engine::delete_row`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn delete_row(&self, space: SpaceId, row: u32) -> Result<Vec<PlantId>, EngineError> {
        self.request(|reply| EngineCommand::DeleteRow { space, row, reply })
            .await?
    }

    /// See [`Engine::transfer_plant_to_flowering`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn transfer_plant_to_flowering(
        &self,
        plant: PlantId,
        target: SpaceId,
        now: DateTime<Utc>,
    ) -> Result<PlantTransfer, EngineError> {
        self.request(|reply| EngineCommand::TransferToFlowering {
            plant,
            target,
            now,
            reply,
        })
        .await?
    }

    /// See [`Engine::update_variety`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn update_variety(
        &self,
        variety: PlantVariety,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        self.request(|reply| EngineCommand::UpdateVariety {
            variety,
            now,
            reply,
        })
        .await
    }

    /// See [`Engine::refresh_catalog`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn refresh_catalog(
        &self,
        varieties: Vec<PlantVariety>,
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        self.request(|reply| EngineCommand::RefreshCatalog {
            varieties,
            now,
            reply,
        })
        .await
    }

    /// See [`Engine::set_current_session`].
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or [`EngineError::Stopped`].
    pub async fn set_current_session(
        &self,
        session: CultivationSession,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, EngineError> {
        self.request(|reply| EngineCommand::SetCurrentSession {
            session,
            now,
            reply,
        })
        .await?
    }

    /// See [`Engine::clear_session_if`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn clear_session_if(
        &self,
        id: SessionId,
    ) -> Result<Option<CultivationSession>, EngineError> {
        self.request(|reply| EngineCommand::ClearSessionIf { id, reply })
            .await
    }

    /// A copy of the current session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn current_session(&self) -> Result<Option<CultivationSession>, EngineError> {
        self.request(|reply| EngineCommand::CurrentSession { reply })
            .await
    }

    /// The published topology snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn snapshot(&self) -> Result<Arc<Topology>, EngineError> {
        self.request(|reply| EngineCommand::Snapshot { reply }).await
    }

    /// Deliver an alert to the engine's sink.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Stopped`] if the scheduler has stopped.
    pub async fn raise_alert(&self, alert: Alert) -> Result<(), EngineError> {
        self.tx
            .send(EngineCommand::RaiseAlert { alert })
            .await
            .map_err(|_closed| EngineError::Stopped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use canopy_types::RoomType;
    use chrono::TimeZone;

    use super::*;
    use crate::alerts::{AlertStore, AlertType};
    use crate::catalog::VarietyCatalog;

    fn variety() -> PlantVariety {
        PlantVariety {
            id: VarietyId(1),
            name: "V".to_owned(),
            color: "#118833".to_owned(),
            germination_time: Some(5),
            growth_time: Some(25),
            flowering_time: Some(60),
            dry_weight: None,
        }
    }

    fn engine() -> Engine<AlertStore> {
        let mut topology = Topology::new();
        topology
            .insert_space(CultivationSpace::new(SpaceId(1), "Veg", RoomType::Growth, 2))
            .unwrap();
        Engine::new(
            topology,
            VarietyCatalog::from_varieties([variety()]),
            AlertStore::default(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    /// Applies every queued command until all handles are gone.
    async fn serve(engine: &mut Engine<AlertStore>, mut rx: mpsc::Receiver<EngineCommand>) {
        while let Some(command) = rx.recv().await {
            command.apply(engine);
        }
    }

    #[tokio::test]
    async fn commands_reach_the_engine() {
        let mut engine = engine();
        let (handle, rx) = EngineHandle::channel(4);

        let client = async move {
            let created = handle.add_row(SpaceId(1), VarietyId(1), now()).await.unwrap();
            assert_eq!(created.len(), 2);
            let id = *created.first().unwrap();
            handle
                .update_plant_state(id, Phase::Drying, now())
                .await
                .unwrap();
            assert_eq!(
                handle.add_row(SpaceId(1), VarietyId(9), now()).await,
                Err(EngineError::UnknownVariety(VarietyId(9)))
            );
            handle
                .raise_alert(Alert::new(AlertType::Info, "hello"))
                .await
                .unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            assert_eq!(snapshot.get_plant_by_id(id).unwrap().state, Phase::Drying);
        };
        tokio::join!(serve(&mut engine, rx), client);

        assert_eq!(engine.snapshot().plant_count(), 2);
        assert_eq!(engine.sink().by_type(AlertType::Info).len(), 1);
    }

    #[tokio::test]
    async fn stopped_engine_reports_stopped() {
        let (handle, rx) = EngineHandle::channel(0);
        drop(rx);
        assert_eq!(handle.snapshot().await.err(), Some(EngineError::Stopped));
        assert_eq!(
            handle.delete_row(SpaceId(1), 1).await,
            Err(EngineError::Stopped)
        );
    }
}
