//! The relocation dispatcher.
//!
//! One entry surface over both regimes. Cooperative hosts own all state on
//! the calling thread, so the move happens inline. Region-sharded hosts
//! schedule a synchronous entity-affine task at the minimum one-tick delay;
//! the task body performs the move on whichever thread owns the subject's
//! region at that tick, and the retired path delivers the loss sentinel.
//! Exactly one of the two fires per accepted request.

use std::sync::Arc;

use parking_lot::Mutex;
use shard_sched::{OwnerId, Regime, SchedulerBuilder, SchedulerError, SchedulerHost};
use shard_world::{Entity, Pose};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{MoveBackend, MoveCapabilities, TeleportRequest};

#[derive(Debug, Error)]
pub enum TeleportError {
    /// The backend does not support the required move capability. Nothing
    /// was moved.
    #[error("relocation not supported by this runtime")]
    Unsupported,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

type Completion = Box<dyn FnOnce(Option<Entity>) + Send>;

/// Dispatches relocation requests for one owner against one host.
pub struct Teleporter {
    host: Arc<dyn SchedulerHost>,
    backend: Arc<dyn MoveBackend>,
    owner: OwnerId,
}

impl Teleporter {
    #[must_use]
    pub fn new(host: Arc<dyn SchedulerHost>, backend: Arc<dyn MoveBackend>, owner: OwnerId) -> Self {
        Self {
            host,
            backend,
            owner,
        }
    }

    /// Dispatch one relocation request.
    ///
    /// Accepting the request guarantees its completion callback fires
    /// exactly once, with `Some(entity)` on success or `None` when the
    /// subject was retired first.
    pub fn teleport(&self, request: TeleportRequest) -> Result<(), TeleportError> {
        self.require(MoveCapabilities::BASIC_MOVE)?;
        match self.host.regime() {
            Regime::Cooperative => {
                self.move_now(request);
                Ok(())
            }
            Regime::RegionSharded => self.schedule_move(request),
        }
    }

    /// Relocate within the subject's current realm.
    ///
    /// A subject already retired has no realm; the request is still
    /// accepted and the callback reports the loss.
    pub fn teleport_within_realm(
        &self,
        subject: Entity,
        pose: Pose,
        on_complete: impl FnOnce(Option<Entity>) + Send + 'static,
    ) -> Result<(), TeleportError> {
        self.require(MoveCapabilities::BASIC_MOVE)?;
        match self.backend.realm_of(subject) {
            Some(realm) => self.teleport(
                TeleportRequest::new(subject, realm, pose).on_complete(on_complete),
            ),
            None => {
                debug!(%subject, "subject retired before relocation");
                on_complete(None);
                Ok(())
            }
        }
    }

    /// Dispatch a relocation from a detached worker.
    ///
    /// Requires the backend to explicitly confirm off-thread moves; there
    /// is no safe default for invoking a move primitive off the owning
    /// thread.
    pub fn teleport_detached(&self, mut request: TeleportRequest) -> Result<(), TeleportError> {
        self.require(MoveCapabilities::BASIC_MOVE | MoveCapabilities::OFF_THREAD_MOVE)?;
        let body = self.move_body(&mut request);
        SchedulerBuilder::new(self.owner, self.host.clone())
            .detached()
            .task(body)
            .run()?;
        Ok(())
    }

    fn require(&self, needed: MoveCapabilities) -> Result<(), TeleportError> {
        if self.backend.capabilities().contains(needed) {
            Ok(())
        } else {
            Err(TeleportError::Unsupported)
        }
    }

    /// Perform the move on the calling thread.
    fn move_now(&self, mut request: TeleportRequest) {
        let mut body = self.move_body(&mut request);
        body();
    }

    /// Schedule the move onto the subject's owning region thread.
    fn schedule_move(&self, mut request: TeleportRequest) -> Result<(), TeleportError> {
        let subject = request.subject;
        let callback = Arc::new(Mutex::new(request.on_complete.take()));
        let lost = callback.clone();
        let body = self.move_body_with(&mut request, callback);
        SchedulerBuilder::new(self.owner, self.host.clone())
            .with_entity(subject)
            .delay_ticks(1)
            .task(body)
            .when_retired(move || {
                if let Some(complete) = lost.lock().take() {
                    complete(None);
                }
            })
            .run()?;
        Ok(())
    }

    fn move_body(&self, request: &mut TeleportRequest) -> impl FnMut() + Send + 'static {
        let callback = Arc::new(Mutex::new(request.on_complete.take()));
        self.move_body_with(request, callback)
    }

    /// Build the closure that moves, optionally resets the camera, and
    /// completes. The shared callback slot makes completion exactly-once
    /// even when a retired path holds the other reference.
    fn move_body_with(
        &self,
        request: &mut TeleportRequest,
        callback: Arc<Mutex<Option<Completion>>>,
    ) -> impl FnMut() + Send + 'static {
        let backend = self.backend.clone();
        let subject = request.subject;
        let destination = request.destination;
        let pose = request.pose;
        let velocity = request.velocity;
        let cause = request.cause;
        let flags = request.flags;
        let reset_camera = request.reset_camera;
        move || {
            let moved = backend.move_entity(subject, destination, pose, velocity, cause, flags);
            if reset_camera && moved.is_some() && backend.is_player(subject) {
                if backend.capabilities().contains(MoveCapabilities::CAMERA_CONTROL) {
                    backend.reset_camera(subject);
                } else {
                    // The move still happened; only the camera flag degrades.
                    warn!(%subject, "camera reset requested without camera control");
                }
            }
            if let Some(complete) = callback.lock().take() {
                complete(moved);
            }
        }
    }
}
