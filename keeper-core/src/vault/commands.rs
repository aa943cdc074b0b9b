//! Typed command channel between the presentation layer and the service.
//!
//! The UI holds a [`KeeperHandle`] and never calls into the engine
//! directly; a [`CommandDispatcher`] task owns the service side. Replica
//! changes flow back as [`SyncEvent`]s.

use crate::record::Record;
use crate::sync::SyncEvent;
use crate::vault::RecordService;
use crate::{KeeperError, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

type Reply<T> = oneshot::Sender<Result<T>>;

/// A request from the presentation layer.
#[derive(Debug)]
pub enum Command {
    Create { record: Record, reply: Reply<Record> },
    Update { record: Record, reply: Reply<Record> },
    Delete { ids: Vec<Uuid>, reply: Reply<()> },
    Read { ids: Vec<Uuid>, reply: Reply<Vec<Record>> },
    ReadOne { id: Uuid, reply: Reply<Record> },
    Initialize { reply: Reply<Vec<Record>> },
    SyncToRemote { reply: Reply<Vec<Record>> },
    SyncFromRemote { reply: Reply<usize> },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Read { .. } => "read",
            Self::ReadOne { .. } => "read_one",
            Self::Initialize { .. } => "initialize",
            Self::SyncToRemote { .. } => "sync_to_remote",
            Self::SyncFromRemote { .. } => "sync_from_remote",
        }
    }
}

/// Consumes commands and runs them against the record service.
///
/// Local commands run inline in arrival order. Commands that reach the
/// remote run on their own tasks so a slow call never blocks local reads
/// and writes.
pub struct CommandDispatcher {
    service: Arc<RecordService>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
}

impl CommandDispatcher {
    /// Create a dispatcher and the first handle feeding it.
    pub fn new(
        service: Arc<RecordService>,
        cancel: CancellationToken,
        buffer: usize,
    ) -> (Self, KeeperHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = KeeperHandle {
            commands: tx,
            events: service.engine().events(),
        };
        let dispatcher = Self {
            service,
            commands: rx,
            cancel,
        };
        (dispatcher, handle)
    }

    /// Serve until every handle is dropped or the token fires.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.commands.recv() => match next {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
            }
        }
        debug!("Command dispatcher stopped");
    }

    fn dispatch(&self, command: Command) {
        debug!(command = command.name(), "Dispatching command");
        let service = &self.service;

        match command {
            Command::Create { record, reply } => respond(reply, service.create(record)),
            Command::Update { record, reply } => respond(reply, service.update(record)),
            Command::Read { ids, reply } => respond(reply, service.read(&ids)),
            Command::ReadOne { id, reply } => respond(reply, service.read_one(id)),
            Command::Delete { ids, reply } => {
                let (service, cancel) = (service.clone(), self.cancel.clone());
                tokio::spawn(async move {
                    respond(reply, service.delete(&ids, &cancel).await);
                });
            }
            Command::Initialize { reply } => {
                let (service, cancel) = (service.clone(), self.cancel.clone());
                tokio::spawn(async move {
                    respond(reply, service.initialize(&cancel).await);
                });
            }
            Command::SyncToRemote { reply } => {
                let (service, cancel) = (service.clone(), self.cancel.clone());
                tokio::spawn(async move {
                    respond(reply, service.sync_to_remote(&cancel).await);
                });
            }
            Command::SyncFromRemote { reply } => {
                let (service, cancel) = (service.clone(), self.cancel.clone());
                tokio::spawn(async move {
                    respond(reply, service.sync_from_remote(&cancel).await);
                });
            }
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        debug!("Command caller went away before the reply");
    }
}

/// Cloneable client side of the command channel.
#[derive(Clone)]
pub struct KeeperHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SyncEvent>,
}

impl KeeperHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| KeeperError::ShuttingDown)?;
        rx.await.map_err(|_| KeeperError::ShuttingDown)?
    }

    pub async fn create(&self, record: Record) -> Result<Record> {
        self.request(|reply| Command::Create { record, reply }).await
    }

    pub async fn update(&self, record: Record) -> Result<Record> {
        self.request(|reply| Command::Update { record, reply }).await
    }

    pub async fn delete(&self, ids: Vec<Uuid>) -> Result<()> {
        self.request(|reply| Command::Delete { ids, reply }).await
    }

    pub async fn read(&self, ids: Vec<Uuid>) -> Result<Vec<Record>> {
        self.request(|reply| Command::Read { ids, reply }).await
    }

    pub async fn read_one(&self, id: Uuid) -> Result<Record> {
        self.request(|reply| Command::ReadOne { id, reply }).await
    }

    pub async fn initialize(&self) -> Result<Vec<Record>> {
        self.request(|reply| Command::Initialize { reply }).await
    }

    pub async fn sync_to_remote(&self) -> Result<Vec<Record>> {
        self.request(|reply| Command::SyncToRemote { reply }).await
    }

    pub async fn sync_from_remote(&self) -> Result<usize> {
        self.request(|reply| Command::SyncFromRemote { reply }).await
    }

    /// Replica-changed notifications for re-rendering.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }
}
