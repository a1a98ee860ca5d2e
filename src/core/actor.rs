//! One pipeline per analyzed process, each on its own thread
//!
//! Processes share no analysis state, so they can be analyzed in parallel.
//! A [`ProcessActor`] owns a [`Pipeline`] and consumes its events from a
//! channel; [`ActorSet`] routes a mixed stream to the right actor by process
//! id. Within one actor everything stays single-threaded.

use crate::core::error::EngineError;
use crate::core::host::{Pipeline, PipelineReport};
use crate::core::metadata::StackTraceSnapshot;
use crate::core::types::{CommandId, RecordedEvent};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, unbounded};
use fxhash::FxHashMap;
use std::thread::{self, JoinHandle};
use tracing::error;

enum ActorMessage {
    Event(RecordedEvent),
    Snapshots {
        command_id: CommandId,
        snapshots: Vec<StackTraceSnapshot>,
    },
}

pub struct ProcessActor {
    process_id: u32,
    sender: Sender<ActorMessage>,
    handle: JoinHandle<Result<PipelineReport, EngineError>>,
}

impl ProcessActor {
    /// Start a thread that feeds `pipeline` until the actor is shut down
    pub fn spawn(process_id: u32, mut pipeline: Pipeline) -> Result<Self> {
        let (tx, rx) = unbounded::<ActorMessage>();
        let handle = thread::Builder::new()
            .name(format!("hbtrace-pid-{process_id}"))
            .spawn(move || {
                while let Ok(message) = rx.recv() {
                    match message {
                        ActorMessage::Event(event) => {
                            if let Err(e) = pipeline.process(event) {
                                error!(process_id, "analysis stopped: {e}");
                                return Err(e);
                            }
                        }
                        ActorMessage::Snapshots {
                            command_id,
                            snapshots,
                        } => {
                            pipeline.on_stack_trace_snapshots(process_id, command_id, snapshots);
                        }
                    }
                }
                Ok(pipeline.report())
            })
            .with_context(|| format!("Failed to spawn actor for process {process_id}"))?;

        Ok(ProcessActor {
            process_id,
            sender: tx,
            handle,
        })
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Queue an event; fails once the actor has stopped on an error
    pub fn send(&self, event: RecordedEvent) -> Result<()> {
        self.sender
            .send(ActorMessage::Event(event))
            .map_err(|_| anyhow!("Actor for process {} has stopped", self.process_id))
    }

    pub fn send_snapshots(&self, command_id: CommandId, snapshots: Vec<StackTraceSnapshot>) -> Result<()> {
        self.sender
            .send(ActorMessage::Snapshots {
                command_id,
                snapshots,
            })
            .map_err(|_| anyhow!("Actor for process {} has stopped", self.process_id))
    }

    /// Close the channel, wait for the backlog and return the final report
    pub fn shutdown(self) -> Result<PipelineReport> {
        let ProcessActor {
            process_id,
            sender,
            handle,
        } = self;
        drop(sender);
        let outcome = handle
            .join()
            .map_err(|_| anyhow!("Actor for process {process_id} panicked"))?;
        outcome.with_context(|| format!("Analysis of process {process_id} failed"))
    }
}

/// Routes events to one actor per process, creating actors on demand
pub struct ActorSet {
    factory: Box<dyn Fn(u32) -> Result<Pipeline>>,
    actors: FxHashMap<u32, ProcessActor>,
}

impl ActorSet {
    /// `factory` builds the pipeline for each newly seen process
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(u32) -> Result<Pipeline> + 'static,
    {
        ActorSet {
            factory: Box::new(factory),
            actors: FxHashMap::default(),
        }
    }

    pub fn route(&mut self, event: RecordedEvent) -> Result<()> {
        self.actor(event.metadata.process_id)?.send(event)
    }

    pub fn route_snapshots(
        &mut self,
        process_id: u32,
        command_id: CommandId,
        snapshots: Vec<StackTraceSnapshot>,
    ) -> Result<()> {
        self.actor(process_id)?.send_snapshots(command_id, snapshots)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Stop every actor; reports are sorted by process id
    pub fn shutdown(self) -> Result<Vec<(u32, PipelineReport)>> {
        let mut actors: Vec<_> = self.actors.into_values().collect();
        actors.sort_by_key(ProcessActor::process_id);
        actors
            .into_iter()
            .map(|actor| {
                let process_id = actor.process_id();
                actor.shutdown().map(|report| (process_id, report))
            })
            .collect()
    }

    fn actor(&mut self, process_id: u32) -> Result<&ProcessActor> {
        if !self.actors.contains_key(&process_id) {
            let pipeline = (self.factory)(process_id)?;
            let actor = ProcessActor::spawn(process_id, pipeline)?;
            self.actors.insert(process_id, actor);
        }
        self.actors
            .get(&process_id)
            .ok_or_else(|| anyhow!("No actor for process {process_id}"))
    }
}
