//! The SkyGuard analysis pipeline.
//!
//! Wires a [`source::FrameSource`] through the batch
//! [`orchestrator::BatchOrchestrator`] under a [`controller::JobController`]
//! that owns the job state machine. Controller tasks are supervised by the
//! [`registry::JobRegistry`] so every running job can be queried or
//! cancelled by id.

pub mod controller;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod registry;
pub mod source;

pub use error::PipelineError;
