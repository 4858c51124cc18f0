//! pipewright-lib: Core types and logic for pipewright
//!
//! This crate runs pluggable build pipelines over a set of components:
//! - `TaskSlot`: registry extensions contribute tasks through
//! - `BuildPipe`: the ordered task list of one run and its sequential executor
//! - `CapsuleProvider`: isolated per-component build contexts
//! - `ArtifactFactory`: named, immutable task outputs
//! - `BuilderService`: the entry point wiring a run together

pub mod artifact;
pub mod capsule;
pub mod compiler;
pub mod component;
pub mod config;
pub mod consts;
pub mod context;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod service;
pub mod task;
pub mod util;
