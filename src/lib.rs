//! Gradebook aggregation daemon: raw score intake, weighted aggregation into per-term final
//! assessments, and the JSON-lines IPC surface that drives them.

pub mod calc;
pub mod calendar;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod grading;
pub mod intake;
pub mod ipc;
pub mod model;
pub mod repo;
pub mod roster;
