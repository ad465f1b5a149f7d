//! Melty: task/branch session manager behind an editor chat panel.

pub mod bridge;
pub mod config;
pub mod context;
pub mod editor;
pub mod error;
pub mod generator;
pub mod git;
pub mod single_flight;
pub mod task;
pub mod workspace;
