//! Core domain types
//!
//! Everything here is built from scratch on every pipeline run and thrown
//! away when the run ends. Nothing is persisted.

pub mod container;
pub mod decision;
pub mod image;
