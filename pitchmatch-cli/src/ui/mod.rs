//! # UI Module
//!
//! Terminal rendering for the pitch trainer: a deviation meter and the
//! one-line status readout built from session snapshots.

pub mod deviation_meter;
pub mod status_line;
