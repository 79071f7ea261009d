//! Filesystem-adjacent helpers that do not belong to a single pipeline
//! stage.

pub mod sparse;
