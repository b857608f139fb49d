//! Goodbooks merge library - shared modules for all binaries.

pub mod aggregate;
pub mod explore;
pub mod finalize;
pub mod io;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod safety;
pub mod tags;
