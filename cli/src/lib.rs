//! wsrun library: exposes the binary's modules for unit tests.

pub mod app;
pub mod commands;
