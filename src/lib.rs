#![forbid(unsafe_code)]

pub mod app;
pub mod authoring;
pub mod backend;
pub mod backoff;
pub mod cli;
pub mod commands;
pub mod config;
pub mod firestore;
pub mod formats;
pub mod logging;
pub mod prompts;
pub mod provider;
pub mod quota;
pub mod runtime;
pub mod scanner;
pub mod store;
pub mod sync;
pub mod text;
pub mod world;
pub mod worker;

#[cfg(test)]
mod testing;
