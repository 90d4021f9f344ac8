//! Pipeline stages and the runner that drives them

pub mod archive;
pub mod catalog;
pub mod credentials;
pub mod fetcher;
pub mod profile;
pub mod runner;
pub mod staging;
pub mod types;
pub mod warehouse;

pub use runner::{Collaborators, PipelineRunner};
pub use types::{RunReport, RunState};
