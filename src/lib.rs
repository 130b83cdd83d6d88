//! Pheromone-guided orchestration of external evolution scripts.
//!
//! Signals left on disk bias the choice between exploration (`scout`),
//! meta-design (`adas`) and a blend of both (`hybrid`); the chosen script
//! then runs inside a path- and output-bounded sandbox.

pub mod config;
pub mod error;
pub mod evolution;
pub mod http;
pub mod policy;
pub mod sandbox;
pub mod signals;
pub mod thoughts;
