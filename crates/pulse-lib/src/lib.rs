pub mod baseline;
pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod error;
pub mod fatigue;
pub mod intervals;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod synthetic;

pub use error::{HrvError, Result};
pub use metrics::*;
pub use signal::*;
