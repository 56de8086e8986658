// handlers/mod.rs - HTTP handlers
//
// system: banner and health (/, /health)
// jobs:   job submission, polling, listing and cancellation (/api/jobs, /api/<kind>/jobs)
//
// Handlers stay thin: parse the request, call JobService, wrap the result in
// the ApiResponse envelope. Domain errors convert to ApiError via `?`.

pub mod jobs;
pub mod system;

pub use jobs::*;
pub use system::{health, root};
