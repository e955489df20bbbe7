//! `conveyor-worker` — drives an external stage worker as a subprocess.
//!
//! The model call itself is a black box behind a one-shot JSON protocol:
//!
//! ```text
//! WorkerRequest (+ stage instructions)
//!     │  JSON on stdin
//!     ▼
//! worker executable        ← any program: a model-CLI wrapper, a script,
//!     │  JSON on stdout       a replay fixture
//!     ▼
//! StageOutput              ← the structured result schema conveyor-core
//!                             gates on
//! ```
//!
//! No vendor protocol leaks into the orchestrator: swapping model providers
//! means swapping the executable, nothing else.

pub mod command;
pub mod error;
pub mod instructions;

pub use command::CommandWorker;
pub use error::WorkerSetupError;
