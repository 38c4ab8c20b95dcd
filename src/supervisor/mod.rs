//! Supervisor module: keeps a pool of worker processes sized against host resources
//!
//! # Components
//!
//! - `ResourceMonitor`: samples memory and temperature against ceilings
//! - `PoolState`: running / paused / shutting-down state machine
//! - `WorkerLauncher` / `WorkerProcess`: process management seam
//! - `WorkerHandle`: one owned worker with its age and stop protocol
//! - `WorkerSupervisor`: the scaling tick and shutdown

mod handle;
mod pool;
mod process;
mod resources;
mod state;

pub use handle::{new_worker_id, StopOutcome, WorkerHandle};
pub use pool::{SupervisorOptions, TickReport, WorkerSupervisor};
pub use process::{ProcessLauncher, ProcessState, WorkerLauncher, WorkerProcess, WorkerSpec};
pub use resources::{parse_meminfo, ProcProbe, ResourceMonitor, ResourceProbe, ResourceSnapshot};
pub use state::PoolState;
