//! Runtime library for the gsim load simulator
//!
//! Single-threaded cooperative task scheduling over a millisecond timing
//! wheel, the UDP transport the scheduler polls, the statistics counter
//! store and the simulator configuration.

pub mod config;
pub mod sched;
pub mod stats;
pub mod task;
pub mod time;
pub mod transport;
pub mod wheel;

pub use config::{Config, ConfigError, NodeType};
pub use sched::Scheduler;
pub use stats::{StatKind, Stats};
pub use task::{RunOutcome, Task, TaskId, TaskState};
pub use transport::{Datagram, LoopHandle, LoopTransport, Transport, UdpTransport};
pub use wheel::TimingWheel;
