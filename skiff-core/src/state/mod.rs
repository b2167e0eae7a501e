pub mod connection;
mod progress;

pub use connection::ConnectionPhase;
pub use progress::{DispatchProgress, WaitDeadline};
