// Waiting, polling and order tracking
pub mod clock;
pub mod monitor;
pub mod poller;
pub mod trigger;

pub use clock::{shutdown_channel, Clock, InstantClock, Shutdown, ShutdownTrigger, TokioClock};
pub use monitor::OrderMonitor;
pub use poller::Poller;
pub use trigger::{should_submit, DEFAULT_TOLERANCE};
