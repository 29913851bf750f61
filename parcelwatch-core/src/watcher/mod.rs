//! Mailbox watchers: a generic connect/drain/wait loop parameterised over
//! a per-provider interface, plus the supervisor that owns the running
//! tasks.

pub mod provider;
pub mod run;
pub mod supervisor;

pub use provider::{ConnectOutcome, FetchContext, RouteOutcome, WatchProvider};
pub use run::{IDLE_TIMEOUT, StatusSlot, watch_loop};
pub use supervisor::{WatchTarget, WatcherSupervisor};
