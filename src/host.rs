//! Instance manager - discovers the configured plugin type and keeps a live,
//! ordered set of instances in sync with the requested count
//!
//! Two tasks cooperate:
//! - the **control** task ([`actor`]) owns the instance list and processes
//!   commands strictly in FIFO order
//! - the **presentation** task ([`presentation`]) hands notifications to a
//!   weakly-held [`HostObserver`]

mod actor;
mod actor_handle;
mod commands;
mod discovery;
mod presentation;
mod types;


pub use actor_handle::InstanceManagerHandle;
pub use discovery::discover;
pub use types::{
    ChannelObserver, HostEvent, HostObserver, HostedInstance, ManagerConfig, Phase, SurfaceMap,
    DEFAULT_DISCOVERY_TIMEOUT,
};
