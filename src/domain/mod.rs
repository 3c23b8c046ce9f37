//! Domain Layer
//!
//! Shared vocabulary of the cache: the beacon key type and the ports
//! (traits) through which the cache talks to the rest of the agent.
//!
//! - **Ports** (`ports.rs`) - observer and clock abstractions

pub mod ports;

pub use ports::{BeaconCacheObserver, BeaconKey, ObserverId, SystemTimingProvider, TimingProvider};
