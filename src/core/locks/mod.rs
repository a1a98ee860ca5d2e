//! Shadow models of the analyzed program's locks
//!
//! - `ShadowLock`: reentrant ownership of one synchronization object
//! - `LockRegistry`: per-process table of shadow locks keyed by tracked object id
//! - `ReentrancyTracker`: depths saved across `Monitor.Wait` calls

pub mod registry;
pub mod reentrancy;
pub mod shadow_lock;

pub use reentrancy::ReentrancyTracker;
pub use registry::LockRegistry;
pub use shadow_lock::ShadowLock;
