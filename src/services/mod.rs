//! Services - business logic and state management
//!
//! This module contains the monitoring engine:
//! - `classifier` - Raw zone fields to status
//! - `stability` - Debounce of status changes
//! - `offline_tracker` - Offline duration bookkeeping
//! - `registry` - Owned zone-state map and snapshot API
//! - `rate_budget` - Token budget and adaptive batch sizing
//! - `scheduler` - Main/priority sweeps driving everything above
//! - `notifier` - Prioritized, deduplicated alerting

pub mod classifier;
pub mod notifier;
pub mod offline_tracker;
pub mod rate_budget;
pub mod registry;
pub mod scheduler;
pub mod stability;

// Re-export commonly used types
pub use notifier::NotificationChain;
pub use registry::ZoneRegistry;
pub use scheduler::{PollingScheduler, SchedulerSettings};
