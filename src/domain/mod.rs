//! Domain models - core types for zone monitoring
//!
//! This module contains the canonical data types used throughout the system:
//! - `Zone` - the monitored endpoint and its committed status
//! - `ZoneStatus` - classification result for a zone
//! - `RawZoneDetails` - raw fields reported by the status API
//! - `StatusChanged` / `RecoveryEvent` - lifecycle events
//! - `error` - error taxonomy shared by services and IO

pub mod error;
pub mod types;
pub mod zone;

// Re-export commonly used types at module level
pub use error::{EngineError, FetchError, NotificationError, PersistenceError};
pub use types::{RawZoneDetails, SubscriptionState, ZoneId, ZoneStatus};
pub use zone::{PendingTransition, RecoveryEvent, StatusChanged, Zone};
