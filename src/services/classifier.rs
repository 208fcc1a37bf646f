//! Status classification - raw zone fields to `ZoneStatus`
//!
//! Rules are evaluated in fixed priority order (highest first):
//! 1. not paired                                   -> Unpaired
//! 2. device reported missing                      -> Unpaired
//! 3. no subscription                              -> NoSubscription
//! 4. subscription expired/cancelled, or inactive
//!    flag on a non-active subscription            -> Expired
//! 5. online                                       -> Online
//! 6. otherwise                                    -> Offline
//!
//! Contradictory inputs are still classified by the rules above; the
//! contradiction is reported alongside the result so the caller can log it.

use crate::domain::types::{RawZoneDetails, SubscriptionState, ZoneStatus};

/// Contradictory raw fields, resolved by rule priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationAmbiguity {
    /// Pairing flag is false but the zone reports itself online
    UnpairedButOnline,
    /// Paired, but the device is missing and there is no subscription either
    DeviceMissingWithoutSubscription,
    /// Active flag set on an expired or cancelled subscription
    ActiveFlagOnLapsedSubscription,
}

impl ClassificationAmbiguity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationAmbiguity::UnpairedButOnline => "unpaired_but_online",
            ClassificationAmbiguity::DeviceMissingWithoutSubscription => {
                "device_missing_without_subscription"
            }
            ClassificationAmbiguity::ActiveFlagOnLapsedSubscription => {
                "active_flag_on_lapsed_subscription"
            }
        }
    }
}

/// Result of classifying one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: ZoneStatus,
    pub ambiguity: Option<ClassificationAmbiguity>,
}

/// Classify raw zone fields. Pure and total.
pub fn classify(details: &RawZoneDetails) -> Classification {
    let status = classify_status(details);
    Classification { status, ambiguity: detect_ambiguity(details) }
}

fn classify_status(details: &RawZoneDetails) -> ZoneStatus {
    if !details.paired {
        return ZoneStatus::Unpaired;
    }

    if details.device_present == Some(false) {
        return ZoneStatus::Unpaired;
    }

    let Some(state) = &details.subscription_state else {
        return ZoneStatus::NoSubscription;
    };

    let inactive = details.subscription_active == Some(false) && *state != SubscriptionState::Active;
    if state.is_lapsed() || inactive {
        return ZoneStatus::Expired;
    }

    if details.online {
        ZoneStatus::Online
    } else {
        ZoneStatus::Offline
    }
}

fn detect_ambiguity(details: &RawZoneDetails) -> Option<ClassificationAmbiguity> {
    if !details.paired && details.online {
        return Some(ClassificationAmbiguity::UnpairedButOnline);
    }

    if details.paired
        && details.device_present == Some(false)
        && details.subscription_state.is_none()
    {
        return Some(ClassificationAmbiguity::DeviceMissingWithoutSubscription);
    }

    let lapsed = details.subscription_state.as_ref().is_some_and(SubscriptionState::is_lapsed);
    if lapsed && details.subscription_active == Some(true) {
        return Some(ClassificationAmbiguity::ActiveFlagOnLapsedSubscription);
    }

    None
}
