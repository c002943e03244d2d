//! Membership quota policy.
//!
//! Maps a membership tier to the number of issues a user may submit. Pure; the
//! repository applies the limit atomically when an issue is inserted.

use serde::{Serialize, Serializer};

use crate::errors::AppError;
use crate::models::Membership;

pub const DEFAULT_FREE_LIMIT: u32 = 5;
pub const DEFAULT_STANDARD_LIMIT: u32 = 50;

/// Post limits for the bounded tiers. Premium is always unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    free: u32,
    standard: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free: DEFAULT_FREE_LIMIT,
            standard: DEFAULT_STANDARD_LIMIT,
        }
    }
}

impl QuotaPolicy {
    pub fn new(free: u32, standard: u32) -> Result<Self, AppError> {
        if free == 0 || standard == 0 {
            return Err(AppError::Config(
                "Post limits must be greater than zero".to_string(),
            ));
        }
        if standard < free {
            return Err(AppError::Config(format!(
                "Standard post limit ({}) must not be below the free limit ({})",
                standard, free
            )));
        }
        Ok(Self { free, standard })
    }

    /// Maximum number of posts for the tier, `None` when unbounded.
    pub fn limit(&self, tier: Membership) -> Option<u32> {
        match tier {
            Membership::Free => Some(self.free),
            Membership::Standard => Some(self.standard),
            Membership::Premium => None,
        }
    }

    /// Whether one more post is allowed at the given count.
    pub fn allows(&self, tier: Membership, post_count: i64) -> bool {
        match self.limit(tier) {
            Some(limit) => post_count < i64::from(limit),
            None => true,
        }
    }

    pub fn report(&self, tier: Membership, post_count: i64) -> QuotaReport {
        let (limit, remaining) = match self.limit(tier) {
            Some(limit) => {
                let limit = i64::from(limit);
                (
                    Allowance::Limited(limit),
                    Allowance::Limited((limit - post_count).max(0)),
                )
            }
            None => (Allowance::Unlimited, Allowance::Unlimited),
        };

        QuotaReport {
            membership: tier,
            post_count,
            limit,
            remaining,
            can_post: self.allows(tier, post_count),
        }
    }
}

/// A count or "unlimited".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Limited(i64),
    Unlimited,
}

impl Serialize for Allowance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allowance::Limited(n) => serializer.serialize_i64(*n),
            Allowance::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Usage report returned by `GET /users/usage/{email}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    pub membership: Membership,
    pub post_count: i64,
    pub limit: Allowance,
    pub remaining: Allowance,
    pub can_post: bool,
}
