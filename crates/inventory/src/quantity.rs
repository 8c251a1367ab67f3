use serde::{Deserialize, Serialize};

use procura_core::{DomainError, DomainResult, ValueObject};

/// A strictly positive count of units requested on a line, capped so it fits
/// the signed integer columns stock is stored in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const MAX: u32 = i32::MAX as u32;

    pub fn new(value: u32) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if value > Self::MAX {
            return Err(DomainError::validation(format!(
                "quantity must be at most {}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<u32> for Quantity {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
