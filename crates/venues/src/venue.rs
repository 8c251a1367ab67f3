use serde::{Deserialize, Serialize};

use procura_core::{DomainError, DomainResult, Entity, VenueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStatus {
    Active,
    Inactive,
}

impl VenueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VenueStatus::Active => "active",
            VenueStatus::Inactive => "inactive",
        }
    }
}

impl core::str::FromStr for VenueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VenueStatus::Active),
            "inactive" => Ok(VenueStatus::Inactive),
            other => Err(DomainError::validation(format!(
                "unknown venue status: {other}"
            ))),
        }
    }
}

/// A wedding venue that requests are raised against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    id: VenueId,
    name: String,
    address: Option<String>,
    description: Option<String>,
    status: VenueStatus,
}

impl Venue {
    pub fn new(
        id: VenueId,
        name: impl Into<String>,
        address: Option<String>,
        description: Option<String>,
        status: VenueStatus,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("venue name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            address,
            description,
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> VenueStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == VenueStatus::Active
    }

    pub fn set_status(&mut self, status: VenueStatus) {
        self.status = status;
    }

    /// New requests may only be raised against active venues.
    pub fn ensure_accepts_requests(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::validation(format!(
                "venue '{}' is not active",
                self.name
            )));
        }
        Ok(())
    }
}

impl Entity for Venue {
    type Id = VenueId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_venue(status: VenueStatus) -> Venue {
        Venue::new(
            VenueId::new(),
            "Grand Ballroom Permata",
            Some("Jl. Sudirman No. 123, Jakarta Pusat".to_string()),
            None,
            status,
        )
        .unwrap()
    }

    #[test]
    fn active_venue_accepts_requests() {
        assert!(test_venue(VenueStatus::Active).ensure_accepts_requests().is_ok());
    }

    #[test]
    fn inactive_venue_rejects_requests() {
        let mut venue = test_venue(VenueStatus::Active);
        venue.set_status(VenueStatus::Inactive);

        match venue.ensure_accepts_requests() {
            Err(DomainError::Validation(msg)) if msg.contains("not active") => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_round_trips_through_its_label() {
        for status in [VenueStatus::Active, VenueStatus::Inactive] {
            assert_eq!(status.as_str().parse::<VenueStatus>().unwrap(), status);
        }
        assert!("closed".parse::<VenueStatus>().is_err());
    }
}
