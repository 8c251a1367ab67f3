use serde::{Deserialize, Serialize};

use procura_core::{DomainError, UserId};

/// Outcome an approver picks for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "approved")]
    Approve,
    #[serde(rename = "rejected")]
    Reject,
}

impl core::str::FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approve),
            "rejected" => Ok(Decision::Reject),
            other => Err(DomainError::validation(format!(
                "decision must be 'approved' or 'rejected', got '{other}'"
            ))),
        }
    }
}

/// Proof that the caller already checked the approver may decide requests.
///
/// The domain never inspects roles. Whoever holds the identity model (the HTTP
/// layer, a CLI, a test) performs that check and hands one of these in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGrant {
    approver: UserId,
}

impl ApprovalGrant {
    pub fn confirmed(approver: UserId) -> Self {
        Self { approver }
    }

    pub fn approver(&self) -> UserId {
        self.approver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_status_labels() {
        assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approve);
        assert_eq!("rejected".parse::<Decision>().unwrap(), Decision::Reject);

        match "pending".parse::<Decision>() {
            Err(DomainError::Validation(msg)) if msg.contains("pending") => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
