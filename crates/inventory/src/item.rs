use serde::{Deserialize, Serialize};

use procura_core::{DomainError, DomainResult, Entity, ItemId};

use crate::quantity::Quantity;

/// Longest unit-of-measure label accepted ("pcs", "set", "roll", ...).
pub const MAX_UNIT_LEN: usize = 50;

/// A stock item with its physical on-hand count.
///
/// The count is unsigned, so "never below zero" holds by construction; the
/// only way down is [`Item::decrement_stock`], which refuses to underflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    description: Option<String>,
    unit: String,
    stock_quantity: u32,
}

impl Item {
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        description: Option<String>,
        unit: impl Into<String>,
        stock_quantity: u32,
    ) -> DomainResult<Self> {
        let name = name.into();
        let unit = unit.into();

        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if unit.chars().count() > MAX_UNIT_LEN {
            return Err(DomainError::validation(format!(
                "unit cannot exceed {MAX_UNIT_LEN} characters"
            )));
        }

        Ok(Self {
            id,
            name,
            description,
            unit,
            stock_quantity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    /// Remove `qty` units from the on-hand count.
    ///
    /// Last line of defence behind the approval check: fails with
    /// `InsufficientStock` instead of driving the count negative.
    pub fn decrement_stock(&mut self, qty: Quantity) -> DomainResult<()> {
        match self.stock_quantity.checked_sub(qty.get()) {
            Some(rest) => {
                self.stock_quantity = rest;
                Ok(())
            }
            None => Err(DomainError::insufficient_stock(
                self.id,
                i64::from(self.stock_quantity),
                qty.get(),
            )),
        }
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
