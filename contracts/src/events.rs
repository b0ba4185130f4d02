//! Escrow event log.
//!
//! Every successful state change of the engine appends one [`EventRecord`].
//! Rejected calls append nothing, so the log is an exact history of the
//! transitions that took effect.
//!
//! Events use serde's default external tagging (`{"listed": {...}}`).
//! Internally tagged enums buffer their content, and that buffer cannot
//! carry `u128` amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Amount;
use crate::registry::AssetId;

/// A state change of one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowEvent {
    Listed {
        asset_id: AssetId,
        seller: Address,
        buyer: Address,
        purchase_price: Amount,
        escrow_amount: Amount,
    },
    EarnestDeposited {
        asset_id: AssetId,
        buyer: Address,
        amount: Amount,
        held: Amount,
    },
    SaleFunded {
        asset_id: AssetId,
        lender: Address,
        amount: Amount,
        held: Amount,
    },
    InspectionUpdated {
        asset_id: AssetId,
        inspector: Address,
        passed: bool,
    },
    SaleApproved {
        asset_id: AssetId,
        party: Address,
    },
    SaleFinalized {
        asset_id: AssetId,
        buyer: Address,
        seller: Address,
        purchase_price: Amount,
        /// Buyer deposits the price did not consume.
        buyer_refund: Amount,
        /// Lender funding the price did not consume.
        lender_refund: Amount,
    },
    SaleCancelled {
        asset_id: AssetId,
        cancelled_by: Address,
        /// Earnest returned to the buyer.
        buyer_refund: Amount,
        /// Earnest kept by the seller because the inspection had passed.
        forfeited: Amount,
        /// Lender funding returned to the lender.
        lender_refund: Amount,
    },
}

impl EscrowEvent {
    /// The asset the event concerns.
    pub fn asset_id(&self) -> AssetId {
        match self {
            EscrowEvent::Listed { asset_id, .. }
            | EscrowEvent::EarnestDeposited { asset_id, .. }
            | EscrowEvent::SaleFunded { asset_id, .. }
            | EscrowEvent::InspectionUpdated { asset_id, .. }
            | EscrowEvent::SaleApproved { asset_id, .. }
            | EscrowEvent::SaleFinalized { asset_id, .. }
            | EscrowEvent::SaleCancelled { asset_id, .. } => *asset_id,
        }
    }

    /// Short snake_case name, matching the serialized variant key.
    pub fn kind(&self) -> &'static str {
        match self {
            EscrowEvent::Listed { .. } => "listed",
            EscrowEvent::EarnestDeposited { .. } => "earnest_deposited",
            EscrowEvent::SaleFunded { .. } => "sale_funded",
            EscrowEvent::InspectionUpdated { .. } => "inspection_updated",
            EscrowEvent::SaleApproved { .. } => "sale_approved",
            EscrowEvent::SaleFinalized { .. } => "sale_finalized",
            EscrowEvent::SaleCancelled { .. } => "sale_cancelled",
        }
    }
}

/// An event together with its position in the log and the time it was
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at 0.
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub event: EscrowEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ether;

    #[test]
    fn serialized_key_matches_kind() {
        let event = EscrowEvent::SaleApproved {
            asset_id: 3,
            party: Address::from_bytes([1; 20]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json[event.kind()]["asset_id"], 3);
        assert_eq!(event.asset_id(), 3);
    }

    #[test]
    fn large_amounts_survive_json() {
        let record = EventRecord {
            sequence: 7,
            at: Utc::now(),
            event: EscrowEvent::SaleFunded {
                asset_id: 1,
                lender: Address::from_bytes([2; 20]),
                amount: ether(15),
                held: ether(20),
            },
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event, record.event);
        assert_eq!(back.sequence, 7);
    }
}
