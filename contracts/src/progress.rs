//! Sale progress as seen by one party.
//!
//! [`SaleProgress`] is a read-only snapshot of everything a party needs to
//! decide its next step on a listing, and [`SaleProgress::action_for`] names
//! that step.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::Amount;
use crate::escrow::{Blocker, EscrowEngine, ListingStatus, Role};
use crate::ledger::FundsLedger;
use crate::registry::{AssetId, AssetRegistry};

/// The next step available to a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyAction {
    /// Buyer: deposit earnest and approve.
    Buy,
    /// Inspector: pass the inspection.
    ApproveInspection,
    /// Lender: approve and fund the remainder.
    ApproveAndLend,
    /// Seller: approve the sale.
    ApproveAndSell,
    /// Seller: everything is in place, close the sale.
    Finalize,
    /// Nothing left for this party to do.
    None,
}

impl std::fmt::Display for PartyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PartyAction::Buy => "Buy",
            PartyAction::ApproveInspection => "Approve Inspection",
            PartyAction::ApproveAndLend => "Approve & Lend",
            PartyAction::ApproveAndSell => "Approve & Sell",
            PartyAction::Finalize => "Finalize",
            PartyAction::None => "-",
        };
        f.write_str(label)
    }
}

/// One party's position in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyStatus {
    pub role: Role,
    pub address: Address,
    /// Approval flag for buyer/seller/lender; the inspection result for the
    /// inspector.
    pub approved: bool,
}

/// Snapshot of one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleProgress {
    pub asset_id: AssetId,
    pub status: ListingStatus,
    pub parties: Vec<PartyStatus>,
    pub purchase_price: Amount,
    pub escrow_amount: Amount,
    pub held: Amount,
    pub inspection_passed: bool,
    /// Current registry owner of the asset.
    pub owner: Option<Address>,
    /// Unmet finalize preconditions; empty once the sale can close or after
    /// it has settled.
    pub blockers: Vec<Blocker>,
}

impl SaleProgress {
    /// Builds the snapshot, or `None` if the asset was never listed.
    pub fn fetch<R: AssetRegistry, L: FundsLedger>(
        engine: &EscrowEngine<R, L>,
        asset_id: AssetId,
    ) -> Option<Self> {
        let listing = engine.listing(asset_id)?;
        let parties = Role::ALL
            .into_iter()
            .map(|role| {
                let (address, approved) = match role {
                    Role::Seller => (listing.seller, listing.has_approved(&listing.seller)),
                    Role::Buyer => (listing.buyer, listing.has_approved(&listing.buyer)),
                    Role::Lender => (listing.lender, listing.has_approved(&listing.lender)),
                    Role::Inspector => (listing.inspector, listing.inspection_passed),
                };
                PartyStatus {
                    role,
                    address,
                    approved,
                }
            })
            .collect();

        Some(Self {
            asset_id,
            status: listing.status,
            parties,
            purchase_price: listing.purchase_price,
            escrow_amount: listing.escrow_amount,
            held: engine.balance_of(asset_id),
            inspection_passed: listing.inspection_passed,
            owner: engine.registry().owner_of(asset_id),
            blockers: engine.sale_blockers(asset_id).unwrap_or_default(),
        })
    }

    /// The party holding `role`.
    pub fn party(&self, role: Role) -> Option<&PartyStatus> {
        self.parties.iter().find(|p| p.role == role)
    }

    /// Whether every finalize precondition holds.
    pub fn is_ready(&self) -> bool {
        self.status == ListingStatus::Listed && self.blockers.is_empty()
    }

    /// The next step for `party`. When one address holds several roles, the
    /// first pending step in seller, buyer, inspector, lender order wins.
    pub fn action_for(&self, party: &Address) -> PartyAction {
        if self.status != ListingStatus::Listed {
            return PartyAction::None;
        }
        self.parties
            .iter()
            .filter(|p| p.address == *party)
            .map(|p| self.action_for_role(p))
            .find(|action| *action != PartyAction::None)
            .unwrap_or(PartyAction::None)
    }

    fn action_for_role(&self, status: &PartyStatus) -> PartyAction {
        match (status.role, status.approved) {
            (Role::Buyer, false) => PartyAction::Buy,
            (Role::Inspector, false) => PartyAction::ApproveInspection,
            (Role::Lender, false) => PartyAction::ApproveAndLend,
            (Role::Seller, false) => PartyAction::ApproveAndSell,
            (Role::Seller, true) if self.is_ready() => PartyAction::Finalize,
            _ => PartyAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ether;
    use crate::ledger::InMemoryLedger;
    use crate::real_estate::RealEstate;

    fn addr(tag: u8) -> Address {
        Address::from_bytes([tag; 20])
    }

    // seller 1, buyer 2, inspector 3, lender 4, engine 0xe5
    fn engine() -> EscrowEngine<RealEstate, InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.airdrop(&addr(2), ether(50)).unwrap();
        ledger.airdrop(&addr(4), ether(50)).unwrap();
        let mut engine = EscrowEngine::new(
            addr(0xe5),
            addr(1),
            addr(3),
            addr(4),
            RealEstate::new(addr(0xee)),
            ledger,
        );
        let id = engine.registry_mut().mint(&addr(1), "ipfs://1", None).unwrap();
        engine.registry_mut().approve(&addr(1), id, &addr(0xe5)).unwrap();
        engine.list(&addr(1), id, &addr(2), ether(20), ether(10)).unwrap();
        engine
    }

    #[test]
    fn never_listed_asset_has_no_progress() {
        assert!(SaleProgress::fetch(&engine(), 99).is_none());
    }

    #[test]
    fn fresh_listing_offers_every_party_its_step() {
        let progress = SaleProgress::fetch(&engine(), 1).unwrap();
        assert_eq!(progress.action_for(&addr(1)), PartyAction::ApproveAndSell);
        assert_eq!(progress.action_for(&addr(2)), PartyAction::Buy);
        assert_eq!(progress.action_for(&addr(3)), PartyAction::ApproveInspection);
        assert_eq!(progress.action_for(&addr(4)), PartyAction::ApproveAndLend);
        assert_eq!(progress.action_for(&addr(9)), PartyAction::None);
        assert_eq!(progress.owner, Some(addr(0xe5)));
    }

    #[test]
    fn seller_sees_finalize_once_ready() {
        let mut engine = engine();
        engine.deposit_earnest(&addr(2), 1, ether(10)).unwrap();
        engine.approve_sale(&addr(2), 1).unwrap();
        engine.update_inspection_status(&addr(3), 1, true).unwrap();
        engine.approve_sale(&addr(4), 1).unwrap();
        engine.approve_sale(&addr(1), 1).unwrap();

        let progress = SaleProgress::fetch(&engine, 1).unwrap();
        assert_eq!(progress.action_for(&addr(1)), PartyAction::None);
        assert!(!progress.is_ready());

        engine.fund_sale(&addr(4), 1, ether(10)).unwrap();
        let progress = SaleProgress::fetch(&engine, 1).unwrap();
        assert!(progress.is_ready());
        assert_eq!(progress.action_for(&addr(1)), PartyAction::Finalize);
        assert_eq!(progress.action_for(&addr(2)), PartyAction::None);
    }

    #[test]
    fn settled_listing_has_no_actions() {
        let mut engine = engine();
        engine.cancel_sale(&addr(1), 1).unwrap();
        let progress = SaleProgress::fetch(&engine, 1).unwrap();
        assert_eq!(progress.status, ListingStatus::Cancelled);
        assert_eq!(progress.owner, Some(addr(1)));
        for tag in 1..=4 {
            assert_eq!(progress.action_for(&addr(tag)), PartyAction::None);
        }
    }
}
