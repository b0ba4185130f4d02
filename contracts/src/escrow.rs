//! # Property Escrow Engine
//!
//! A multi-party escrow for property sales, keyed by asset id. One engine is
//! deployed with a fixed seller, inspector, and lender; each listing adds a
//! buyer and the financial terms. The lifecycle of a listing is:
//!
//! 1. **List**: the seller hands the property token to the engine (which
//!    takes custody) and names the buyer, purchase price, and required
//!    earnest amount.
//! 2. **Deposit**: the buyer pays earnest money into escrow, in one or more
//!    deposits.
//! 3. **Inspect**: the inspector records whether the property passed.
//! 4. **Approve**: buyer, seller, and lender each approve the sale.
//! 5. **Fund**: the lender pays the remainder of the purchase price into
//!    escrow.
//! 6. **Finalize**: the seller closes the sale. The token goes to the buyer
//!    and the purchase price to the seller, in one step.
//!
//! Alternatively the seller or the buyer **cancels**: the token goes back to
//! the seller, lender funding goes back to the lender, and the buyer's
//! earnest is refunded if the inspection did not pass. If it did, the seller
//! keeps up to the agreed earnest.
//!
//! ## Atomicity
//!
//! Every operation checks all of its preconditions before its first effect.
//! When an operation has several effects (finalize and cancel move the token
//! and pay out funds) and a later one fails, the earlier ones are undone
//! before the error is returned. A rejected call never leaves partial state
//! behind and never appends an event.
//!
//! ## Monotonic Approvals
//!
//! Approvals are set-once. No operation revokes an approval, and a finalized
//! or cancelled asset can never be listed again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::config::{format_ether, Amount};
use crate::events::{EscrowEvent, EventRecord};
use crate::ledger::{FundsLedger, LedgerError};
use crate::registry::{AssetId, AssetRegistry, RegistryError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during escrow operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// The caller does not hold the role this operation requires.
    #[error("unauthorized: {party} may not {action}")]
    Unauthorized {
        /// The address that attempted the operation.
        party: Address,
        /// What it tried to do.
        action: &'static str,
    },

    /// The asset has no active listing.
    #[error("asset {0} is not listed")]
    NotListed(AssetId),

    /// The asset already has an active listing.
    #[error("asset {0} is already listed")]
    AlreadyListed(AssetId),

    /// The asset's listing has been finalized or cancelled.
    #[error("asset {asset_id} was already settled ({status})")]
    AlreadySettled {
        asset_id: AssetId,
        status: ListingStatus,
    },

    /// Finalize was attempted before every precondition held.
    #[error("sale of asset {asset_id} is not ready: {}", join_blockers(.blockers))]
    SaleNotReady {
        asset_id: AssetId,
        blockers: Vec<Blocker>,
    },

    /// The paying party does not hold enough funds.
    #[error(
        "insufficient funds: required {}, available {}",
        ether_str(.required),
        ether_str(.available)
    )]
    InsufficientFunds { required: Amount, available: Amount },

    /// The listing terms are inconsistent.
    #[error("invalid listing terms: {0}")]
    InvalidTerms(String),

    /// Deposits and funding must move a non-zero amount.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// An amount would exceed `u128::MAX`.
    #[error("amount overflow")]
    AmountOverflow,

    /// The asset registry rejected a custody transfer.
    #[error("asset registry: {0}")]
    Registry(#[from] RegistryError),

    /// The funds ledger rejected a transfer for a reason other than a
    /// shortfall of the paying party.
    #[error("funds ledger: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for EscrowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                available,
                requested,
                ..
            } => EscrowError::InsufficientFunds {
                required: requested,
                available,
            },
            LedgerError::Overflow => EscrowError::AmountOverflow,
            other => EscrowError::Ledger(other),
        }
    }
}

fn ether_str(amount: &Amount) -> String {
    format_ether(*amount)
}

fn join_blockers(blockers: &[Blocker]) -> String {
    blockers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The parts a party can play in a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seller,
    Buyer,
    Inspector,
    Lender,
}

impl Role {
    /// All roles, in the order they are usually displayed.
    pub const ALL: [Role; 4] = [Role::Seller, Role::Buyer, Role::Inspector, Role::Lender];

    /// Lowercase name, as used in key file names and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seller => "seller",
            Role::Buyer => "buyer",
            Role::Inspector => "inspector",
            Role::Lender => "lender",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role '{0}' (expected seller, buyer, inspector, or lender)")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "seller" => Ok(Role::Seller),
            "buyer" => Ok(Role::Buyer),
            "inspector" => Ok(Role::Inspector),
            "lender" => Ok(Role::Lender),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Lifecycle status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    /// In escrow; deposits, inspection, and approvals are accepted.
    Listed,
    /// Sold: the buyer owns the property and the seller has been paid.
    Finalized,
    /// Unwound: the property is back with the seller.
    Cancelled,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStatus::Listed => write!(f, "Listed"),
            ListingStatus::Finalized => write!(f, "Finalized"),
            ListingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One unmet precondition of [`EscrowEngine::finalize_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blocker {
    /// The inspector has not passed the property.
    InspectionNotPassed,
    /// A required party has not approved.
    MissingApproval(Role),
    /// Escrow holds less than the purchase price.
    Underfunded { held: Amount, required: Amount },
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::InspectionNotPassed => write!(f, "inspection has not passed"),
            Blocker::MissingApproval(role) => write!(f, "{} has not approved", role),
            Blocker::Underfunded { held, required } => write!(
                f,
                "escrow holds {} of {}",
                format_ether(*held),
                format_ether(*required)
            ),
        }
    }
}

/// The escrow record for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// The property token held in escrow.
    pub asset_id: AssetId,
    /// Current lifecycle status.
    pub status: ListingStatus,
    /// The party selling the property and receiving the purchase price.
    pub seller: Address,
    /// The only party allowed to deposit earnest and approve as buyer.
    pub buyer: Address,
    /// The party allowed to record the inspection result.
    pub inspector: Address,
    /// The party financing the remainder of the purchase price.
    pub lender: Address,
    /// Price the seller receives at finalize.
    pub purchase_price: Amount,
    /// Earnest money the buyer is expected to deposit.
    pub escrow_amount: Amount,
    /// Total earnest deposited by the buyer so far.
    pub earnest_deposited: Amount,
    /// Total funding supplied by the lender so far.
    pub lender_funded: Amount,
    /// Latest inspection result.
    pub inspection_passed: bool,
    /// Parties that have approved the sale.
    pub approvals: BTreeSet<Address>,
    /// Timestamp when the listing was created.
    pub listed_at: DateTime<Utc>,
    /// Timestamp of the most recent state change.
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Returns `true` while the listing accepts deposits and approvals.
    pub fn is_listed(&self) -> bool {
        self.status == ListingStatus::Listed
    }

    /// Whether `party` has approved the sale.
    pub fn has_approved(&self, party: &Address) -> bool {
        self.approvals.contains(party)
    }

    fn approver(&self, role: Role) -> Option<Address> {
        match role {
            Role::Buyer => Some(self.buyer),
            Role::Seller => Some(self.seller),
            Role::Lender => Some(self.lender),
            Role::Inspector => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The escrow engine. Owns its asset registry and funds ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowEngine<R, L> {
    /// The engine's own address; custodian of listed tokens.
    address: Address,
    seller: Address,
    inspector: Address,
    lender: Address,
    registry: R,
    ledger: L,
    listings: BTreeMap<AssetId, Listing>,
    events: Vec<EventRecord>,
}

impl<R: AssetRegistry, L: FundsLedger> EscrowEngine<R, L> {
    /// Deploys an engine at `address` with the given global parties.
    pub fn new(
        address: Address,
        seller: Address,
        inspector: Address,
        lender: Address,
        registry: R,
        ledger: L,
    ) -> Self {
        Self {
            address,
            seller,
            inspector,
            lender,
            registry,
            ledger,
            listings: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    // -- Operations ---------------------------------------------------------

    /// Lists `asset_id` for sale to `buyer`.
    ///
    /// The seller must own the token and have approved the engine as its
    /// spender, unless the engine already holds it. The engine takes
    /// custody as part of the call.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::Unauthorized`] if `caller` is not the seller.
    /// - [`EscrowError::AlreadyListed`] / [`EscrowError::AlreadySettled`] if
    ///   the asset has (or had) a listing.
    /// - [`EscrowError::InvalidTerms`] for a zero price, an earnest amount
    ///   above the price, or a buyer that is the seller or the zero address.
    /// - [`EscrowError::Registry`] if custody cannot be taken.
    pub fn list(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        buyer: &Address,
        purchase_price: Amount,
        escrow_amount: Amount,
    ) -> Result<(), EscrowError> {
        if *caller != self.seller {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "list a property",
            });
        }

        match self.listings.get(&asset_id) {
            Some(listing) if listing.is_listed() => {
                return Err(EscrowError::AlreadyListed(asset_id));
            }
            Some(listing) => {
                return Err(EscrowError::AlreadySettled {
                    asset_id,
                    status: listing.status,
                });
            }
            None => {}
        }

        if purchase_price == 0 {
            return Err(EscrowError::InvalidTerms("purchase price must be positive".into()));
        }
        if escrow_amount > purchase_price {
            return Err(EscrowError::InvalidTerms(format!(
                "escrow amount {} exceeds purchase price {}",
                format_ether(escrow_amount),
                format_ether(purchase_price)
            )));
        }
        if buyer.is_zero() || *buyer == self.seller {
            return Err(EscrowError::InvalidTerms(
                "buyer must be a party other than the seller".into(),
            ));
        }

        let owner = self
            .registry
            .owner_of(asset_id)
            .ok_or(RegistryError::TokenNotFound(asset_id))?;
        if owner != self.address {
            self.registry
                .transfer_ownership(&self.address, asset_id, caller, &self.address)?;
        }

        let now = Utc::now();
        self.listings.insert(
            asset_id,
            Listing {
                asset_id,
                status: ListingStatus::Listed,
                seller: self.seller,
                buyer: *buyer,
                inspector: self.inspector,
                lender: self.lender,
                purchase_price,
                escrow_amount,
                earnest_deposited: 0,
                lender_funded: 0,
                inspection_passed: false,
                approvals: BTreeSet::new(),
                listed_at: now,
                updated_at: now,
            },
        );

        tracing::info!(
            asset_id,
            buyer = %buyer,
            purchase_price = %format_ether(purchase_price),
            escrow_amount = %format_ether(escrow_amount),
            "property listed"
        );
        self.record(EscrowEvent::Listed {
            asset_id,
            seller: self.seller,
            buyer: *buyer,
            purchase_price,
            escrow_amount,
        });
        Ok(())
    }

    /// Buyer pays earnest money into escrow.
    ///
    /// Deposits are additive and unbounded; reaching `escrow_amount` is the
    /// buyer's business, and only the purchase price is enforced (at
    /// finalize).
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`], [`EscrowError::Unauthorized`] for anyone
    /// but the listing's buyer, [`EscrowError::InvalidAmount`] for zero, and
    /// [`EscrowError::InsufficientFunds`] if the buyer cannot pay.
    pub fn deposit_earnest(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        amount: Amount,
    ) -> Result<Amount, EscrowError> {
        let listing = self.active(asset_id)?;
        if *caller != listing.buyer {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "deposit earnest",
            });
        }
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let deposited = listing
            .earnest_deposited
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow)?;

        let held = self.ledger.credit(asset_id, caller, amount)?;

        let listing = self.active_mut(asset_id)?;
        listing.earnest_deposited = deposited;
        listing.updated_at = Utc::now();

        tracing::info!(
            asset_id,
            amount = %format_ether(amount),
            held = %format_ether(held),
            "earnest deposited"
        );
        self.record(EscrowEvent::EarnestDeposited {
            asset_id,
            buyer: *caller,
            amount,
            held,
        });
        Ok(held)
    }

    /// Lender pays (part of) the purchase price into escrow.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`], [`EscrowError::Unauthorized`] for anyone
    /// but the lender, [`EscrowError::InvalidAmount`] for zero, and
    /// [`EscrowError::InsufficientFunds`] if the lender cannot pay.
    pub fn fund_sale(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        amount: Amount,
    ) -> Result<Amount, EscrowError> {
        let listing = self.active(asset_id)?;
        if *caller != listing.lender {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "fund a sale",
            });
        }
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let funded = listing
            .lender_funded
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow)?;

        let held = self.ledger.credit(asset_id, caller, amount)?;

        let listing = self.active_mut(asset_id)?;
        listing.lender_funded = funded;
        listing.updated_at = Utc::now();

        tracing::info!(
            asset_id,
            amount = %format_ether(amount),
            held = %format_ether(held),
            "sale funded by lender"
        );
        self.record(EscrowEvent::SaleFunded {
            asset_id,
            lender: *caller,
            amount,
            held,
        });
        Ok(held)
    }

    /// Inspector records the inspection result. The latest call wins.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] or [`EscrowError::Unauthorized`] for anyone
    /// but the inspector.
    pub fn update_inspection_status(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
        passed: bool,
    ) -> Result<(), EscrowError> {
        if *caller != self.active(asset_id)?.inspector {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "update the inspection status",
            });
        }

        let listing = self.active_mut(asset_id)?;
        listing.inspection_passed = passed;
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, passed, "inspection updated");
        self.record(EscrowEvent::InspectionUpdated {
            asset_id,
            inspector: *caller,
            passed,
        });
        Ok(())
    }

    /// Buyer, seller, or lender approves the sale. Approving twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] or [`EscrowError::Unauthorized`] for any
    /// other party.
    pub fn approve_sale(&mut self, caller: &Address, asset_id: AssetId) -> Result<(), EscrowError> {
        let listing = self.active(asset_id)?;
        let may_approve = [Role::Buyer, Role::Seller, Role::Lender]
            .into_iter()
            .any(|role| listing.approver(role) == Some(*caller));
        if !may_approve {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "approve the sale",
            });
        }
        if listing.has_approved(caller) {
            tracing::debug!(asset_id, party = %caller, "sale already approved");
            return Ok(());
        }

        let listing = self.active_mut(asset_id)?;
        listing.approvals.insert(*caller);
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, party = %caller, "sale approved");
        self.record(EscrowEvent::SaleApproved {
            asset_id,
            party: *caller,
        });
        Ok(())
    }

    /// Seller closes the sale: the token goes to the buyer and the purchase
    /// price to the seller.
    ///
    /// The price is drawn from the buyer's deposits first and the lender's
    /// funding second. Whatever each side put in beyond its share goes back
    /// to that side.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::NotListed`].
    /// - [`EscrowError::Unauthorized`] for anyone but the seller.
    /// - [`EscrowError::SaleNotReady`] listing every unmet precondition
    ///   (inspection, the three approvals, escrow ≥ purchase price).
    pub fn finalize_sale(
        &mut self,
        caller: &Address,
        asset_id: AssetId,
    ) -> Result<(), EscrowError> {
        let listing = self.active(asset_id)?;
        if *caller != listing.seller {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "finalize the sale",
            });
        }

        let blockers = self.blockers_for(listing);
        if !blockers.is_empty() {
            return Err(EscrowError::SaleNotReady { asset_id, blockers });
        }

        let (buyer, seller, lender) = (listing.buyer, listing.seller, listing.lender);
        let price = listing.purchase_price;
        let surplus = self.ledger.balance_of(asset_id).saturating_sub(price);
        let from_lender = price.saturating_sub(listing.earnest_deposited);
        let lender_refund = listing
            .lender_funded
            .saturating_sub(from_lender)
            .min(surplus);
        let buyer_refund = surplus - lender_refund;

        self.registry
            .transfer_ownership(&self.address, asset_id, &self.address, &buyer)?;
        let payouts = [(seller, price), (buyer, buyer_refund), (lender, lender_refund)];
        if let Err(err) = self.pay_out(asset_id, &payouts) {
            self.restore_custody(asset_id, &buyer);
            return Err(err);
        }

        let listing = self.active_mut(asset_id)?;
        listing.status = ListingStatus::Finalized;
        listing.updated_at = Utc::now();

        tracing::info!(
            asset_id,
            buyer = %buyer,
            price = %format_ether(price),
            buyer_refund = %format_ether(buyer_refund),
            lender_refund = %format_ether(lender_refund),
            "sale finalized"
        );
        self.record(EscrowEvent::SaleFinalized {
            asset_id,
            buyer,
            seller,
            purchase_price: price,
            buyer_refund,
            lender_refund,
        });
        Ok(())
    }

    /// Seller or buyer unwinds the sale.
    ///
    /// The token returns to the seller and lender funding to the lender. The
    /// buyer's deposits are refunded when the inspection has not passed.
    /// Once it has, the seller keeps up to the agreed earnest and the buyer
    /// gets the rest back.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] or [`EscrowError::Unauthorized`] for anyone
    /// but the seller and the buyer.
    pub fn cancel_sale(&mut self, caller: &Address, asset_id: AssetId) -> Result<(), EscrowError> {
        let listing = self.active(asset_id)?;
        if *caller != listing.seller && *caller != listing.buyer {
            return Err(EscrowError::Unauthorized {
                party: *caller,
                action: "cancel the sale",
            });
        }

        let (buyer, seller, lender) = (listing.buyer, listing.seller, listing.lender);
        let passed = listing.inspection_passed;
        let held = self.ledger.balance_of(asset_id);
        let lender_refund = listing.lender_funded.min(held);
        let earnest = held - lender_refund;
        let forfeited = if passed {
            earnest.min(listing.escrow_amount)
        } else {
            0
        };
        let buyer_refund = earnest - forfeited;

        self.registry
            .transfer_ownership(&self.address, asset_id, &self.address, &seller)?;
        let payouts = [(buyer, buyer_refund), (seller, forfeited), (lender, lender_refund)];
        if let Err(err) = self.pay_out(asset_id, &payouts) {
            self.restore_custody(asset_id, &seller);
            return Err(err);
        }

        let listing = self.active_mut(asset_id)?;
        listing.status = ListingStatus::Cancelled;
        listing.updated_at = Utc::now();

        tracing::info!(
            asset_id,
            cancelled_by = %caller,
            buyer_refund = %format_ether(buyer_refund),
            forfeited = %format_ether(forfeited),
            lender_refund = %format_ether(lender_refund),
            "sale cancelled"
        );
        self.record(EscrowEvent::SaleCancelled {
            asset_id,
            cancelled_by: *caller,
            buyer_refund,
            forfeited,
            lender_refund,
        });
        Ok(())
    }

    // -- Queries ------------------------------------------------------------

    /// The engine's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Address of the asset registry the engine trades on.
    pub fn nft_address(&self) -> Address {
        self.registry.address()
    }

    pub fn seller(&self) -> Address {
        self.seller
    }

    pub fn inspector(&self) -> Address {
        self.inspector
    }

    pub fn lender(&self) -> Address {
        self.lender
    }

    /// Whether `asset_id` currently has an active listing.
    pub fn is_listed(&self, asset_id: AssetId) -> bool {
        self.listings
            .get(&asset_id)
            .map(Listing::is_listed)
            .unwrap_or(false)
    }

    /// The listing record (active or settled), if the asset was ever listed.
    pub fn listing(&self, asset_id: AssetId) -> Option<&Listing> {
        self.listings.get(&asset_id)
    }

    /// All listings ever created, in asset id order.
    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }

    pub fn status(&self, asset_id: AssetId) -> Option<ListingStatus> {
        self.listings.get(&asset_id).map(|l| l.status)
    }

    pub fn buyer(&self, asset_id: AssetId) -> Option<Address> {
        self.listings.get(&asset_id).map(|l| l.buyer)
    }

    /// Purchase price, or 0 for an asset never listed.
    pub fn purchase_price(&self, asset_id: AssetId) -> Amount {
        self.listings
            .get(&asset_id)
            .map(|l| l.purchase_price)
            .unwrap_or(0)
    }

    /// Required earnest, or 0 for an asset never listed.
    pub fn escrow_amount(&self, asset_id: AssetId) -> Amount {
        self.listings
            .get(&asset_id)
            .map(|l| l.escrow_amount)
            .unwrap_or(0)
    }

    /// Whether `party` has approved the sale of `asset_id`.
    pub fn approval(&self, asset_id: AssetId, party: &Address) -> bool {
        self.listings
            .get(&asset_id)
            .map(|l| l.has_approved(party))
            .unwrap_or(false)
    }

    pub fn inspection_passed(&self, asset_id: AssetId) -> bool {
        self.listings
            .get(&asset_id)
            .map(|l| l.inspection_passed)
            .unwrap_or(false)
    }

    /// Funds held in escrow for one asset.
    pub fn balance_of(&self, asset_id: AssetId) -> Amount {
        self.ledger.balance_of(asset_id)
    }

    /// Funds held in escrow across all assets.
    pub fn get_balance(&self) -> Amount {
        self.ledger.total_held()
    }

    /// Unmet finalize preconditions for an active listing. Empty when the
    /// sale is ready, `None` when the asset is not listed.
    pub fn sale_blockers(&self, asset_id: AssetId) -> Option<Vec<Blocker>> {
        self.active(asset_id).ok().map(|l| self.blockers_for(l))
    }

    /// The full event log.
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Events concerning one asset, oldest first.
    pub fn events_for(&self, asset_id: AssetId) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(move |r| r.event.asset_id() == asset_id)
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Mutable access for the registry's own operations (minting,
    /// approvals). Custody of listed assets must not be touched through it.
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable access for the ledger's own operations (e.g. devnet
    /// airdrops).
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    // -- Internals ----------------------------------------------------------

    fn active(&self, asset_id: AssetId) -> Result<&Listing, EscrowError> {
        self.listings
            .get(&asset_id)
            .filter(|l| l.is_listed())
            .ok_or(EscrowError::NotListed(asset_id))
    }

    fn active_mut(&mut self, asset_id: AssetId) -> Result<&mut Listing, EscrowError> {
        self.listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed())
            .ok_or(EscrowError::NotListed(asset_id))
    }

    fn blockers_for(&self, listing: &Listing) -> Vec<Blocker> {
        let mut blockers = Vec::new();
        if !listing.inspection_passed {
            blockers.push(Blocker::InspectionNotPassed);
        }
        for role in [Role::Buyer, Role::Seller, Role::Lender] {
            if let Some(party) = listing.approver(role) {
                if !listing.has_approved(&party) {
                    blockers.push(Blocker::MissingApproval(role));
                }
            }
        }
        let held = self.ledger.balance_of(listing.asset_id);
        if held < listing.purchase_price {
            blockers.push(Blocker::Underfunded {
                held,
                required: listing.purchase_price,
            });
        }
        blockers
    }

    /// Pays each `(recipient, amount)` out of the asset's escrow holding.
    /// On failure, payments already made are pulled back before returning.
    fn pay_out(
        &mut self,
        asset_id: AssetId,
        payouts: &[(Address, Amount)],
    ) -> Result<(), EscrowError> {
        let mut paid: Vec<(Address, Amount)> = Vec::new();
        for &(recipient, amount) in payouts {
            if amount == 0 {
                continue;
            }
            if let Err(err) = self.ledger.debit(asset_id, &recipient, amount) {
                for (undo_to, undo_amount) in paid.into_iter().rev() {
                    if let Err(undo_err) = self.ledger.credit(asset_id, &undo_to, undo_amount) {
                        tracing::error!(
                            asset_id,
                            party = %undo_to,
                            error = %undo_err,
                            "failed to reverse payout"
                        );
                    }
                }
                return Err(err.into());
            }
            paid.push((recipient, amount));
        }
        Ok(())
    }

    fn restore_custody(&mut self, asset_id: AssetId, holder: &Address) {
        if let Err(err) = self
            .registry
            .transfer_ownership(holder, asset_id, holder, &self.address)
        {
            tracing::error!(asset_id, holder = %holder, error = %err, "failed to restore custody");
        }
    }

    fn record(&mut self, event: EscrowEvent) {
        let sequence = self.events.len() as u64;
        self.events.push(EventRecord {
            sequence,
            at: Utc::now(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ether;
    use crate::ledger::InMemoryLedger;
    use crate::real_estate::RealEstate;

    struct Parties {
        seller: Address,
        buyer: Address,
        inspector: Address,
        lender: Address,
    }

    fn parties() -> Parties {
        Parties {
            seller: Address::from_bytes([1; 20]),
            buyer: Address::from_bytes([2; 20]),
            inspector: Address::from_bytes([3; 20]),
            lender: Address::from_bytes([4; 20]),
        }
    }

    /// Engine with asset 1 minted to the seller, approved for the engine,
    /// and listed for 10 ether with 5 ether earnest.
    fn listed() -> (EscrowEngine<RealEstate, InMemoryLedger>, Parties) {
        let p = parties();
        let escrow_addr = Address::from_bytes([0xe5; 20]);
        let mut ledger = InMemoryLedger::new();
        for party in [p.buyer, p.lender] {
            ledger.airdrop(&party, ether(100)).unwrap();
        }
        let mut engine = EscrowEngine::new(
            escrow_addr,
            p.seller,
            p.inspector,
            p.lender,
            RealEstate::new(Address::from_bytes([0xee; 20])),
            ledger,
        );
        let id = engine.registry_mut().mint(&p.seller, "ipfs://1", None).unwrap();
        engine.registry_mut().approve(&p.seller, id, &escrow_addr).unwrap();
        engine.list(&p.seller, id, &p.buyer, ether(10), ether(5)).unwrap();
        (engine, p)
    }

    #[test]
    fn list_takes_custody() {
        let (engine, p) = listed();
        assert!(engine.is_listed(1));
        assert_eq!(engine.registry().owner_of(1), Some(engine.address()));
        assert_eq!(engine.buyer(1), Some(p.buyer));
        assert_eq!(engine.purchase_price(1), ether(10));
        assert_eq!(engine.escrow_amount(1), ether(5));
        assert!(!engine.inspection_passed(1));
        assert!(!engine.approval(1, &p.buyer));
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn relisting_active_asset_rejected() {
        let (mut engine, p) = listed();
        let err = engine
            .list(&p.seller, 1, &p.buyer, ether(10), ether(5))
            .unwrap_err();
        assert_eq!(err, EscrowError::AlreadyListed(1));
    }

    #[test]
    fn escrow_above_price_rejected() {
        let (mut engine, p) = listed();
        let id = engine.registry_mut().mint(&p.seller, "ipfs://2", None).unwrap();
        let err = engine
            .list(&p.seller, id, &p.buyer, ether(5), ether(6))
            .unwrap_err();
        assert!(matches!(err, EscrowError::InvalidTerms(_)));
        assert!(!engine.is_listed(id));
        assert_eq!(engine.registry().owner_of(id), Some(p.seller));
    }

    #[test]
    fn listing_without_registry_approval_rejected() {
        let (mut engine, p) = listed();
        let id = engine.registry_mut().mint(&p.seller, "ipfs://2", None).unwrap();
        let err = engine
            .list(&p.seller, id, &p.buyer, ether(5), ether(1))
            .unwrap_err();
        assert!(matches!(err, EscrowError::Registry(RegistryError::NotAuthorized { .. })));
        assert!(!engine.is_listed(id));
    }

    #[test]
    fn deposits_accumulate() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(5)).unwrap();
        let held = engine.deposit_earnest(&p.buyer, 1, ether(5)).unwrap();
        assert_eq!(held, ether(10));
        assert_eq!(engine.balance_of(1), ether(10));
        assert_eq!(engine.listing(1).unwrap().earnest_deposited, ether(10));
    }

    #[test]
    fn zero_deposit_rejected() {
        let (mut engine, p) = listed();
        assert_eq!(
            engine.deposit_earnest(&p.buyer, 1, 0),
            Err(EscrowError::InvalidAmount)
        );
    }

    #[test]
    fn deposit_beyond_means_rejected_without_side_effects() {
        let (mut engine, p) = listed();
        let err = engine.deposit_earnest(&p.buyer, 1, ether(101)).unwrap_err();
        assert_eq!(
            err,
            EscrowError::InsufficientFunds {
                required: ether(101),
                available: ether(100),
            }
        );
        assert_eq!(engine.balance_of(1), 0);
        assert_eq!(engine.listing(1).unwrap().earnest_deposited, 0);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn only_parties_may_approve() {
        let (mut engine, p) = listed();
        assert!(matches!(
            engine.approve_sale(&p.inspector, 1),
            Err(EscrowError::Unauthorized { .. })
        ));
        engine.approve_sale(&p.lender, 1).unwrap();
        assert!(engine.approval(1, &p.lender));
    }

    #[test]
    fn finalize_reports_every_blocker() {
        let (mut engine, p) = listed();
        let err = engine.finalize_sale(&p.seller, 1).unwrap_err();
        match err {
            EscrowError::SaleNotReady { asset_id, blockers } => {
                assert_eq!(asset_id, 1);
                assert_eq!(
                    blockers,
                    vec![
                        Blocker::InspectionNotPassed,
                        Blocker::MissingApproval(Role::Buyer),
                        Blocker::MissingApproval(Role::Seller),
                        Blocker::MissingApproval(Role::Lender),
                        Blocker::Underfunded {
                            held: 0,
                            required: ether(10),
                        },
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn finalize_returns_unused_lender_funding() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(7)).unwrap();
        engine.fund_sale(&p.lender, 1, ether(5)).unwrap();
        engine.update_inspection_status(&p.inspector, 1, true).unwrap();
        for party in [p.buyer, p.seller, p.lender] {
            engine.approve_sale(&party, 1).unwrap();
        }

        engine.finalize_sale(&p.seller, 1).unwrap();

        // 7 from the buyer, 3 from the lender.
        assert_eq!(engine.ledger().account_balance(&p.seller), ether(10));
        assert_eq!(engine.ledger().account_balance(&p.buyer), ether(93));
        assert_eq!(engine.ledger().account_balance(&p.lender), ether(97));
        assert_eq!(engine.balance_of(1), 0);
        assert_eq!(engine.status(1), Some(ListingStatus::Finalized));
        match &engine.events().last().unwrap().event {
            EscrowEvent::SaleFinalized {
                buyer_refund,
                lender_refund,
                ..
            } => {
                assert_eq!(*buyer_refund, 0);
                assert_eq!(*lender_refund, ether(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn finalize_refunds_buyer_overpayment() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(12)).unwrap();
        engine.update_inspection_status(&p.inspector, 1, true).unwrap();
        for party in [p.buyer, p.seller, p.lender] {
            engine.approve_sale(&party, 1).unwrap();
        }

        engine.finalize_sale(&p.seller, 1).unwrap();

        assert_eq!(engine.ledger().account_balance(&p.seller), ether(10));
        assert_eq!(engine.ledger().account_balance(&p.buyer), ether(90));
        assert_eq!(engine.ledger().account_balance(&p.lender), ether(100));
    }

    #[test]
    fn failed_refund_reverses_price_payout() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(12)).unwrap();
        engine.update_inspection_status(&p.inspector, 1, true).unwrap();
        for party in [p.buyer, p.seller, p.lender] {
            engine.approve_sale(&party, 1).unwrap();
        }
        // Leaves the buyer 1 ether short of the ceiling, so the 2 ether
        // refund overflows after the seller has been paid.
        engine
            .ledger_mut()
            .airdrop(&p.buyer, u128::MAX - ether(89))
            .unwrap();
        let events_before = engine.events().len();

        let err = engine.finalize_sale(&p.seller, 1).unwrap_err();

        assert_eq!(err, EscrowError::AmountOverflow);
        assert_eq!(engine.ledger().account_balance(&p.seller), 0);
        assert_eq!(engine.balance_of(1), ether(12));
        assert_eq!(engine.registry().owner_of(1), Some(engine.address()));
        assert_eq!(engine.status(1), Some(ListingStatus::Listed));
        assert_eq!(engine.events().len(), events_before);
    }

    #[test]
    fn cancel_after_passed_inspection_forfeits_earnest() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(5)).unwrap();
        engine.fund_sale(&p.lender, 1, ether(5)).unwrap();
        engine.update_inspection_status(&p.inspector, 1, true).unwrap();

        engine.cancel_sale(&p.buyer, 1).unwrap();

        assert_eq!(engine.ledger().account_balance(&p.seller), ether(5));
        assert_eq!(engine.ledger().account_balance(&p.buyer), ether(95));
        assert_eq!(engine.ledger().account_balance(&p.lender), ether(100));
        assert_eq!(engine.registry().owner_of(1), Some(p.seller));
        assert_eq!(engine.status(1), Some(ListingStatus::Cancelled));
    }

    #[test]
    fn forfeit_is_capped_at_agreed_earnest() {
        let (mut engine, p) = listed();
        engine.deposit_earnest(&p.buyer, 1, ether(8)).unwrap();
        engine.update_inspection_status(&p.inspector, 1, true).unwrap();

        engine.cancel_sale(&p.seller, 1).unwrap();

        assert_eq!(engine.ledger().account_balance(&p.seller), ether(5));
        assert_eq!(engine.ledger().account_balance(&p.buyer), ether(97));
        match &engine.events().last().unwrap().event {
            EscrowEvent::SaleCancelled {
                buyer_refund,
                forfeited,
                ..
            } => {
                assert_eq!(*forfeited, ether(5));
                assert_eq!(*buyer_refund, ether(3));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn settled_asset_cannot_be_relisted() {
        let (mut engine, p) = listed();
        engine.cancel_sale(&p.seller, 1).unwrap();
        engine
            .registry_mut()
            .approve(&p.seller, 1, &Address::from_bytes([0xe5; 20]))
            .unwrap();
        let err = engine
            .list(&p.seller, 1, &p.buyer, ether(10), ether(5))
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::AlreadySettled {
                asset_id: 1,
                status: ListingStatus::Cancelled,
            }
        );
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Lender".parse::<Role>().unwrap(), Role::Lender);
        assert!("notary".parse::<Role>().is_err());
        assert_eq!(Role::Inspector.to_string(), "inspector");
    }
}
