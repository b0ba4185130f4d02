//! # Realty Contracts
//!
//! Contract logic for a small property marketplace. A seller lists a
//! property token, a buyer pays earnest money, an inspector signs off, a
//! lender covers the rest, and the escrow engine swaps the token for the
//! purchase price once everyone has agreed.
//!
//! - **Escrow** ([`escrow`]): the per-asset sale state machine.
//! - **Real Estate** ([`real_estate`]): the property token registry the
//!   engine takes custody through.
//! - **Ledger** ([`ledger`]): native-currency accounts and per-asset escrow
//!   holdings.
//! - **Progress** ([`progress`]): what each party should do next.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Amounts are `u128` base units and
//!    never wrap.
//! 2. Every operation validates before it mutates. A rejected call leaves
//!    no trace, not even an event.
//! 3. Authorization is a comparison against the parties bound at deployment
//!    and listing. There is no ambient caller.
//! 4. Every public state type is serializable (serde) so a deployment can
//!    be persisted as a whole.

pub mod address;
pub mod config;
pub mod escrow;
pub mod events;
pub mod ledger;
pub mod metadata;
pub mod progress;
pub mod real_estate;
pub mod registry;

pub use address::Address;
pub use config::{ether, format_ether, parse_ether, Amount};
pub use escrow::{Blocker, EscrowEngine, EscrowError, Listing, ListingStatus, Role};
pub use events::{EscrowEvent, EventRecord};
pub use ledger::{FundsLedger, InMemoryLedger, LedgerError};
pub use metadata::PropertyMetadata;
pub use progress::{PartyAction, SaleProgress};
pub use real_estate::RealEstate;
pub use registry::{AssetId, AssetRegistry, RegistryError};

/// The engine as deployed by the CLI: the property registry plus an
/// in-memory ledger.
pub type Marketplace = EscrowEngine<RealEstate, InMemoryLedger>;
