//! Plain-text rendering of deployments, listings, and the event log.
//!
//! Each view borrows what it shows and implements [`fmt::Display`], so the
//! command handlers decide where output goes (stdout for results, stderr
//! next to a rejection).

use std::fmt;

use realty_contracts::{
    format_ether, Address, EscrowEvent, EventRecord, FundsLedger, ListingStatus,
    PartyAction, Role, SaleProgress,
};

use crate::state::Deployment;

/// Addresses and spendable balances of every party.
pub struct AccountsView<'a>(pub &'a Deployment);

impl fmt::Display for AccountsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deployment = self.0;
        let engine = &deployment.engine;
        writeln!(f, "network  {}", deployment.network)?;
        writeln!(f, "registry {}", engine.nft_address())?;
        writeln!(
            f,
            "escrow   {}  (holding {} ETH)",
            engine.address(),
            format_ether(engine.get_balance())
        )?;
        writeln!(f)?;
        for (role, address) in &deployment.accounts {
            let owned = engine.registry().tokens_of(address);
            writeln!(
                f,
                "{:<10}{}  {:>12} ETH  {} propert{}",
                role.as_str(),
                address,
                format_ether(engine.ledger().account_balance(address)),
                owned.len(),
                if owned.len() == 1 { "y" } else { "ies" }
            )?;
        }
        Ok(())
    }
}

/// The sale progress view for one asset, with the viewer's next step when a
/// viewing role is given.
pub struct ProgressView<'a> {
    pub deployment: &'a Deployment,
    pub progress: &'a SaleProgress,
    pub viewer: Option<Role>,
}

impl fmt::Display for ProgressView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (deployment, progress) = (self.deployment, self.progress);
        let registry = deployment.engine.registry();

        let title = registry
            .metadata(progress.asset_id)
            .map(|m| format!(" - {}", m.name))
            .unwrap_or_default();
        writeln!(f, "Property #{}{}", progress.asset_id, title)?;
        if let Some(meta) = registry.metadata(progress.asset_id) {
            if !meta.address.is_empty() {
                writeln!(f, "  {}", meta.address)?;
            }
            let facts: Vec<String> = [
                meta.bedrooms().map(|n| format!("{} bds", n)),
                meta.bathrooms().map(|n| format!("{} ba", n)),
                meta.square_feet().map(|n| format!("{} sqft", n)),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !facts.is_empty() {
                writeln!(f, "  {}", facts.join(" | "))?;
            }
        }

        writeln!(f, "status     {}", progress.status)?;
        writeln!(f, "price      {} ETH", format_ether(progress.purchase_price))?;
        writeln!(f, "earnest    {} ETH", format_ether(progress.escrow_amount))?;
        writeln!(f, "held       {} ETH", format_ether(progress.held))?;
        if let Some(owner) = progress.owner {
            let owner_label = if progress.status == ListingStatus::Finalized {
                format!("owned by {}", deployment.label(&owner))
            } else {
                deployment.label(&owner)
            };
            writeln!(f, "owner      {}", owner_label)?;
        }

        writeln!(f)?;
        for party in &progress.parties {
            let mark = if party.approved { "x" } else { " " };
            let what = if party.role == Role::Inspector {
                "inspection passed"
            } else {
                "approved"
            };
            writeln!(
                f,
                "  [{}] {:<10}{}  {}",
                mark,
                party.role.as_str(),
                party.address.short(),
                what
            )?;
        }

        if !progress.blockers.is_empty() {
            writeln!(f)?;
            writeln!(f, "waiting on:")?;
            for blocker in &progress.blockers {
                writeln!(f, "  - {}", blocker)?;
            }
        }

        if let Some(role) = self.viewer {
            let action = deployment
                .address_of(role)
                .map(|address| progress.action_for(&address))
                .unwrap_or(PartyAction::None);
            writeln!(f)?;
            writeln!(f, "next for {}: {}", role, action)?;
        }
        Ok(())
    }
}

/// One line per event, oldest first.
pub struct EventsView<'a> {
    pub deployment: &'a Deployment,
    pub records: Vec<&'a EventRecord>,
}

impl fmt::Display for EventsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "no events");
        }
        for record in &self.records {
            writeln!(
                f,
                "#{:<4} {}  asset {:<4} {}",
                record.sequence,
                record.at.format("%Y-%m-%d %H:%M:%S"),
                record.event.asset_id(),
                describe(self.deployment, &record.event)
            )?;
        }
        Ok(())
    }
}

fn describe(deployment: &Deployment, event: &EscrowEvent) -> String {
    let label = |a: &Address| deployment.label(a);
    match event {
        EscrowEvent::Listed {
            buyer,
            purchase_price,
            escrow_amount,
            ..
        } => format!(
            "listed for {} ETH to {} (earnest {} ETH)",
            format_ether(*purchase_price),
            label(buyer),
            format_ether(*escrow_amount)
        ),
        EscrowEvent::EarnestDeposited { amount, held, .. } => format!(
            "earnest {} ETH deposited (held {} ETH)",
            format_ether(*amount),
            format_ether(*held)
        ),
        EscrowEvent::SaleFunded { amount, held, .. } => format!(
            "lender funded {} ETH (held {} ETH)",
            format_ether(*amount),
            format_ether(*held)
        ),
        EscrowEvent::InspectionUpdated { passed, .. } => {
            format!("inspection {}", if *passed { "passed" } else { "failed" })
        }
        EscrowEvent::SaleApproved { party, .. } => format!("approved by {}", label(party)),
        EscrowEvent::SaleFinalized {
            buyer,
            purchase_price,
            buyer_refund,
            lender_refund,
            ..
        } => format!(
            "sold to {} for {} ETH (buyer refund {}, lender refund {} ETH)",
            label(buyer),
            format_ether(*purchase_price),
            format_ether(*buyer_refund),
            format_ether(*lender_refund)
        ),
        EscrowEvent::SaleCancelled {
            cancelled_by,
            buyer_refund,
            forfeited,
            lender_refund,
            ..
        } => format!(
            "cancelled by {} (buyer refund {}, forfeited {}, lender refund {} ETH)",
            label(cancelled_by),
            format_ether(*buyer_refund),
            format_ether(*forfeited),
            format_ether(*lender_refund)
        ),
    }
}
