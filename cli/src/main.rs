// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Realty CLI
//!
//! Entry point for the `realty` binary. Parses CLI arguments, initializes
//! logging, loads the deployment from the data directory, applies one
//! command as one party, and writes the deployment back.
//!
//! A command either succeeds completely or changes nothing on disk: state is
//! only saved after every step of the command has been accepted. When the
//! engine rejects a step, the current sale progress is printed to stderr so
//! the party can see what is missing.

mod cli;
mod keys;
mod logging;
mod state;
mod view;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use realty_contracts::config::STATE_FORMAT_VERSION;
use realty_contracts::{
    format_ether, Address, AssetId, AssetRegistry, EscrowError, PropertyMetadata, Role,
    SaleProgress,
};

use cli::{Commands, RealtyCli};
use keys::PartyKey;
use logging::LogFormat;
use state::Deployment;
use view::{AccountsView, EventsView, ProgressView};

fn main() -> Result<()> {
    let cli = RealtyCli::parse();
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    let data_dir = cli.data_dir.as_path();
    match cli.command {
        Commands::Init(args) => init(data_dir, args),
        Commands::Accounts => {
            let deployment = Deployment::load(data_dir)?;
            print!("{}", AccountsView(&deployment));
            Ok(())
        }
        Commands::Mint(args) => mint(data_dir, args),
        Commands::List(args) => list(data_dir, args),
        Commands::Deposit(args) => deposit(data_dir, args),
        Commands::Fund(args) => fund(data_dir, args),
        Commands::Inspect(args) => inspect(data_dir, args),
        Commands::Approve(args) => approve(data_dir, args),
        Commands::Finalize(args) => finalize(data_dir, args.asset),
        Commands::Cancel(args) => cancel(data_dir, args),
        Commands::Buy(args) => buy(data_dir, args.asset),
        Commands::Lend(args) => lend(data_dir, args.asset),
        Commands::Sell(args) => sell(data_dir, args.asset),
        Commands::Show(args) => show(data_dir, args),
        Commands::Events(args) => events(data_dir, args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Generates a key per role and deploys a fresh marketplace.
fn init(data_dir: &Path, args: cli::InitArgs) -> Result<()> {
    if Deployment::exists(data_dir) && !args.force {
        bail!(
            "{} already holds a deployment (use --force to replace it)",
            data_dir.display()
        );
    }
    tracing::info!(
        data_dir = %data_dir.display(),
        network = %args.network,
        "initializing deployment"
    );

    let mut accounts = BTreeMap::new();
    for role in Role::ALL {
        let key = PartyKey::generate(role);
        let path = key.save(data_dir)?;
        tracing::info!(
            role = %key.role(),
            address = %key.address(),
            public_key = %key.public_key_hex(),
            key_path = %path.display(),
            "party key generated"
        );
        accounts.insert(key.role(), key.address());
    }

    let deployment = Deployment::create(&args.network, accounts)?;
    deployment.save(data_dir)?;

    println!("Marketplace initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", deployment.network);
    println!("  Registry       : {}", deployment.engine.nft_address());
    println!("  Escrow         : {}", deployment.engine.address());
    for (role, address) in &deployment.accounts {
        println!("  {:<15}: {}", role.as_str(), address);
    }
    Ok(())
}

fn mint(data_dir: &Path, args: cli::MintArgs) -> Result<()> {
    let (mut deployment, seller) = act_as(data_dir, Role::Seller)?;

    let metadata = match &args.metadata {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read metadata from {}", path.display()))?;
            let parsed: PropertyMetadata = serde_json::from_str(&text).with_context(|| {
                format!("{} is not a property metadata document", path.display())
            })?;
            Some(parsed)
        }
        None => None,
    };

    let id = deployment
        .engine
        .registry_mut()
        .mint(&seller, args.uri, metadata)?;
    deployment.save(data_dir)?;

    println!("Minted property #{} to seller {}", id, seller);
    Ok(())
}

/// Approves the engine on the registry (while the seller still holds the
/// token) and lists it.
fn list(data_dir: &Path, args: cli::ListArgs) -> Result<()> {
    let (mut deployment, seller) = act_as(data_dir, Role::Seller)?;
    let buyer = match args.buyer {
        Some(buyer) => buyer,
        None => deployment.address_of(Role::Buyer)?,
    };
    let asset = args.asset;

    let escrow = deployment.engine.address();
    if deployment.engine.registry().owner_of(asset) == Some(seller) {
        deployment
            .engine
            .registry_mut()
            .approve(&seller, asset, &escrow)
            .map_err(|e| rejected(&deployment, asset, e.into()))?;
    }
    deployment
        .engine
        .list(&seller, asset, &buyer, args.price, args.escrow)
        .map_err(|e| rejected(&deployment, asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Listed property #{} for {} ETH to {} (earnest {} ETH)",
        asset,
        format_ether(args.price),
        deployment.label(&buyer),
        format_ether(args.escrow)
    );
    Ok(())
}

fn deposit(data_dir: &Path, args: cli::AmountArgs) -> Result<()> {
    let (mut deployment, buyer) = act_as(data_dir, Role::Buyer)?;
    let held = deployment
        .engine
        .deposit_earnest(&buyer, args.asset, args.amount)
        .map_err(|e| rejected(&deployment, args.asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Deposited {} ETH earnest on property #{} (escrow holds {} ETH)",
        format_ether(args.amount),
        args.asset,
        format_ether(held)
    );
    Ok(())
}

fn fund(data_dir: &Path, args: cli::AmountArgs) -> Result<()> {
    let (mut deployment, lender) = act_as(data_dir, Role::Lender)?;
    let held = deployment
        .engine
        .fund_sale(&lender, args.asset, args.amount)
        .map_err(|e| rejected(&deployment, args.asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Funded {} ETH on property #{} (escrow holds {} ETH)",
        format_ether(args.amount),
        args.asset,
        format_ether(held)
    );
    Ok(())
}

fn inspect(data_dir: &Path, args: cli::InspectArgs) -> Result<()> {
    let (mut deployment, inspector) = act_as(data_dir, Role::Inspector)?;
    deployment
        .engine
        .update_inspection_status(&inspector, args.asset, args.passed)
        .map_err(|e| rejected(&deployment, args.asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Inspection of property #{} {}",
        args.asset,
        if args.passed { "passed" } else { "failed" }
    );
    Ok(())
}

fn approve(data_dir: &Path, args: cli::RoleArgs) -> Result<()> {
    let (mut deployment, party) = act_as(data_dir, args.role)?;
    deployment
        .engine
        .approve_sale(&party, args.asset)
        .map_err(|e| rejected(&deployment, args.asset, e))?;
    deployment.save(data_dir)?;

    println!("Sale of property #{} approved by {}", args.asset, args.role);
    Ok(())
}

fn finalize(data_dir: &Path, asset: AssetId) -> Result<()> {
    let (mut deployment, seller) = act_as(data_dir, Role::Seller)?;
    deployment
        .engine
        .finalize_sale(&seller, asset)
        .map_err(|e| rejected(&deployment, asset, e))?;
    deployment.save(data_dir)?;

    print_closing(&deployment, asset);
    Ok(())
}

fn cancel(data_dir: &Path, args: cli::RoleArgs) -> Result<()> {
    let (mut deployment, party) = act_as(data_dir, args.role)?;
    deployment
        .engine
        .cancel_sale(&party, args.asset)
        .map_err(|e| rejected(&deployment, args.asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Sale of property #{} cancelled by {}; property returned to the seller",
        args.asset, args.role
    );
    Ok(())
}

/// Buyer tops earnest up to the listing's escrow amount, then approves.
fn buy(data_dir: &Path, asset: AssetId) -> Result<()> {
    let (mut deployment, buyer) = act_as(data_dir, Role::Buyer)?;
    let deposited = deployment
        .engine
        .listing(asset)
        .map(|l| l.earnest_deposited)
        .unwrap_or(0);
    let remaining = deployment
        .engine
        .escrow_amount(asset)
        .saturating_sub(deposited);

    if remaining > 0 {
        deployment
            .engine
            .deposit_earnest(&buyer, asset, remaining)
            .map_err(|e| rejected(&deployment, asset, e))?;
    }
    deployment
        .engine
        .approve_sale(&buyer, asset)
        .map_err(|e| rejected(&deployment, asset, e))?;
    deployment.save(data_dir)?;

    println!(
        "Bought into property #{}: deposited {} ETH and approved",
        asset,
        format_ether(remaining)
    );
    Ok(())
}

/// Lender approves, then funds whatever the purchase price still lacks.
fn lend(data_dir: &Path, asset: AssetId) -> Result<()> {
    let (mut deployment, lender) = act_as(data_dir, Role::Lender)?;
    deployment
        .engine
        .approve_sale(&lender, asset)
        .map_err(|e| rejected(&deployment, asset, e))?;

    let shortfall = deployment
        .engine
        .purchase_price(asset)
        .saturating_sub(deployment.engine.balance_of(asset));
    if shortfall > 0 {
        deployment
            .engine
            .fund_sale(&lender, asset, shortfall)
            .map_err(|e| rejected(&deployment, asset, e))?;
    }
    deployment.save(data_dir)?;

    println!(
        "Approved and lent {} ETH on property #{}",
        format_ether(shortfall),
        asset
    );
    Ok(())
}

/// Seller approves and closes in one go.
fn sell(data_dir: &Path, asset: AssetId) -> Result<()> {
    let (mut deployment, seller) = act_as(data_dir, Role::Seller)?;
    deployment
        .engine
        .approve_sale(&seller, asset)
        .map_err(|e| rejected(&deployment, asset, e))?;
    deployment
        .engine
        .finalize_sale(&seller, asset)
        .map_err(|e| rejected(&deployment, asset, e))?;
    deployment.save(data_dir)?;

    print_closing(&deployment, asset);
    Ok(())
}

fn show(data_dir: &Path, args: cli::ShowArgs) -> Result<()> {
    let deployment = Deployment::load(data_dir)?;
    let progress = SaleProgress::fetch(&deployment.engine, args.asset)
        .with_context(|| format!("property #{} has never been listed", args.asset))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
    } else {
        let view = ProgressView {
            deployment: &deployment,
            progress: &progress,
            viewer: args.role,
        };
        print!("{}", view);
    }
    Ok(())
}

fn events(data_dir: &Path, args: cli::EventsArgs) -> Result<()> {
    let deployment = Deployment::load(data_dir)?;
    let records: Vec<_> = deployment
        .engine
        .events()
        .iter()
        .filter(|r| args.asset.map_or(true, |id| r.event.asset_id() == id))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        let view = EventsView {
            deployment: &deployment,
            records,
        };
        print!("{}", view);
    }
    Ok(())
}

/// Loads the deployment and the key for `role`, and checks that the key
/// controls the address the deployment has on record for that role.
fn act_as(data_dir: &Path, role: Role) -> Result<(Deployment, Address)> {
    let deployment = Deployment::load(data_dir)?;
    let key = PartyKey::load(data_dir, role)?;
    let expected = deployment.address_of(role)?;
    if key.address() != expected {
        bail!(
            "{} key controls {}, but the deployment's {} is {}",
            role,
            key.address(),
            role,
            expected
        );
    }
    tracing::debug!(role = %role, address = %expected, "acting party loaded");
    Ok((deployment, expected))
}

/// Logs a rejection, shows the sale as it stands, and turns the error into
/// the command's failure.
fn rejected(deployment: &Deployment, asset: AssetId, err: EscrowError) -> anyhow::Error {
    tracing::warn!(asset_id = asset, error = %err, "operation rejected");
    if let Some(progress) = SaleProgress::fetch(&deployment.engine, asset) {
        let view = ProgressView {
            deployment,
            progress: &progress,
            viewer: None,
        };
        eprintln!("{}", view);
    }
    anyhow::Error::new(err)
}

fn print_closing(deployment: &Deployment, asset: AssetId) {
    let price = deployment.engine.purchase_price(asset);
    let owner = deployment
        .engine
        .registry()
        .owner_of(asset)
        .map(|a| deployment.label(&a))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Sold property #{} for {} ETH; now owned by {}",
        asset,
        format_ether(price),
        owner
    );
}

/// Prints version information to stdout.
fn print_version() {
    println!("realty        {}", env!("CARGO_PKG_VERSION"));
    println!("state format  {}", STATE_FORMAT_VERSION);
    println!("rustc         {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
