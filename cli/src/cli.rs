//! # CLI Interface
//!
//! Defines the command-line argument structure for `realty` using `clap`
//! derive. Each subcommand acts as exactly one party; the acting party is
//! fixed by the subcommand (or `--as`) and proven by its key file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use realty_contracts::config::DEFAULT_NETWORK;
use realty_contracts::{parse_ether, Address, Amount, AssetId, Role};

/// Property marketplace on a local devnet.
///
/// Mint property tokens, list them for sale, and walk a sale through
/// earnest deposit, inspection, approvals, lender funding, and closing.
#[derive(Parser, Debug)]
#[command(
    name = "realty",
    about = "Property marketplace with multi-party escrow",
    version,
    propagate_version = true
)]
pub struct RealtyCli {
    /// Directory holding the deployment state and the party key files.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "REALTY_DATA_DIR",
        default_value = ".realty"
    )]
    pub data_dir: PathBuf,

    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "REALTY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate party keys and deploy the registry and escrow engine.
    Init(InitArgs),
    /// Show every party's address and balance.
    Accounts,
    /// Mint a property token to the seller.
    Mint(MintArgs),
    /// List a property for sale (as seller).
    List(ListArgs),
    /// Deposit earnest money (as buyer).
    Deposit(AmountArgs),
    /// Fund the sale (as lender).
    Fund(AmountArgs),
    /// Record the inspection result (as inspector).
    Inspect(InspectArgs),
    /// Approve the sale as buyer, seller, or lender.
    Approve(RoleArgs),
    /// Close the sale (as seller).
    Finalize(AssetArgs),
    /// Cancel the sale as seller or buyer.
    Cancel(RoleArgs),
    /// Deposit the remaining earnest and approve (as buyer).
    Buy(AssetArgs),
    /// Approve and fund the rest of the purchase price (as lender).
    Lend(AssetArgs),
    /// Approve and close the sale (as seller).
    Sell(AssetArgs),
    /// Show the progress of a sale.
    Show(ShowArgs),
    /// Print the escrow event log.
    Events(EventsArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Network label recorded in the deployment.
    #[arg(long, default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Overwrite an existing deployment and its keys.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `mint` subcommand.
#[derive(Args, Debug)]
pub struct MintArgs {
    /// Metadata URI stored on the token.
    #[arg(long)]
    pub uri: String,

    /// Local copy of the metadata document (JSON).
    #[arg(long)]
    pub metadata: Option<PathBuf>,
}

/// Arguments for the `list` subcommand.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Token id of the property.
    pub asset: AssetId,

    /// Purchase price in ETH.
    #[arg(long, value_parser = parse_amount)]
    pub price: Amount,

    /// Earnest money the buyer must deposit, in ETH.
    #[arg(long, value_parser = parse_amount)]
    pub escrow: Amount,

    /// Buyer address. Defaults to the deployment's buyer account.
    #[arg(long)]
    pub buyer: Option<Address>,
}

/// An asset and an ETH amount.
#[derive(Args, Debug)]
pub struct AmountArgs {
    pub asset: AssetId,

    /// Amount in ETH, e.g. `5` or `0.25`.
    #[arg(long, value_parser = parse_amount)]
    pub amount: Amount,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    pub asset: AssetId,

    /// Whether the property passed inspection.
    #[arg(long, action = clap::ArgAction::Set)]
    pub passed: bool,
}

/// An asset and the role acting on it.
#[derive(Args, Debug)]
pub struct RoleArgs {
    pub asset: AssetId,

    /// Role to act as.
    #[arg(long = "as", value_name = "ROLE")]
    pub role: Role,
}

/// Just an asset.
#[derive(Args, Debug)]
pub struct AssetArgs {
    pub asset: AssetId,
}

/// Arguments for the `show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    pub asset: AssetId,

    /// Also show the next step for this role.
    #[arg(long = "as", value_name = "ROLE")]
    pub role: Option<Role>,

    /// Print the progress snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `events` subcommand.
#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Only events for this asset.
    #[arg(long)]
    pub asset: Option<AssetId>,

    /// Print the records as JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_amount(s: &str) -> Result<Amount, String> {
    parse_ether(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use realty_contracts::ether;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        RealtyCli::command().debug_assert();
    }

    #[test]
    fn amounts_parse_as_ether() {
        let cli = RealtyCli::try_parse_from([
            "realty", "list", "1", "--price", "20", "--escrow", "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.price, ether(20));
                assert_eq!(args.escrow, ether(1) / 2);
                assert!(args.buyer.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn role_flag_parses() {
        let cli = RealtyCli::try_parse_from(["realty", "approve", "3", "--as", "lender"]).unwrap();
        match cli.command {
            Commands::Approve(args) => {
                assert_eq!(args.asset, 3);
                assert_eq!(args.role, Role::Lender);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(RealtyCli::try_parse_from(["realty", "approve", "3", "--as", "notary"]).is_err());
    }

    #[test]
    fn inspect_requires_explicit_result() {
        assert!(RealtyCli::try_parse_from(["realty", "inspect", "1", "--passed"]).is_err());
        let cli =
            RealtyCli::try_parse_from(["realty", "inspect", "1", "--passed", "false"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect(InspectArgs { passed: false, .. })));
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = RealtyCli::try_parse_from([
            "realty",
            "accounts",
            "--data-dir",
            "/tmp/realty",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/realty"));
        assert_eq!(cli.log_format, "json");
    }
}
