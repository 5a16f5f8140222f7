use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{InMemoryCustody, LedgerService};
use crate::domain::{
    format_amount, parse_amount, required_approvals, Amount, ApprovalOutcome, Principal,
    TransactionId, WalletError, WalletId,
};
use crate::storage::Repository;

/// Coffer - shared wallets with quorum-approved payouts
#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "A pooled-funds ledger where payouts need a majority of members")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COFFER_DATABASE", default_value = "coffer.db")]
    pub database: String,

    /// Principal the command is executed as
    #[arg(long = "as", env = "COFFER_PRINCIPAL", global = true)]
    pub principal: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Join a wallet with an initial contribution
    Join {
        /// Wallet ID
        wallet: WalletId,

        /// Contribution (at least the wallet's minimum deposit)
        amount: String,
    },

    /// Add funds to a wallet you are a member of
    Fund {
        /// Wallet ID
        wallet: WalletId,

        /// Amount to add
        amount: String,
    },

    /// Leave a wallet and get your balance back
    Leave {
        /// Wallet ID
        wallet: WalletId,
    },

    /// Request a payout from a wallet
    Request {
        /// Wallet ID
        wallet: WalletId,

        /// Amount to send
        value: String,

        /// Destination address
        #[arg(long)]
        to: String,

        /// Description of the payout
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Approve a pending payout
    Approve {
        /// Wallet ID
        wallet: WalletId,

        /// Transaction ID within the wallet
        transaction: TransactionId,
    },

    /// List the payouts of a wallet
    Transactions {
        /// Wallet ID
        wallet: WalletId,

        /// Only show pending payouts
        #[arg(long)]
        pending: bool,
    },

    /// Show detailed payout information
    #[command(name = "tx")]
    ShowTransaction {
        /// Wallet ID
        wallet: WalletId,

        /// Transaction ID within the wallet
        transaction: TransactionId,
    },

    /// Show member balances of a wallet
    Balance {
        /// Wallet ID
        wallet: WalletId,

        /// Only show this member
        #[arg(long)]
        member: Option<String>,
    },

    /// Show whether a principal approved a payout
    Approval {
        /// Wallet ID
        wallet: WalletId,

        /// Transaction ID within the wallet
        transaction: TransactionId,

        /// Principal to check (defaults to --as)
        principal: Option<String>,
    },

    /// Show the command journal, optionally for one wallet
    History {
        /// Wallet ID
        wallet: Option<WalletId>,
    },

    /// Verify ledger and journal integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: wallets, members, transactions, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create {
        /// Minimum contribution required to join
        #[arg(short, long, default_value = "0")]
        min_deposit: String,
    },

    /// List all wallets
    List,

    /// Show detailed wallet information
    Show {
        /// Wallet ID
        wallet: WalletId,
    },
}

/// Install the log subscriber. `RUST_LOG` takes precedence over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// A ledger rebuilt from the database journal for one command.
struct Session {
    repo: Repository,
    service: LedgerService,
    persisted: usize,
}

impl Session {
    async fn open(database: &str) -> Result<Self> {
        let repo = Repository::connect(&format!("sqlite:{}", database))
            .await
            .with_context(|| format!("Cannot open database '{}'. Run `coffer init` first", database))?;
        let entries = repo.list_entries().await?;
        let service = LedgerService::replay(&entries, Arc::new(InMemoryCustody::new()))
            .await
            .context("Failed to rebuild ledger from journal")?;
        tracing::debug!(entries = entries.len(), "ledger loaded");

        Ok(Self {
            repo,
            service,
            persisted: entries.len(),
        })
    }

    /// Persist everything committed since the session was opened.
    async fn commit(&self) -> Result<()> {
        let fresh = self.service.journal_since(self.persisted).await;
        self.repo.append_entries(&fresh).await
    }
}

fn require_principal(principal: Option<&Principal>) -> Result<&Principal> {
    principal.context("No principal given. Pass --as <PRINCIPAL> or set COFFER_PRINCIPAL")
}

fn parse_amount_arg(input: &str) -> Result<Amount> {
    parse_amount(input).with_context(|| format!("Invalid amount '{}'. Use e.g. '1000' or '1_000'", input))
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if matches!(self.command, Commands::Init) {
            Repository::init(&format!("sqlite:{}?mode=rwc", self.database)).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let caller = self.principal.map(Principal::from);
        let session = Session::open(&self.database).await?;

        // Approvals can fail after committing, so persist regardless of the outcome
        let result = run_command(&session, caller.as_ref(), self.command).await;
        session.commit().await?;
        result
    }
}

async fn run_command(
    session: &Session,
    caller: Option<&Principal>,
    command: Commands,
) -> Result<()> {
    let service = &session.service;

    match command {
        Commands::Init => {}

        Commands::Wallet(wallet_cmd) => {
            run_wallet_command(service, caller, wallet_cmd).await?;
        }

        Commands::Join { wallet, amount } => {
            let caller = require_principal(caller)?;
            let contribution = parse_amount_arg(&amount)?;
            let change = service.join_wallet(caller, wallet, contribution).await?;
            println!(
                "Joined wallet {} with {} (wallet balance: {})",
                wallet,
                format_amount(change.amount),
                format_amount(change.wallet_balance_after)
            );
        }

        Commands::Fund { wallet, amount } => {
            let caller = require_principal(caller)?;
            let amount = parse_amount_arg(&amount)?;
            let change = service.fund_wallet(caller, wallet, amount).await?;
            println!(
                "Funded wallet {} with {} (your balance: {})",
                wallet,
                format_amount(change.amount),
                format_amount(change.member_balance_after)
            );
        }

        Commands::Leave { wallet } => {
            let caller = require_principal(caller)?;
            let change = service.leave_wallet(caller, wallet).await?;
            println!(
                "Left wallet {}, refunded {}",
                wallet,
                format_amount(change.amount)
            );
        }

        Commands::Request {
            wallet,
            value,
            to,
            description,
        } => {
            let caller = require_principal(caller)?;
            let value = parse_amount_arg(&value)?;
            let id = service
                .request_transaction(caller, wallet, description, Principal::from(to), value)
                .await?;
            println!(
                "Requested transaction {} in wallet {}: {}",
                id,
                wallet,
                format_amount(value)
            );
        }

        Commands::Approve {
            wallet,
            transaction,
        } => {
            let caller = require_principal(caller)?;
            let outcome = match service.approve_transaction(caller, wallet, transaction).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    if let Some(WalletError::InsufficientWalletBalance { balance, required }) =
                        err.wallet_error()
                    {
                        println!(
                            "Approval of transaction {} recorded, but the wallet holds {} of the {} needed",
                            transaction,
                            format_amount(*balance),
                            format_amount(*required)
                        );
                        println!("  Fund the wallet; the next approval will try to send it again");
                    }
                    return Err(err.into());
                }
            };
            match outcome {
                ApprovalOutcome::Recorded {
                    num_approvals,
                    required,
                } => println!(
                    "Approved transaction {} ({} of {} approvals)",
                    transaction, num_approvals, required
                ),
                ApprovalOutcome::Settled(settlement) => {
                    println!(
                        "Approved and sent transaction {}: {} -> {}",
                        transaction,
                        format_amount(settlement.value),
                        settlement.destination
                    );
                    println!(
                        "  Charged {} to each of {} members",
                        format_amount(settlement.share),
                        settlement.charges.len()
                    );
                    if settlement.remainder > 0 {
                        println!(
                            "  Uncharged remainder: {}",
                            format_amount(settlement.remainder)
                        );
                    }
                }
                ApprovalOutcome::Underfunded { .. } => {}
            }
        }

        Commands::Transactions { wallet, pending } => {
            run_transactions_command(service, wallet, pending).await?;
        }

        Commands::ShowTransaction {
            wallet,
            transaction,
        } => {
            run_show_transaction_command(service, wallet, transaction).await?;
        }

        Commands::Balance { wallet, member } => {
            run_balance_command(service, wallet, member).await?;
        }

        Commands::Approval {
            wallet,
            transaction,
            principal,
        } => {
            let principal = match principal {
                Some(p) => Principal::from(p),
                None => require_principal(caller)?.clone(),
            };
            let approved = service
                .get_approval(wallet, transaction, &principal)
                .await?;
            println!(
                "{} {} transaction {} in wallet {}",
                principal,
                if approved { "approved" } else { "has not approved" },
                transaction,
                wallet
            );
        }

        Commands::History { wallet } => {
            run_history_command(&session.repo, wallet).await?;
        }

        Commands::Check => {
            run_check_command(session).await?;
        }

        Commands::Export {
            export_type,
            output,
        } => {
            run_export_command(service, &export_type, output.as_deref()).await?;
        }
    }

    Ok(())
}

async fn run_wallet_command(
    service: &LedgerService,
    caller: Option<&Principal>,
    cmd: WalletCommands,
) -> Result<()> {
    match cmd {
        WalletCommands::Create { min_deposit } => {
            let caller = require_principal(caller)?;
            let min_deposit = parse_amount_arg(&min_deposit)?;
            let id = service.create_wallet(caller, min_deposit).await?;
            println!(
                "Created wallet {} (minimum deposit: {})",
                id,
                format_amount(min_deposit)
            );
        }

        WalletCommands::List => {
            let wallets = service.list_wallets().await;
            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!(
                    "{:<6} {:>14} {:>12} {:>8} {:>6}",
                    "ID", "BALANCE", "MIN DEPOSIT", "MEMBERS", "TXS"
                );
                println!("{}", "-".repeat(50));
                for wallet in wallets {
                    println!(
                        "{:<6} {:>14} {:>12} {:>8} {:>6}",
                        wallet.id,
                        format_amount(wallet.balance),
                        format_amount(wallet.min_deposit),
                        wallet.member_count(),
                        wallet.transactions.len()
                    );
                }
            }
        }

        WalletCommands::Show { wallet } => {
            let info = service.get_wallet_info(wallet).await?;
            let wallet = &info.wallet;

            println!("Wallet: {}", wallet.id);
            println!("  Created by:     {}", wallet.created_by);
            println!(
                "  Created:        {}",
                wallet.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Min deposit:    {}", format_amount(wallet.min_deposit));
            println!("  Balance:        {}", format_amount(wallet.balance));
            if wallet.dust > 0 {
                println!("  Absorbed dust:  {}", format_amount(wallet.dust));
            }
            println!("  Members:        {}", wallet.member_count());
            println!(
                "  Transactions:   {} ({} pending, {} sent)",
                wallet.transactions.len(),
                info.pending_count,
                info.settled_count
            );
            println!("  Total sent:     {}", format_amount(info.total_sent));
        }
    }
    Ok(())
}

async fn run_balance_command(
    service: &LedgerService,
    wallet: WalletId,
    member: Option<String>,
) -> Result<()> {
    match member {
        Some(member) => {
            let principal = Principal::from(member);
            let balance = service.balance_of(wallet, &principal).await?;
            let status = if service.is_wallet_member(wallet, &principal).await? {
                ""
            } else {
                " (not a member)"
            };
            println!("{}: {}{}", principal, format_amount(balance), status);
        }
        None => {
            let members = service.members(wallet).await?;
            if members.is_empty() {
                println!("Wallet {} has no members.", wallet);
            } else {
                println!("{:<30} {:>14}", "MEMBER", "BALANCE");
                println!("{}", "-".repeat(45));
                for entry in members {
                    println!(
                        "{:<30} {:>14}",
                        truncate(entry.principal.as_str(), 30),
                        format_amount(entry.balance)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_transactions_command(
    service: &LedgerService,
    wallet: WalletId,
    pending_only: bool,
) -> Result<()> {
    let wallet_snapshot = service.get_wallet(wallet).await?;
    let transactions: Vec<_> = wallet_snapshot
        .transactions
        .iter()
        .filter(|tx| !pending_only || tx.is_pending())
        .collect();

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let required = required_approvals(wallet_snapshot.member_count());
    println!(
        "{:<5} {:>12} {:<9} {:>9} {:<20} DESCRIPTION",
        "ID", "VALUE", "STATUS", "APPROVALS", "TO"
    );
    println!("{}", "-".repeat(75));
    for tx in transactions {
        println!(
            "{:<5} {:>12} {:<9} {:>9} {:<20} {}",
            tx.id,
            format_amount(tx.value),
            tx.status().as_str(),
            format!("{}/{}", wallet_snapshot.counted_approvals(tx), required),
            truncate(tx.destination.as_str(), 20),
            truncate(&tx.description, 30)
        );
    }
    Ok(())
}

async fn run_show_transaction_command(
    service: &LedgerService,
    wallet: WalletId,
    transaction: TransactionId,
) -> Result<()> {
    let snapshot = service.get_wallet(wallet).await?;
    let tx = snapshot.transaction(transaction)?;

    println!("Transaction: {} (wallet {})", tx.id, tx.wallet_id);
    println!("  Status:      {}", tx.status());
    println!("  Value:       {}", format_amount(tx.value));
    println!("  Requester:   {}", tx.requester);
    println!("  Destination: {}", tx.destination);
    if !tx.description.is_empty() {
        println!("  Description: {}", tx.description);
    }
    println!(
        "  Requested:   {}",
        tx.requested_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(settled) = tx.settled_at {
        println!("  Sent:        {}", settled.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "  Approvals:   {} ({} from current members, {} needed)",
        tx.num_approvals(),
        snapshot.counted_approvals(tx),
        required_approvals(snapshot.member_count())
    );
    for approver in &tx.approvals {
        if snapshot.is_member(approver) {
            println!("    - {}", approver);
        } else {
            println!("    - {} (left)", approver);
        }
    }
    Ok(())
}

async fn run_history_command(repo: &Repository, wallet: Option<WalletId>) -> Result<()> {
    let entries = match wallet {
        Some(wallet_id) => repo.list_entries_for_wallet(wallet_id).await?,
        None => repo.list_entries().await?,
    };
    let total = repo.count_entries().await?;

    if entries.is_empty() {
        println!("No journal entries found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<20} {:<22} {:>6}",
        "SEQ", "RECORDED", "PRINCIPAL", "COMMAND", "WALLET"
    );
    println!("{}", "-".repeat(78));
    for entry in &entries {
        println!(
            "{:<6} {:<20} {:<20} {:<22} {:>6}",
            entry.sequence,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(entry.principal.as_str(), 20),
            entry.command.name(),
            entry
                .command
                .wallet_id()
                .map(|id| id.to_string())
                .unwrap_or_default()
        );
    }
    println!("\n{} of {} entries", entries.len(), total);
    Ok(())
}

async fn run_check_command(session: &Session) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = session.service.check_integrity().await;
    let stats = session.repo.get_integrity_stats().await?;

    println!("Wallets:      {}", report.wallet_count);
    println!("Members:      {}", report.member_count);
    println!(
        "Transactions: {} ({} pending, {} sent)",
        report.transaction_count, report.pending_count, report.settled_count
    );
    println!("Pooled:       {}", format_amount(report.total_pooled));
    if report.total_dust > 0 {
        println!("Dust:         {}", format_amount(report.total_dust));
    }
    println!("Journal:      {} entries", stats.entry_count);
    println!();

    let mut issues = report.issues;
    issues.extend(stats.issues());

    if issues.is_empty() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "wallets" => {
            let count = exporter.export_wallets_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} wallets", count);
            }
        }
        "members" => {
            let count = exporter.export_members_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} members", count);
            }
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} wallets, {} journal entries",
                    snapshot.wallets.len(),
                    snapshot.journal.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: wallets, members, transactions, full",
                export_type
            );
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
