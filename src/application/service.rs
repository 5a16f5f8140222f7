use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::{
    build_integrity_report, Amount, ApprovalOutcome, BalanceChange, IntegrityReport,
    JournalEntry, LedgerCommand, Principal, Transaction, TransactionId, Wallet, WalletError,
    WalletId,
};

use super::{AppError, Custody, InMemoryCustody};

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
///
/// Wallets live in an append-only arena indexed by `WalletId`. Each wallet sits
/// behind its own lock, so mutations of one wallet are serialized while
/// different wallets proceed in parallel.
pub struct LedgerService {
    wallets: RwLock<Vec<Arc<Mutex<Wallet>>>>,
    custody: Arc<dyn Custody>,
    journal: Mutex<Vec<JournalEntry>>,
}

/// A member and the balance they hold in a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub principal: Principal,
    pub balance: Amount,
}

/// Detailed wallet information
pub struct WalletInfo {
    pub wallet: Wallet,
    pub pending_count: usize,
    pub settled_count: usize,
    pub total_sent: Amount,
}

/// Whether an operation moves external funds through custody.
/// Replayed commands already moved theirs when they were first committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Funds {
    Move,
    Skip,
}

fn reject(wallet_id: WalletId, err: WalletError) -> AppError {
    match &err {
        WalletError::InvariantViolation(detail) => {
            error!(wallet_id, %detail, "operation aborted on invariant violation");
        }
        _ => debug!(wallet_id, error = %err, "operation rejected"),
    }
    AppError::Wallet(err)
}

impl LedgerService {
    /// Create an empty ledger backed by the given custody provider.
    pub fn new(custody: Arc<dyn Custody>) -> Self {
        Self {
            wallets: RwLock::new(Vec::new()),
            custody,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty ledger with a fresh in-memory custody, returned alongside.
    pub fn in_memory() -> (Self, Arc<InMemoryCustody>) {
        let custody = Arc::new(InMemoryCustody::new());
        (Self::new(custody.clone()), custody)
    }

    /// Rebuild a ledger by re-applying journal entries in order.
    ///
    /// Replay only rebuilds ledger state: no funds move through `custody`,
    /// which is used for operations issued after the replay.
    ///
    /// An approval that hit an underfunded wallet was still committed, so that
    /// failure is expected here. Any other failure means the journal does not
    /// describe a reachable ledger state.
    pub async fn replay(
        entries: &[JournalEntry],
        custody: Arc<dyn Custody>,
    ) -> Result<Self, AppError> {
        let service = Self::new(custody);

        for entry in entries {
            let result = service
                .replay_command(&entry.principal, &entry.command, entry.recorded_at)
                .await;
            match result {
                Ok(()) => {}
                Err(AppError::Wallet(WalletError::InsufficientWalletBalance { .. }))
                    if matches!(entry.command, LedgerCommand::ApproveTransaction { .. }) => {}
                Err(err) => {
                    return Err(AppError::Journal(format!(
                        "entry {} ({}): {}",
                        entry.sequence,
                        entry.command.name(),
                        err
                    )));
                }
            }
        }

        // Keep the original entry ids and timestamps
        *service.journal.lock().await = entries.to_vec();
        debug!(entries = entries.len(), "journal replayed");
        Ok(service)
    }

    async fn replay_command(
        &self,
        caller: &Principal,
        command: &LedgerCommand,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match command {
            LedgerCommand::CreateWallet { min_deposit } => {
                self.create_wallet_at(caller, *min_deposit, at).await?;
            }
            LedgerCommand::JoinWallet {
                wallet_id,
                contribution,
            } => {
                self.join_wallet_at(caller, *wallet_id, *contribution, at, Funds::Skip)
                    .await?;
            }
            LedgerCommand::FundWallet { wallet_id, amount } => {
                self.fund_wallet_at(caller, *wallet_id, *amount, at, Funds::Skip)
                    .await?;
            }
            LedgerCommand::LeaveWallet { wallet_id } => {
                self.leave_wallet_at(caller, *wallet_id, at, Funds::Skip)
                    .await?;
            }
            LedgerCommand::RequestTransaction {
                wallet_id,
                description,
                destination,
                value,
            } => {
                self.request_transaction_at(
                    caller,
                    *wallet_id,
                    description.clone(),
                    destination.clone(),
                    *value,
                    at,
                )
                .await?;
            }
            LedgerCommand::ApproveTransaction {
                wallet_id,
                transaction_id,
            } => {
                self.approve_transaction_at(caller, *wallet_id, *transaction_id, at, Funds::Skip)
                    .await?;
            }
        }
        Ok(())
    }

    async fn record(&self, principal: &Principal, command: LedgerCommand, at: DateTime<Utc>) {
        let mut journal = self.journal.lock().await;
        let sequence = journal.len() as i64 + 1;
        journal.push(JournalEntry::new(sequence, principal.clone(), command, at));
    }

    async fn wallet_handle(&self, wallet_id: WalletId) -> Result<Arc<Mutex<Wallet>>, AppError> {
        self.wallets
            .read()
            .await
            .get(wallet_id)
            .cloned()
            .ok_or(AppError::WalletNotFound(wallet_id))
    }

    // ========================
    // Wallet operations
    // ========================

    /// Create a new wallet and return its id. The creator does not become a member.
    pub async fn create_wallet(
        &self,
        creator: &Principal,
        min_deposit: Amount,
    ) -> Result<WalletId, AppError> {
        self.create_wallet_at(creator, min_deposit, Utc::now()).await
    }

    async fn create_wallet_at(
        &self,
        creator: &Principal,
        min_deposit: Amount,
        at: DateTime<Utc>,
    ) -> Result<WalletId, AppError> {
        let mut wallets = self.wallets.write().await;
        let wallet_id = wallets.len();
        wallets.push(Arc::new(Mutex::new(Wallet::new(
            wallet_id,
            min_deposit,
            creator.clone(),
            at,
        ))));
        self.record(creator, LedgerCommand::CreateWallet { min_deposit }, at)
            .await;

        info!(wallet_id, min_deposit, creator = %creator, "wallet created");
        Ok(wallet_id)
    }

    /// Join a wallet by paying in at least its minimum deposit.
    pub async fn join_wallet(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        contribution: Amount,
    ) -> Result<BalanceChange, AppError> {
        self.join_wallet_at(caller, wallet_id, contribution, Utc::now(), Funds::Move)
            .await
    }

    async fn join_wallet_at(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        contribution: Amount,
        at: DateTime<Utc>,
        funds: Funds,
    ) -> Result<BalanceChange, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let mut wallet = handle.lock().await;

        let change = wallet
            .plan_join(caller, contribution)
            .map_err(|e| reject(wallet_id, e))?;
        if funds == Funds::Move {
            if let Err(err) = self.custody.collect(caller, contribution).await {
                warn!(wallet_id, principal = %caller, error = %err, "deposit not collected");
                return Err(err.into());
            }
        }
        wallet.apply_change(change.clone());
        self.record(
            caller,
            LedgerCommand::JoinWallet {
                wallet_id,
                contribution,
            },
            at,
        )
        .await;

        info!(wallet_id, principal = %caller, contribution, "member joined");
        Ok(change)
    }

    /// Top up the caller's balance in a wallet they belong to.
    pub async fn fund_wallet(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        amount: Amount,
    ) -> Result<BalanceChange, AppError> {
        self.fund_wallet_at(caller, wallet_id, amount, Utc::now(), Funds::Move)
            .await
    }

    async fn fund_wallet_at(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        amount: Amount,
        at: DateTime<Utc>,
        funds: Funds,
    ) -> Result<BalanceChange, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let mut wallet = handle.lock().await;

        let change = wallet
            .plan_fund(caller, amount)
            .map_err(|e| reject(wallet_id, e))?;
        if funds == Funds::Move {
            if let Err(err) = self.custody.collect(caller, amount).await {
                warn!(wallet_id, principal = %caller, error = %err, "top-up not collected");
                return Err(err.into());
            }
        }
        wallet.apply_change(change.clone());
        self.record(caller, LedgerCommand::FundWallet { wallet_id, amount }, at)
            .await;

        debug!(wallet_id, principal = %caller, amount, "wallet funded");
        Ok(change)
    }

    /// Leave a wallet, refunding the caller's whole balance.
    pub async fn leave_wallet(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
    ) -> Result<BalanceChange, AppError> {
        self.leave_wallet_at(caller, wallet_id, Utc::now(), Funds::Move)
            .await
    }

    async fn leave_wallet_at(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        at: DateTime<Utc>,
        funds: Funds,
    ) -> Result<BalanceChange, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let mut wallet = handle.lock().await;

        let change = wallet
            .plan_leave(caller)
            .map_err(|e| reject(wallet_id, e))?;
        if funds == Funds::Move && change.amount > 0 {
            if let Err(err) = self.custody.disburse(caller, change.amount).await {
                warn!(wallet_id, principal = %caller, error = %err, "refund not sent");
                return Err(err.into());
            }
        }
        wallet.apply_change(change.clone());
        self.record(caller, LedgerCommand::LeaveWallet { wallet_id }, at)
            .await;

        info!(wallet_id, principal = %caller, refund = change.amount, "member left");
        Ok(change)
    }

    // ========================
    // Transaction operations
    // ========================

    /// Queue a payout request on behalf of a member.
    pub async fn request_transaction(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        description: String,
        destination: Principal,
        value: Amount,
    ) -> Result<TransactionId, AppError> {
        self.request_transaction_at(caller, wallet_id, description, destination, value, Utc::now())
            .await
    }

    async fn request_transaction_at(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        description: String,
        destination: Principal,
        value: Amount,
        at: DateTime<Utc>,
    ) -> Result<TransactionId, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let mut wallet = handle.lock().await;

        let transaction_id = wallet
            .request_transaction(caller, description.clone(), destination.clone(), value, at)
            .map_err(|e| reject(wallet_id, e))?;
        self.record(
            caller,
            LedgerCommand::RequestTransaction {
                wallet_id,
                description,
                destination,
                value,
            },
            at,
        )
        .await;

        debug!(wallet_id, transaction_id, requester = %caller, value, "transaction requested");
        Ok(transaction_id)
    }

    /// Approve a transaction. The approval that brings a transaction to quorum
    /// also sends it.
    ///
    /// If quorum is reached but the pool cannot cover the value, the approval
    /// is still committed and `InsufficientWalletBalance` is returned.
    pub async fn approve_transaction(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        transaction_id: TransactionId,
    ) -> Result<ApprovalOutcome, AppError> {
        self.approve_transaction_at(caller, wallet_id, transaction_id, Utc::now(), Funds::Move)
            .await
    }

    async fn approve_transaction_at(
        &self,
        caller: &Principal,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
        funds: Funds,
    ) -> Result<ApprovalOutcome, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let mut wallet = handle.lock().await;

        let plan = wallet
            .plan_approval(transaction_id, caller)
            .map_err(|e| reject(wallet_id, e))?;
        if let (Funds::Move, Some(settlement)) = (funds, plan.settlement()) {
            if let Err(err) = self
                .custody
                .disburse(&settlement.destination, settlement.value)
                .await
            {
                warn!(wallet_id, transaction_id, error = %err, "payout not sent");
                return Err(err.into());
            }
        }
        let outcome = wallet.apply_approval(plan, at);
        self.record(
            caller,
            LedgerCommand::ApproveTransaction {
                wallet_id,
                transaction_id,
            },
            at,
        )
        .await;

        match outcome {
            ApprovalOutcome::Underfunded { balance, required } => {
                warn!(
                    wallet_id,
                    transaction_id, balance, required, "quorum reached but wallet balance too low"
                );
                Err(WalletError::InsufficientWalletBalance { balance, required }.into())
            }
            ApprovalOutcome::Settled(ref settlement) => {
                info!(
                    wallet_id,
                    transaction_id,
                    destination = %settlement.destination,
                    value = settlement.value,
                    share = settlement.share,
                    remainder = settlement.remainder,
                    "transaction sent"
                );
                Ok(outcome)
            }
            ApprovalOutcome::Recorded {
                num_approvals,
                required,
            } => {
                debug!(wallet_id, transaction_id, num_approvals, required, "approval recorded");
                Ok(outcome)
            }
        }
    }

    // ========================
    // Queries
    // ========================

    /// Get a snapshot of a wallet.
    pub async fn get_wallet(&self, wallet_id: WalletId) -> Result<Wallet, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.clone())
    }

    /// Get a wallet snapshot with transaction statistics.
    pub async fn get_wallet_info(&self, wallet_id: WalletId) -> Result<WalletInfo, AppError> {
        let wallet = self.get_wallet(wallet_id).await?;
        let settled: Vec<&Transaction> = wallet.transactions.iter().filter(|t| t.approved).collect();
        let settled_count = settled.len();
        let total_sent = settled.iter().map(|t| t.value).sum();
        let pending_count = wallet.transactions.len() - settled_count;

        Ok(WalletInfo {
            wallet,
            pending_count,
            settled_count,
            total_sent,
        })
    }

    /// Snapshots of all wallets, ordered by id.
    pub async fn list_wallets(&self) -> Vec<Wallet> {
        let wallets = self.wallets.read().await;
        let mut snapshots = Vec::with_capacity(wallets.len());
        for handle in wallets.iter() {
            snapshots.push(handle.lock().await.clone());
        }
        snapshots
    }

    pub async fn wallet_count(&self) -> usize {
        self.wallets.read().await.len()
    }

    pub async fn get_transaction(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.transaction(transaction_id)?.clone())
    }

    pub async fn list_transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.transactions.clone())
    }

    pub async fn is_wallet_member(
        &self,
        wallet_id: WalletId,
        principal: &Principal,
    ) -> Result<bool, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.is_member(principal))
    }

    /// Balance of `principal` in a wallet, zero for non-members.
    pub async fn balance_of(
        &self,
        wallet_id: WalletId,
        principal: &Principal,
    ) -> Result<Amount, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.balance_of(principal))
    }

    /// Members of a wallet with their balances, in join order.
    pub async fn members(&self, wallet_id: WalletId) -> Result<Vec<MemberEntry>, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet
            .members_with_balances()
            .into_iter()
            .map(|(principal, balance)| MemberEntry { principal, balance })
            .collect())
    }

    /// Whether `principal` approved a transaction.
    pub async fn get_approval(
        &self,
        wallet_id: WalletId,
        transaction_id: TransactionId,
        principal: &Principal,
    ) -> Result<bool, AppError> {
        let handle = self.wallet_handle(wallet_id).await?;
        let wallet = handle.lock().await;
        Ok(wallet.has_approved(transaction_id, principal)?)
    }

    // ========================
    // Integrity and journal
    // ========================

    /// Check ledger integrity and return a report.
    pub async fn check_integrity(&self) -> IntegrityReport {
        let wallets = self.list_wallets().await;
        build_integrity_report(&wallets)
    }

    /// All committed commands, oldest first.
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.clone()
    }

    /// Entries committed after the first `count` ones.
    pub async fn journal_since(&self, count: usize) -> Vec<JournalEntry> {
        let journal = self.journal.lock().await;
        journal.iter().skip(count).cloned().collect()
    }

    pub async fn journal_len(&self) -> usize {
        self.journal.lock().await.len()
    }
}
