use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    quorum_reached, required_approvals, split_evenly, Amount, ApprovalOutcome, ApprovalPlan,
    Settlement, SettlementAttempt, Transaction, TransactionId, WalletError,
};

/// Sequential index of a wallet in the ledger, starting at 0.
pub type WalletId = usize;

/// An opaque, already-authenticated identity. Also used for payee addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Join,
    Fund,
    Leave,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Join => "join",
            ChangeKind::Fund => "fund",
            ChangeKind::Leave => "leave",
        }
    }
}

/// A validated membership balance movement. `amount` flows into the wallet
/// for joins and top-ups and out of it for a departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub kind: ChangeKind,
    pub principal: Principal,
    pub amount: Amount,
    pub member_balance_after: Amount,
    pub wallet_balance_after: Amount,
}

/// A pool of funds owned by its members.
///
/// State changes that move external funds are split in two steps: a `plan_*`
/// method validates every precondition against the current state and computes
/// the resulting balances without touching `self`, and an `apply_*` method
/// commits that plan. The caller must apply a plan to the same, unchanged
/// wallet it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    /// Minimum contribution required to join
    pub min_deposit: Amount,
    /// Pooled funds currently held
    pub balance: Amount,
    /// Settlement remainders that were paid out of the pool but charged to no member
    pub dust: Amount,
    /// Current members in join order
    pub members: Vec<Principal>,
    pub member_balances: HashMap<Principal, Amount>,
    pub transactions: Vec<Transaction>,
    pub created_by: Principal,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        id: WalletId,
        min_deposit: Amount,
        created_by: Principal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            min_deposit,
            balance: 0,
            dust: 0,
            members: Vec::new(),
            member_balances: HashMap::new(),
            transactions: Vec::new(),
            created_by,
            created_at,
        }
    }

    pub fn is_member(&self, principal: &Principal) -> bool {
        self.member_balances.contains_key(principal)
    }

    /// Balance held by `principal`, zero for non-members.
    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.member_balances.get(principal).copied().unwrap_or(0)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members and their balances in join order.
    pub fn members_with_balances(&self) -> Vec<(Principal, Amount)> {
        self.members
            .iter()
            .map(|p| (p.clone(), self.balance_of(p)))
            .collect()
    }

    pub fn transaction(&self, transaction_id: TransactionId) -> Result<&Transaction, WalletError> {
        self.transactions
            .get(transaction_id)
            .ok_or(WalletError::TransactionNotFound {
                wallet_id: self.id,
                transaction_id,
            })
    }

    /// Whether `principal` approved the transaction, false for anyone who did not.
    pub fn has_approved(
        &self,
        transaction_id: TransactionId,
        principal: &Principal,
    ) -> Result<bool, WalletError> {
        Ok(self.transaction(transaction_id)?.has_approved(principal))
    }

    /// Approvals that count toward quorum: those held by current members.
    /// Approvals of departed members stay on the transaction but no longer count.
    pub fn counted_approvals(&self, tx: &Transaction) -> usize {
        tx.approvals.iter().filter(|a| self.is_member(a)).count()
    }

    fn require_member(&self, principal: &Principal) -> Result<Amount, WalletError> {
        self.member_balances
            .get(principal)
            .copied()
            .ok_or_else(|| WalletError::NotMember {
                wallet_id: self.id,
                principal: principal.clone(),
            })
    }

    // ========================
    // Membership
    // ========================

    pub fn plan_join(
        &self,
        principal: &Principal,
        contribution: Amount,
    ) -> Result<BalanceChange, WalletError> {
        if self.is_member(principal) {
            return Err(WalletError::AlreadyMember {
                wallet_id: self.id,
                principal: principal.clone(),
            });
        }
        if contribution < self.min_deposit {
            return Err(WalletError::BelowMinimumDeposit {
                min_deposit: self.min_deposit,
                contribution,
            });
        }
        if contribution == 0 {
            return Err(WalletError::InvalidAmount(
                "Contribution must be positive".to_string(),
            ));
        }

        let wallet_balance_after = self.balance.checked_add(contribution).ok_or_else(|| {
            WalletError::InvariantViolation("wallet balance overflow".to_string())
        })?;

        Ok(BalanceChange {
            kind: ChangeKind::Join,
            principal: principal.clone(),
            amount: contribution,
            member_balance_after: contribution,
            wallet_balance_after,
        })
    }

    /// Top-ups have no minimum beyond being positive.
    pub fn plan_fund(
        &self,
        principal: &Principal,
        amount: Amount,
    ) -> Result<BalanceChange, WalletError> {
        let member_balance = self.require_member(principal)?;
        if amount == 0 {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let overflow = || WalletError::InvariantViolation("balance overflow".to_string());
        Ok(BalanceChange {
            kind: ChangeKind::Fund,
            principal: principal.clone(),
            amount,
            member_balance_after: member_balance.checked_add(amount).ok_or_else(overflow)?,
            wallet_balance_after: self.balance.checked_add(amount).ok_or_else(overflow)?,
        })
    }

    /// A departing member takes their whole balance with them.
    pub fn plan_leave(&self, principal: &Principal) -> Result<BalanceChange, WalletError> {
        let member_balance = self.require_member(principal)?;
        let wallet_balance_after = self.balance.checked_sub(member_balance).ok_or_else(|| {
            WalletError::InvariantViolation(format!(
                "refund of {} exceeds pooled balance {} of wallet {}",
                member_balance, self.balance, self.id
            ))
        })?;

        Ok(BalanceChange {
            kind: ChangeKind::Leave,
            principal: principal.clone(),
            amount: member_balance,
            member_balance_after: 0,
            wallet_balance_after,
        })
    }

    pub fn apply_change(&mut self, change: BalanceChange) {
        match change.kind {
            ChangeKind::Join => {
                self.members.push(change.principal.clone());
                self.member_balances
                    .insert(change.principal, change.member_balance_after);
            }
            ChangeKind::Fund => {
                self.member_balances
                    .insert(change.principal, change.member_balance_after);
            }
            ChangeKind::Leave => {
                self.members.retain(|p| *p != change.principal);
                self.member_balances.remove(&change.principal);
            }
        }
        self.balance = change.wallet_balance_after;
    }

    // ========================
    // Transactions
    // ========================

    /// Queue a payout request. The pool is not checked until the request is sent.
    pub fn request_transaction(
        &mut self,
        requester: &Principal,
        description: impl Into<String>,
        destination: Principal,
        value: Amount,
        requested_at: DateTime<Utc>,
    ) -> Result<TransactionId, WalletError> {
        self.require_member(requester)?;
        if value == 0 {
            return Err(WalletError::InvalidAmount(
                "Transaction value must be positive".to_string(),
            ));
        }

        let id = self.transactions.len();
        self.transactions.push(Transaction::new(
            id,
            self.id,
            requester.clone(),
            description,
            destination,
            value,
            requested_at,
        ));
        Ok(id)
    }

    /// Validate an approval and work out whether it sends the transaction.
    pub fn plan_approval(
        &self,
        transaction_id: TransactionId,
        approver: &Principal,
    ) -> Result<ApprovalPlan, WalletError> {
        self.require_member(approver)?;
        let tx = self.transaction(transaction_id)?;
        if tx.has_approved(approver) {
            return Err(WalletError::AlreadyApproved {
                transaction_id,
                principal: approver.clone(),
            });
        }
        if tx.approved {
            return Err(WalletError::TransactionSettled { transaction_id });
        }

        let num_approvals = self.counted_approvals(tx) + 1;
        let member_count = self.member_count();

        let attempt = if !quorum_reached(num_approvals, member_count) {
            SettlementAttempt::NotReached
        } else if self.balance < tx.value {
            SettlementAttempt::Insufficient {
                balance: self.balance,
                required: tx.value,
            }
        } else {
            SettlementAttempt::Ready(self.plan_settlement(tx)?)
        };

        Ok(ApprovalPlan {
            transaction_id,
            approver: approver.clone(),
            num_approvals,
            member_count,
            attempt,
        })
    }

    fn plan_settlement(&self, tx: &Transaction) -> Result<Settlement, WalletError> {
        let (share, remainder) = split_evenly(tx.value, self.member_count()).ok_or_else(|| {
            WalletError::InvariantViolation(format!("wallet {} has no members", self.id))
        })?;

        let charges = self
            .members
            .iter()
            .map(|member| {
                let held = self.balance_of(member);
                held.checked_sub(share)
                    .map(|after| (member.clone(), after))
                    .ok_or_else(|| {
                        WalletError::InvariantViolation(format!(
                            "share {} exceeds balance {} of {}",
                            share, held, member
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Settlement {
            transaction_id: tx.id,
            destination: tx.destination.clone(),
            value: tx.value,
            share,
            remainder,
            charges,
            wallet_balance_after: self.balance - tx.value,
        })
    }

    /// Record the approval and, when planned, send the transaction.
    /// The approval stands even when the pool was too small.
    pub fn apply_approval(&mut self, plan: ApprovalPlan, at: DateTime<Utc>) -> ApprovalOutcome {
        let tx = &mut self.transactions[plan.transaction_id];
        tx.approvals.push(plan.approver);

        match plan.attempt {
            SettlementAttempt::NotReached => ApprovalOutcome::Recorded {
                num_approvals: plan.num_approvals,
                required: required_approvals(plan.member_count),
            },
            SettlementAttempt::Insufficient { balance, required } => {
                ApprovalOutcome::Underfunded { balance, required }
            }
            SettlementAttempt::Ready(settlement) => {
                tx.approved = true;
                tx.settled_at = Some(at);
                for (member, after) in &settlement.charges {
                    self.member_balances.insert(member.clone(), *after);
                }
                self.balance = settlement.wallet_balance_after;
                self.dust = self.dust.saturating_add(settlement.remainder);
                ApprovalOutcome::Settled(settlement)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> Principal {
        Principal::from(id)
    }

    fn join(wallet: &mut Wallet, who: &str, amount: Amount) {
        let change = wallet.plan_join(&p(who), amount).unwrap();
        wallet.apply_change(change);
    }

    fn approve(wallet: &mut Wallet, who: &str, tx: TransactionId) -> ApprovalOutcome {
        let plan = wallet.plan_approval(tx, &p(who)).unwrap();
        wallet.apply_approval(plan, Utc::now())
    }

    fn members_total(wallet: &Wallet) -> Amount {
        wallet.member_balances.values().sum()
    }

    fn three_member_wallet() -> Wallet {
        let mut wallet = Wallet::new(0, 1000, p("owner"), Utc::now());
        join(&mut wallet, "owner", 1000);
        join(&mut wallet, "alice", 1000);
        join(&mut wallet, "bob", 1000);
        wallet
    }

    #[test]
    fn test_new_wallet_is_empty() {
        let wallet = Wallet::new(3, 1000, p("owner"), Utc::now());
        assert_eq!(wallet.id, 3);
        assert_eq!(wallet.balance, 0);
        assert_eq!(wallet.min_deposit, 1000);
        assert!(wallet.members.is_empty());
        assert!(wallet.transactions.is_empty());
        assert!(!wallet.is_member(&p("owner")));
    }

    #[test]
    fn test_join_below_minimum_then_at_minimum() {
        let mut wallet = Wallet::new(0, 1000, p("owner"), Utc::now());

        assert_eq!(
            wallet.plan_join(&p("alice"), 500),
            Err(WalletError::BelowMinimumDeposit {
                min_deposit: 1000,
                contribution: 500
            })
        );

        join(&mut wallet, "alice", 1000);
        assert!(wallet.is_member(&p("alice")));
        assert_eq!(wallet.balance_of(&p("alice")), 1000);
        assert_eq!(wallet.balance, 1000);
    }

    #[test]
    fn test_join_twice_fails() {
        let mut wallet = Wallet::new(0, 0, p("owner"), Utc::now());
        join(&mut wallet, "alice", 10);
        assert!(matches!(
            wallet.plan_join(&p("alice"), 10),
            Err(WalletError::AlreadyMember { .. })
        ));
        assert_eq!(wallet.member_count(), 1);
    }

    #[test]
    fn test_zero_minimum_still_requires_positive_contribution() {
        let wallet = Wallet::new(0, 0, p("owner"), Utc::now());
        assert!(matches!(
            wallet.plan_join(&p("alice"), 0),
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(wallet.plan_join(&p("alice"), 1).is_ok());
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let wallet = Wallet::new(0, 100, p("owner"), Utc::now());
        let _ = wallet.plan_join(&p("alice"), 200).unwrap();
        assert_eq!(wallet.balance, 0);
        assert!(!wallet.is_member(&p("alice")));
    }

    #[test]
    fn test_fund_requires_membership() {
        let mut wallet = Wallet::new(0, 1000, p("owner"), Utc::now());
        join(&mut wallet, "alice", 2000);

        assert!(matches!(
            wallet.plan_fund(&p("bob"), 1000),
            Err(WalletError::NotMember { .. })
        ));

        // No minimum re-check on top-ups
        let change = wallet.plan_fund(&p("alice"), 1).unwrap();
        wallet.apply_change(change);
        assert_eq!(wallet.balance_of(&p("alice")), 2001);
        assert_eq!(wallet.balance, 2001);
    }

    #[test]
    fn test_leave_refunds_everything() {
        let mut wallet = Wallet::new(0, 1000, p("owner"), Utc::now());
        join(&mut wallet, "alice", 2000);
        join(&mut wallet, "bob", 2000);

        let change = wallet.plan_leave(&p("alice")).unwrap();
        assert_eq!(change.amount, 2000);
        wallet.apply_change(change);

        assert!(!wallet.is_member(&p("alice")));
        assert_eq!(wallet.balance_of(&p("alice")), 0);
        assert_eq!(wallet.members, vec![p("bob")]);
        assert_eq!(wallet.balance, 2000);
        assert_eq!(wallet.balance, members_total(&wallet));
    }

    #[test]
    fn test_leave_requires_membership() {
        let wallet = Wallet::new(0, 1000, p("owner"), Utc::now());
        assert!(matches!(
            wallet.plan_leave(&p("carol")),
            Err(WalletError::NotMember { .. })
        ));
    }

    #[test]
    fn test_request_records_pending_transaction() {
        let mut wallet = Wallet::new(0, 1000, p("owner"), Utc::now());
        join(&mut wallet, "alice", 2000);

        let id = wallet
            .request_transaction(&p("alice"), "Dinner at Jimmy's", p("jimmy"), 500, Utc::now())
            .unwrap();
        assert_eq!(id, 0);

        let tx = wallet.transaction(id).unwrap();
        assert_eq!(tx.description, "Dinner at Jimmy's");
        assert_eq!(tx.destination, p("jimmy"));
        assert_eq!(tx.value, 500);
        assert_eq!(tx.num_approvals(), 0);
        assert_eq!(tx.wallet_id, 0);
        assert_eq!(tx.requester, p("alice"));
        assert!(!tx.approved);
    }

    #[test]
    fn test_request_may_exceed_balance() {
        let mut wallet = Wallet::new(0, 10, p("owner"), Utc::now());
        join(&mut wallet, "alice", 10);
        assert!(
            wallet
                .request_transaction(&p("alice"), "big", p("shop"), 1_000_000, Utc::now())
                .is_ok()
        );
    }

    #[test]
    fn test_request_rejects_non_member_and_zero_value() {
        let mut wallet = Wallet::new(0, 10, p("owner"), Utc::now());
        join(&mut wallet, "alice", 10);
        assert!(matches!(
            wallet.request_transaction(&p("bob"), "x", p("shop"), 5, Utc::now()),
            Err(WalletError::NotMember { .. })
        ));
        assert!(matches!(
            wallet.request_transaction(&p("alice"), "x", p("shop"), 0, Utc::now()),
            Err(WalletError::InvalidAmount(_))
        ));
        assert!(wallet.transactions.is_empty());
    }

    #[test]
    fn test_single_approval_below_quorum() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Dinner", p("jimmy"), 600, Utc::now())
            .unwrap();

        let outcome = approve(&mut wallet, "bob", 0);
        assert_eq!(
            outcome,
            ApprovalOutcome::Recorded {
                num_approvals: 1,
                required: 2
            }
        );
        let tx = wallet.transaction(0).unwrap();
        assert_eq!(tx.num_approvals(), 1);
        assert!(!tx.approved);
        assert_eq!(wallet.balance, 3000);
    }

    #[test]
    fn test_quorum_settles_with_equal_split() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Dinner", p("jimmy"), 600, Utc::now())
            .unwrap();

        approve(&mut wallet, "owner", 0);
        let outcome = approve(&mut wallet, "alice", 0);

        let ApprovalOutcome::Settled(settlement) = outcome else {
            panic!("expected settlement");
        };
        assert_eq!(settlement.share, 200);
        assert_eq!(settlement.remainder, 0);
        assert_eq!(wallet.balance, 2400);
        for member in ["owner", "alice", "bob"] {
            assert_eq!(wallet.balance_of(&p(member)), 800);
        }
        let tx = wallet.transaction(0).unwrap();
        assert!(tx.approved);
        assert!(tx.settled_at.is_some());
        assert_eq!(tx.num_approvals(), 2);
        assert_eq!(wallet.balance, members_total(&wallet));
    }

    #[test]
    fn test_quorum_without_funds_keeps_approval() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Car", p("dealer"), 100_000, Utc::now())
            .unwrap();

        approve(&mut wallet, "owner", 0);
        let outcome = approve(&mut wallet, "alice", 0);

        assert_eq!(
            outcome,
            ApprovalOutcome::Underfunded {
                balance: 3000,
                required: 100_000
            }
        );
        let tx = wallet.transaction(0).unwrap();
        assert_eq!(tx.num_approvals(), 2);
        assert!(!tx.approved);
        assert_eq!(wallet.balance, 3000);
    }

    #[test]
    fn test_later_approval_retries_settlement() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Trip", p("agency"), 4500, Utc::now())
            .unwrap();
        approve(&mut wallet, "owner", 0);
        assert!(matches!(
            approve(&mut wallet, "alice", 0),
            ApprovalOutcome::Underfunded { .. }
        ));

        for member in ["owner", "alice", "bob"] {
            let change = wallet.plan_fund(&p(member), 1000).unwrap();
            wallet.apply_change(change);
        }

        assert!(matches!(
            approve(&mut wallet, "bob", 0),
            ApprovalOutcome::Settled(_)
        ));
        assert_eq!(wallet.balance, 1500);
        assert_eq!(wallet.balance_of(&p("bob")), 500);
    }

    #[test]
    fn test_double_approval_rejected() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Dinner", p("jimmy"), 600, Utc::now())
            .unwrap();
        approve(&mut wallet, "bob", 0);

        assert_eq!(
            wallet.plan_approval(0, &p("bob")),
            Err(WalletError::AlreadyApproved {
                transaction_id: 0,
                principal: p("bob")
            })
        );
        assert_eq!(wallet.transaction(0).unwrap().num_approvals(), 1);
    }

    #[test]
    fn test_settled_transaction_is_frozen() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Dinner", p("jimmy"), 600, Utc::now())
            .unwrap();
        approve(&mut wallet, "owner", 0);
        approve(&mut wallet, "alice", 0);

        assert_eq!(
            wallet.plan_approval(0, &p("bob")),
            Err(WalletError::TransactionSettled { transaction_id: 0 })
        );
        assert_eq!(wallet.transaction(0).unwrap().num_approvals(), 2);
    }

    #[test]
    fn test_approval_of_unknown_transaction() {
        let wallet = three_member_wallet();
        assert!(matches!(
            wallet.plan_approval(7, &p("bob")),
            Err(WalletError::TransactionNotFound {
                wallet_id: 0,
                transaction_id: 7
            })
        ));
    }

    #[test]
    fn test_remainder_is_absorbed_as_dust() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Gift", p("friend"), 100, Utc::now())
            .unwrap();
        approve(&mut wallet, "owner", 0);
        let ApprovalOutcome::Settled(settlement) = approve(&mut wallet, "bob", 0) else {
            panic!("expected settlement");
        };

        assert_eq!(settlement.share, 33);
        assert_eq!(settlement.remainder, 1);
        assert_eq!(wallet.balance, 2900);
        assert_eq!(wallet.dust, 1);
        assert_eq!(wallet.balance_of(&p("owner")), 967);
        assert_eq!(wallet.balance + wallet.dust, members_total(&wallet));
    }

    #[test]
    fn test_late_joiner_is_charged_and_leaver_is_not() {
        let mut wallet = Wallet::new(0, 100, p("owner"), Utc::now());
        join(&mut wallet, "alice", 1000);
        join(&mut wallet, "bob", 1000);
        wallet
            .request_transaction(&p("alice"), "Rent", p("landlord"), 600, Utc::now())
            .unwrap();

        let change = wallet.plan_leave(&p("bob")).unwrap();
        wallet.apply_change(change);
        join(&mut wallet, "carol", 1000);
        join(&mut wallet, "dave", 1000);

        approve(&mut wallet, "alice", 0);
        assert!(matches!(
            approve(&mut wallet, "carol", 0),
            ApprovalOutcome::Settled(_)
        ));
        assert_eq!(wallet.balance_of(&p("alice")), 800);
        assert_eq!(wallet.balance_of(&p("carol")), 800);
        assert_eq!(wallet.balance_of(&p("dave")), 800);
        assert_eq!(wallet.balance_of(&p("bob")), 0);
        assert_eq!(wallet.balance, 2400);
    }

    #[test]
    fn test_requester_survives_leaving() {
        let mut wallet = Wallet::new(0, 100, p("owner"), Utc::now());
        join(&mut wallet, "alice", 500);
        join(&mut wallet, "bob", 500);
        wallet
            .request_transaction(&p("alice"), "Books", p("store"), 50, Utc::now())
            .unwrap();

        let change = wallet.plan_leave(&p("alice")).unwrap();
        assert_eq!(change.amount, 500);
        wallet.apply_change(change);

        assert_eq!(wallet.transaction(0).unwrap().requester, p("alice"));
        assert!(!wallet.is_member(&p("alice")));
    }

    #[test]
    fn test_departed_approver_cannot_approve_again() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Big", p("shop"), 100_000, Utc::now())
            .unwrap();
        approve(&mut wallet, "bob", 0);

        let change = wallet.plan_leave(&p("bob")).unwrap();
        wallet.apply_change(change);
        join(&mut wallet, "bob", 1000);

        assert!(matches!(
            wallet.plan_approval(0, &p("bob")),
            Err(WalletError::AlreadyApproved { .. })
        ));
        assert!(wallet.has_approved(0, &p("bob")).unwrap());
    }

    #[test]
    fn test_leave_after_dust_cannot_overdraw_pool() {
        let mut wallet = Wallet::new(0, 1, p("owner"), Utc::now());
        join(&mut wallet, "alice", 10);
        join(&mut wallet, "bob", 10);
        join(&mut wallet, "carol", 10);
        wallet
            .request_transaction(&p("alice"), "x", p("shop"), 10, Utc::now())
            .unwrap();
        approve(&mut wallet, "alice", 0);
        approve(&mut wallet, "bob", 0);
        // 10 / 3 leaves 1 unit of dust: balance 20, members hold 7 each
        assert_eq!(wallet.balance, 20);
        assert_eq!(wallet.dust, 1);

        for who in ["alice", "bob"] {
            let change = wallet.plan_leave(&p(who)).unwrap();
            wallet.apply_change(change);
        }
        assert_eq!(wallet.balance, 6);
        assert!(matches!(
            wallet.plan_leave(&p("carol")),
            Err(WalletError::InvariantViolation(_))
        ));
        assert!(wallet.is_member(&p("carol")));
    }

    #[test]
    fn test_departed_approvals_do_not_count() {
        let mut wallet = Wallet::new(0, 100, p("owner"), Utc::now());
        for who in ["a", "b", "c", "d", "e"] {
            join(&mut wallet, who, 1000);
        }
        wallet
            .request_transaction(&p("c"), "Dinner", p("shop"), 300, Utc::now())
            .unwrap();
        approve(&mut wallet, "a", 0);
        approve(&mut wallet, "b", 0);
        for who in ["a", "b"] {
            let change = wallet.plan_leave(&p(who)).unwrap();
            wallet.apply_change(change);
        }

        // 1 of 3 current members, even though 3 approvals are on record
        assert_eq!(
            approve(&mut wallet, "c", 0),
            ApprovalOutcome::Recorded {
                num_approvals: 1,
                required: 2
            }
        );
        let tx = wallet.transaction(0).unwrap();
        assert_eq!(tx.num_approvals(), 3);
        assert_eq!(wallet.counted_approvals(tx), 1);
        assert!(!tx.approved);

        assert!(matches!(
            approve(&mut wallet, "d", 0),
            ApprovalOutcome::Settled(_)
        ));
    }

    #[test]
    fn test_rejoined_approver_counts_again() {
        let mut wallet = three_member_wallet();
        wallet
            .request_transaction(&p("alice"), "Dinner", p("jimmy"), 300, Utc::now())
            .unwrap();
        approve(&mut wallet, "bob", 0);
        let change = wallet.plan_leave(&p("bob")).unwrap();
        wallet.apply_change(change);
        assert_eq!(wallet.counted_approvals(wallet.transaction(0).unwrap()), 0);

        join(&mut wallet, "bob", 1000);
        assert_eq!(wallet.counted_approvals(wallet.transaction(0).unwrap()), 1);
        assert!(matches!(
            approve(&mut wallet, "alice", 0),
            ApprovalOutcome::Settled(_)
        ));
    }

    #[test]
    fn test_share_above_member_balance_is_rejected() {
        let mut wallet = Wallet::new(0, 1, p("owner"), Utc::now());
        join(&mut wallet, "alice", 1000);
        join(&mut wallet, "bob", 10);
        wallet
            .request_transaction(&p("alice"), "Laptop", p("shop"), 1000, Utc::now())
            .unwrap();
        approve(&mut wallet, "alice", 0);

        // The pool covers 1000 but bob cannot cover his 500 share
        assert!(matches!(
            wallet.plan_approval(0, &p("bob")),
            Err(WalletError::InvariantViolation(_))
        ));
        assert_eq!(wallet.transaction(0).unwrap().num_approvals(), 1);
        assert_eq!(wallet.balance, 1010);
    }
}
