//! In-memory ledger book
//!
//! `LedgerBook` owns account histories and enforces every ledger invariant
//! over them: balance consistency, transfer pairing, ownership, and the
//! sub-account scope rule. It acts as the reference store for the engine;
//! the database repositories implement the same operations over PostgreSQL.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use core_kernel::{
    ExternalTransferId, PrincipalAccountId, SubAccountId, TransactionId, TransferReference, UserId,
};

use crate::account::AccountRef;
use crate::balance::{previous_before, recompute_all, recompute_from, running_balance_at, sort_canonical};
use crate::error::LedgerError;
use crate::transaction::{
    AccountingStatus, NewTransaction, Transaction, TransactionUpdate,
};
use crate::transfer::{
    plan_external_reversal, plan_external_transfer, plan_internal_transfer, ExternalTransfer,
    ExternalTransferRequest, ExternalTransferStatus, TransferEndpoint,
};

/// Per-account ledger state
#[derive(Debug, Clone)]
struct AccountState {
    owner: UserId,
    initial_balance: Decimal,
    current_balance: Decimal,
    active: bool,
    /// Parent principal; set iff the account is a sub-account
    parent: Option<PrincipalAccountId>,
    /// Full history in canonical order (datetime asc, id asc)
    rows: Vec<Transaction>,
}

/// The in-memory ledger engine
///
/// # Invariants
///
/// - Every row's `balance_after` equals the initial balance plus the signed
///   sum of all preceding rows in canonical order
/// - Every internal-transfer row has exactly one sibling under the same
///   transfer reference, with equal amount and date
/// - A row's owner always matches the owning account's owner
#[derive(Debug, Default)]
pub struct LedgerBook {
    accounts: HashMap<AccountRef, AccountState>,
    /// Transaction id -> owning account
    index: HashMap<TransactionId, AccountRef>,
    externals: HashMap<ExternalTransferId, ExternalTransfer>,
    next_principal_id: i64,
    next_sub_id: i64,
    next_transaction_id: i64,
    next_external_id: i64,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a principal account with the given initial balance
    pub fn open_principal(&mut self, owner: UserId, initial_balance: Decimal) -> PrincipalAccountId {
        self.next_principal_id += 1;
        let id = PrincipalAccountId::new(self.next_principal_id);
        self.accounts.insert(
            AccountRef::principal(id),
            AccountState {
                owner,
                initial_balance,
                current_balance: initial_balance,
                active: true,
                parent: None,
                rows: Vec::new(),
            },
        );
        id
    }

    /// Opens a sub-account under an existing principal
    pub fn open_sub_account(
        &mut self,
        parent: PrincipalAccountId,
    ) -> Result<SubAccountId, LedgerError> {
        let owner = self
            .accounts
            .get(&AccountRef::principal(parent))
            .ok_or_else(|| LedgerError::not_found(format!("Principal account {parent}")))?
            .owner;

        self.next_sub_id += 1;
        let id = SubAccountId::new(self.next_sub_id);
        self.accounts.insert(
            AccountRef::sub_account(id),
            AccountState {
                owner,
                initial_balance: Decimal::ZERO,
                current_balance: Decimal::ZERO,
                active: true,
                parent: Some(parent),
                rows: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Soft-deactivates an account; history is kept, new writes are refused
    pub fn deactivate(&mut self, caller: UserId, account: AccountRef) -> Result<(), LedgerError> {
        let state = self.state_mut(account)?;
        if state.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own {account}"
            )));
        }
        state.active = false;
        Ok(())
    }

    fn state(&self, account: AccountRef) -> Result<&AccountState, LedgerError> {
        self.accounts
            .get(&account)
            .ok_or_else(|| LedgerError::not_found(format!("Account {account}")))
    }

    fn state_mut(&mut self, account: AccountRef) -> Result<&mut AccountState, LedgerError> {
        self.accounts
            .get_mut(&account)
            .ok_or_else(|| LedgerError::not_found(format!("Account {account}")))
    }

    /// The transfer endpoint view of an account (owner + parent)
    pub fn endpoint(&self, account: AccountRef) -> Result<TransferEndpoint, LedgerError> {
        let state = self.state(account)?;
        Ok(TransferEndpoint {
            account,
            owner: state.owner,
            parent: state.parent,
        })
    }

    /// Current cached balance of an account
    pub fn current_balance(&self, account: AccountRef) -> Result<Decimal, LedgerError> {
        Ok(self.state(account)?.current_balance)
    }

    /// Owner of an account
    pub fn owner_of(&self, account: AccountRef) -> Result<UserId, LedgerError> {
        Ok(self.state(account)?.owner)
    }

    /// Full history of an account in canonical order
    pub fn transactions(&self, account: AccountRef) -> Result<&[Transaction], LedgerError> {
        Ok(&self.state(account)?.rows)
    }

    /// Looks up a transaction by id
    pub fn get(&self, id: TransactionId) -> Result<&Transaction, LedgerError> {
        let account = self
            .index
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))?;
        self.state(*account)?
            .rows
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))
    }

    /// Latest transaction on the account with date <= the given instant
    pub fn previous_before(
        &self,
        account: AccountRef,
        at: DateTime<Utc>,
    ) -> Result<Option<&Transaction>, LedgerError> {
        Ok(previous_before(&self.state(account)?.rows, at))
    }

    /// Inserts a transaction and recomputes balances from its date
    ///
    /// With `validate_balance` set, a debit fails with `InsufficientFunds`
    /// when the running balance at the transaction date is below the amount;
    /// nothing is written in that case.
    pub fn insert(
        &mut self,
        new: NewTransaction,
        validate_balance: bool,
    ) -> Result<TransactionId, LedgerError> {
        new.validate()?;
        let account = new.account;
        let state = self.state(account)?;
        if !state.active {
            return Err(LedgerError::validation(format!(
                "Account {account} is inactive"
            )));
        }
        if state.owner != new.owner {
            return Err(LedgerError::permission_denied(format!(
                "{} does not own {account}",
                new.owner
            )));
        }
        if validate_balance && new.transaction_type.is_debit() {
            let available =
                running_balance_at(state.initial_balance, &state.rows, new.transaction_at);
            if available < new.amount {
                return Err(LedgerError::InsufficientFunds {
                    account,
                    requested: new.amount,
                    available,
                });
            }
        }

        self.next_transaction_id += 1;
        let id = TransactionId::new(self.next_transaction_id);
        let at = new.transaction_at;
        let row = Transaction {
            id,
            account,
            transaction_type: new.transaction_type,
            amount: new.amount,
            description: new.description,
            reference: new.reference,
            owner: new.owner,
            transaction_at: at,
            balance_after: None,
            transfer_reference: new.transfer_reference,
            accounting_status: AccountingStatus::ToPost,
            created_at: Utc::now(),
        };

        let state = self.state_mut(account)?;
        state.rows.push(row);
        sort_canonical(&mut state.rows);
        state.current_balance = recompute_from(state.initial_balance, &mut state.rows, at);
        self.index.insert(id, account);

        debug!(%account, %id, "inserted transaction");
        Ok(id)
    }

    /// Finds the sibling of a transfer row
    fn sibling_of(
        &self,
        reference: &TransferReference,
        id: TransactionId,
    ) -> Result<(AccountRef, TransactionId), LedgerError> {
        let mut found = None;
        for (account, state) in &self.accounts {
            for row in &state.rows {
                if row.id != id && row.transfer_reference.as_ref() == Some(reference) {
                    if found.is_some() {
                        return Err(LedgerError::ConflictingTransfer(format!(
                            "More than two rows share transfer reference {reference}"
                        )));
                    }
                    found = Some((*account, row.id));
                }
            }
        }
        found.ok_or_else(|| {
            LedgerError::ConflictingTransfer(format!(
                "Sibling missing for transfer reference {reference}"
            ))
        })
    }

    fn apply_update_to_row(
        &mut self,
        account: AccountRef,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> Result<DateTime<Utc>, LedgerError> {
        let state = self.state_mut(account)?;
        let row = state
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))?;

        let old_at = row.transaction_at;
        if let Some(amount) = update.new_amount {
            row.amount = amount;
        }
        if let Some(at) = update.new_datetime {
            row.transaction_at = at;
        }
        if let Some(ref description) = update.new_description {
            row.description = description.clone();
        }
        if let Some(ref reference) = update.new_reference {
            row.reference = Some(reference.clone());
        }
        Ok(old_at)
    }

    fn recompute_account(
        &mut self,
        account: AccountRef,
        from: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let state = self.state_mut(account)?;
        sort_canonical(&mut state.rows);
        state.current_balance = recompute_from(state.initial_balance, &mut state.rows, from);
        Ok(())
    }

    /// Modifies a transaction; for a transfer, the sibling is modified
    /// identically and both accounts are recomputed
    pub fn update(
        &mut self,
        caller: UserId,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<(), LedgerError> {
        update.validate()?;
        let row = self.get(id)?;
        if row.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own transaction {id}"
            )));
        }
        let account = row.account;
        let affects_balance = update.affects_balance();
        let sibling = match (&row.transfer_reference, row.is_transfer_sibling()) {
            (Some(reference), true) => Some(self.sibling_of(&reference.clone(), id)?),
            _ => None,
        };

        let old_at = self.apply_update_to_row(account, id, &update)?;
        let mut recompute_targets = vec![(account, old_at)];
        if let Some((sibling_account, sibling_id)) = sibling {
            let sibling_old_at = self.apply_update_to_row(sibling_account, sibling_id, &update)?;
            recompute_targets.push((sibling_account, sibling_old_at));
        }

        if affects_balance {
            for (target, row_old_at) in recompute_targets {
                let from = match update.new_datetime {
                    Some(new_at) => new_at.min(row_old_at),
                    None => row_old_at,
                };
                self.recompute_account(target, from)?;
            }
        }

        debug!(%account, %id, "updated transaction");
        Ok(())
    }

    fn remove_row(
        &mut self,
        account: AccountRef,
        id: TransactionId,
    ) -> Result<Transaction, LedgerError> {
        let state = self.state_mut(account)?;
        let position = state
            .rows
            .iter()
            .position(|row| row.id == id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))?;
        let row = state.rows.remove(position);
        self.index.remove(&id);
        Ok(row)
    }

    /// Deletes a transaction; for a transfer, both siblings are removed and
    /// each affected account is recomputed from the earliest sibling date
    ///
    /// Ownership is checked on the outgoing (debit) side for transfers.
    pub fn delete(&mut self, caller: UserId, id: TransactionId) -> Result<(), LedgerError> {
        let row = self.get(id)?;
        let account = row.account;

        if let (Some(reference), true) = (&row.transfer_reference, row.is_transfer_sibling()) {
            let (sibling_account, sibling_id) = self.sibling_of(&reference.clone(), id)?;

            // Identify the debit side and check its ownership
            let (outgoing_account, outgoing_id) = if row.transaction_type.is_debit() {
                (account, id)
            } else {
                (sibling_account, sibling_id)
            };
            let outgoing_owner = self.get(outgoing_id)?.owner;
            if outgoing_owner != caller {
                return Err(LedgerError::permission_denied(format!(
                    "{caller} does not own the outgoing side of transfer on {outgoing_account}"
                )));
            }

            let first = self.remove_row(account, id)?;
            let second = self.remove_row(sibling_account, sibling_id)?;
            let earliest = first.transaction_at.min(second.transaction_at);
            self.recompute_account(account, earliest)?;
            self.recompute_account(sibling_account, earliest)?;
        } else {
            if row.owner != caller {
                return Err(LedgerError::permission_denied(format!(
                    "{caller} does not own transaction {id}"
                )));
            }
            let removed = self.remove_row(account, id)?;
            self.recompute_account(account, removed.transaction_at)?;
        }

        debug!(%account, %id, "deleted transaction");
        Ok(())
    }

    /// Creates an internal transfer: two sibling rows under one reference,
    /// both accounts recomputed
    ///
    /// No partial effect: all validation happens before the first insert.
    pub fn internal_transfer(
        &mut self,
        caller: UserId,
        source: AccountRef,
        dest: AccountRef,
        amount: Decimal,
        at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Result<TransferReference, LedgerError> {
        let source_endpoint = self.endpoint(source)?;
        let dest_endpoint = self.endpoint(dest)?;
        if source_endpoint.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own {source}"
            )));
        }
        let plan = plan_internal_transfer(&source_endpoint, &dest_endpoint, amount, at, description)?;

        // Pre-validate both sides so the pair inserts atomically
        {
            let source_state = self.state(source)?;
            let dest_state = self.state(dest)?;
            if !source_state.active || !dest_state.active {
                return Err(LedgerError::validation(
                    "Both transfer accounts must be active".to_string(),
                ));
            }
            let available =
                running_balance_at(source_state.initial_balance, &source_state.rows, at);
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    account: source,
                    requested: amount,
                    available,
                });
            }
        }

        let reference = plan.reference.clone();
        self.insert(plan.outgoing, true)?;
        self.insert(plan.incoming, false)?;

        debug!(%source, %dest, %reference, "created internal transfer");
        Ok(reference)
    }

    /// Deletes both siblings of a transfer by its reference
    pub fn delete_transfer(
        &mut self,
        caller: UserId,
        reference: &TransferReference,
    ) -> Result<(), LedgerError> {
        let member = self
            .accounts
            .values()
            .flat_map(|state| state.rows.iter())
            .find(|row| row.transfer_reference.as_ref() == Some(reference))
            .ok_or_else(|| {
                LedgerError::not_found(format!("Transfer reference {reference}"))
            })?
            .id;
        self.delete(caller, member)
    }

    /// Creates an external transfer: a debit on the source plus a pending
    /// registry record
    pub fn external_transfer(
        &mut self,
        caller: UserId,
        source: AccountRef,
        request: ExternalTransferRequest,
    ) -> Result<ExternalTransferId, LedgerError> {
        let endpoint = self.endpoint(source)?;
        if endpoint.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own {source}"
            )));
        }
        let debit = plan_external_transfer(&endpoint, &request)?;
        let transaction_id = self.insert(debit, true)?;

        self.next_external_id += 1;
        let id = ExternalTransferId::new(self.next_external_id);
        self.externals.insert(
            id,
            ExternalTransfer {
                id,
                owner: caller,
                source,
                transaction_id,
                iban: request.iban,
                bic: request.bic,
                beneficiary_name: request.beneficiary_name,
                amount: request.amount,
                currency: request.currency,
                description: request.description,
                status: ExternalTransferStatus::Pending,
                requested_at: request.at,
            },
        );
        Ok(id)
    }

    /// Looks up an external transfer record
    pub fn external(&self, id: ExternalTransferId) -> Result<&ExternalTransfer, LedgerError> {
        self.externals
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(format!("External transfer {id}")))
    }

    /// Cancels a pending external transfer with a reversal credit
    pub fn cancel_external_transfer(
        &mut self,
        caller: UserId,
        id: ExternalTransferId,
    ) -> Result<TransactionId, LedgerError> {
        let transfer = self.external(id)?.clone();
        if transfer.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own external transfer {id}"
            )));
        }
        let reversal = plan_external_reversal(&transfer, Utc::now())?;
        let reversal_id = self.insert(reversal, false)?;
        if let Some(record) = self.externals.get_mut(&id) {
            record.status = ExternalTransferStatus::Cancelled;
        }
        Ok(reversal_id)
    }

    /// Manual accounting-status override: `ignored` or `to_post` only;
    /// `posted` is reachable solely through entry linking
    pub fn set_accounting_status(
        &mut self,
        caller: UserId,
        id: TransactionId,
        status: AccountingStatus,
    ) -> Result<(), LedgerError> {
        if status == AccountingStatus::Posted {
            return Err(LedgerError::validation(
                "Status 'posted' can only be set by linking entries".to_string(),
            ));
        }
        let owner = self.get(id)?.owner;
        if owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own transaction {id}"
            )));
        }
        self.record_accounting_status(id, status)
    }

    /// Writes an accounting status computed by the linkage guard
    ///
    /// Called by the accounting layer after link/unlink; performs no
    /// permission check of its own.
    pub fn record_accounting_status(
        &mut self,
        id: TransactionId,
        status: AccountingStatus,
    ) -> Result<(), LedgerError> {
        let account = *self
            .index
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))?;
        let state = self.state_mut(account)?;
        let row = state
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| LedgerError::not_found(format!("Transaction {id}")))?;
        row.accounting_status = status;
        Ok(())
    }

    /// The account on the other side of a transfer row, if any
    ///
    /// Returns `None` for non-transfer transactions; used by the period
    /// queries to aggregate counterparties.
    pub fn counterparty_of(&self, id: TransactionId) -> Result<Option<AccountRef>, LedgerError> {
        let row = self.get(id)?;
        match (&row.transfer_reference, row.is_transfer_sibling()) {
            (Some(reference), true) => {
                let (account, _) = self.sibling_of(&reference.clone(), id)?;
                Ok(Some(account))
            }
            _ => Ok(None),
        }
    }

    /// Repair walk over an account's full history
    pub fn repair(&mut self, account: AccountRef) -> Result<(), LedgerError> {
        let state = self.state_mut(account)?;
        sort_canonical(&mut state.rows);
        state.current_balance = recompute_all(state.initial_balance, &mut state.rows);
        Ok(())
    }

    /// Initial balance of an account
    pub fn initial_balance(&self, account: AccountRef) -> Result<Decimal, LedgerError> {
        Ok(self.state(account)?.initial_balance)
    }
}
