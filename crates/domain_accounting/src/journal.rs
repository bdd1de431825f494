//! In-memory journal entry store
//!
//! `JournalBook` persists entries, materializes complementaries from the
//! category registry, and keeps the linked transactions' accounting status
//! in step through the linkage guard. It mirrors the database journal
//! repository the way `LedgerBook` mirrors the transaction repository.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use core_kernel::{JournalEntryId, TransactionId, UserId};
use domain_ledger::{AccountingStatus, LedgerBook};

use crate::category::CategoryRegistry;
use crate::entry::{
    vat_breakdown, EntryKind, EntryStatus, JournalEntry, JournalEntryUpdate, NewJournalEntry,
};
use crate::error::AccountingError;
use crate::linkage::{check_link, derive_status, linked_sum};

/// In-memory journal entry store
#[derive(Debug, Default)]
pub struct JournalBook {
    entries: BTreeMap<JournalEntryId, JournalEntry>,
    next_id: i64,
}

impl JournalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: JournalEntryId) -> Result<&JournalEntry, AccountingError> {
        self.entries
            .get(&id)
            .ok_or_else(|| AccountingError::not_found(format!("Journal entry {id}")))
    }

    fn get_mut(&mut self, id: JournalEntryId) -> Result<&mut JournalEntry, AccountingError> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| AccountingError::not_found(format!("Journal entry {id}")))
    }

    /// Entries linked to a transaction, soft-deleted included
    pub fn entries_for_transaction(&self, transaction: TransactionId) -> Vec<&JournalEntry> {
        self.entries
            .values()
            .filter(|entry| entry.transaction_id == Some(transaction))
            .collect()
    }

    /// Complementaries spawned by a principal entry
    pub fn complementaries_of(&self, principal: JournalEntryId) -> Vec<&JournalEntry> {
        self.entries
            .values()
            .filter(|entry| entry.principal_entry_id == Some(principal))
            .collect()
    }

    /// Current linked sum on a transaction, soft-deleted excluded
    pub fn linked_sum_for(&self, transaction: TransactionId) -> Decimal {
        linked_sum(self.entries.values(), transaction)
    }

    fn next_id(&mut self) -> JournalEntryId {
        self.next_id += 1;
        JournalEntryId::new(self.next_id)
    }

    /// Re-derives a linked transaction's accounting status from the linkage
    /// sum; manual `ignored` overrides are left alone
    fn refresh_status(
        &self,
        ledger: &mut LedgerBook,
        transaction: TransactionId,
    ) -> Result<(), AccountingError> {
        let tx = ledger.get(transaction)?;
        if tx.accounting_status == AccountingStatus::Ignored {
            return Ok(());
        }
        let status = derive_status(self.linked_sum_for(transaction), tx.amount);
        ledger.record_accounting_status(transaction, status)?;
        Ok(())
    }

    /// Creates a principal entry, its complementary if the category bears
    /// one, and the requested transaction link
    ///
    /// The linkage cap is checked before anything is written; a failing link
    /// aborts the whole create. A complementary that no longer fits under
    /// the cap is created unlinked and flagged.
    pub fn create(
        &mut self,
        ledger: &mut LedgerBook,
        registry: &CategoryRegistry,
        new: NewJournalEntry,
        link_transaction_id: Option<TransactionId>,
    ) -> Result<JournalEntryId, AccountingError> {
        new.validate()?;
        let category = registry.get(new.category_id)?;
        if category.owner != new.owner {
            return Err(AccountingError::permission_denied(format!(
                "Category {} belongs to another user",
                new.category_id
            )));
        }

        if let Some(transaction) = link_transaction_id {
            let tx = ledger.get(transaction)?;
            check_link(new.amount_ttc, new.owner, tx, self.linked_sum_for(transaction))?;
        }

        let split = vat_breakdown(new.amount_ttc, new.vat_rate);
        let id = self.next_id();
        let principal = JournalEntry {
            id,
            entry_date: new.entry_date,
            principal_account_id: new.principal_account_id,
            sub_account_id: new.sub_account_id,
            category_id: new.category_id,
            amount_ttc: new.amount_ttc,
            amount_htva: split.amount_htva,
            vat_rate: new.vat_rate,
            vat_amount: split.vat_amount,
            description: new.description.clone(),
            counterparty_contact_id: new.counterparty_contact_id,
            reference: new.reference.clone(),
            entry_type: new.entry_type,
            owner: new.owner,
            status: new.status,
            entry_kind: EntryKind::Principal,
            principal_entry_id: None,
            transaction_id: link_transaction_id,
            flagged: false,
        };
        self.entries.insert(id, principal);

        if let Some(spec) = category.complementary {
            let amount = spec.rate.apply(new.amount_ttc);
            let mut linked = None;
            let mut flagged = false;
            if let Some(transaction) = link_transaction_id {
                let tx = ledger.get(transaction)?;
                match check_link(amount, new.owner, tx, self.linked_sum_for(transaction)) {
                    Ok(()) => linked = Some(transaction),
                    Err(AccountingError::LinkageCapExceeded { .. }) => flagged = true,
                    Err(err) => return Err(err),
                }
            }
            let complementary_id = self.next_id();
            let complementary = JournalEntry {
                id: complementary_id,
                entry_date: new.entry_date,
                principal_account_id: new.principal_account_id,
                sub_account_id: new.sub_account_id,
                category_id: spec.target_category_id,
                amount_ttc: amount,
                amount_htva: amount,
                vat_rate: core_kernel::Rate::new(Decimal::ZERO),
                vat_amount: Decimal::ZERO,
                description: format!("Complementary: {}", new.description),
                counterparty_contact_id: new.counterparty_contact_id,
                reference: new.reference,
                entry_type: spec.entry_type,
                owner: new.owner,
                status: new.status,
                entry_kind: EntryKind::Complementary,
                principal_entry_id: Some(id),
                transaction_id: linked,
                flagged,
            };
            self.entries.insert(complementary_id, complementary);
        }

        if let Some(transaction) = link_transaction_id {
            self.refresh_status(ledger, transaction)?;
        }

        debug!(%id, "created journal entry");
        Ok(id)
    }

    /// Modifies a principal entry; complementaries are recomputed when the
    /// amount or VAT rate changes
    pub fn update(
        &mut self,
        ledger: &mut LedgerBook,
        registry: &CategoryRegistry,
        caller: UserId,
        id: JournalEntryId,
        update: JournalEntryUpdate,
    ) -> Result<(), AccountingError> {
        update.validate()?;
        let entry = self.get(id)?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            )));
        }
        if !entry.is_principal() {
            return Err(AccountingError::validation(
                "Complementary entries are recomputed from their principal".to_string(),
            ));
        }
        if entry.status == EntryStatus::SoftDeleted {
            return Err(AccountingError::validation(format!(
                "Entry {id} is soft-deleted"
            )));
        }

        let new_amount = update.new_amount_ttc.unwrap_or(entry.amount_ttc);
        let linked_transaction = entry.transaction_id;
        let category_id = entry.category_id;

        // Re-check the cap before touching anything when a linked amount grows
        if let Some(transaction) = linked_transaction {
            if update.new_amount_ttc.is_some() {
                let tx = ledger.get(transaction)?;
                let sum_without = self.linked_sum_for(transaction) - entry.amount_ttc;
                check_link(new_amount, caller, tx, sum_without)?;
            }
        }

        let entry = self.get_mut(id)?;
        if let Some(date) = update.new_entry_date {
            entry.entry_date = date;
        }
        if let Some(ref description) = update.new_description {
            entry.description = description.clone();
        }
        if let Some(status) = update.new_status {
            entry.status = status;
        }
        if update.affects_amounts() {
            entry.amount_ttc = new_amount;
            if let Some(rate) = update.new_vat_rate {
                entry.vat_rate = rate;
            }
            let split = vat_breakdown(entry.amount_ttc, entry.vat_rate);
            entry.amount_htva = split.amount_htva;
            entry.vat_amount = split.vat_amount;

            // Recompute complementaries from the category's current spec
            if let Some(spec) = registry.get(category_id)?.complementary {
                let amount = spec.rate.apply(new_amount);
                let complementary_ids: Vec<JournalEntryId> = self
                    .complementaries_of(id)
                    .iter()
                    .map(|entry| entry.id)
                    .collect();
                for complementary_id in complementary_ids {
                    let complementary = self.get_mut(complementary_id)?;
                    complementary.amount_ttc = amount;
                    complementary.amount_htva = amount;
                }
            }
        }

        if let Some(transaction) = linked_transaction {
            self.refresh_status(ledger, transaction)?;
        }
        debug!(%id, "updated journal entry");
        Ok(())
    }

    /// Soft-deletes an entry, cascading to its complementaries
    pub fn soft_delete(
        &mut self,
        ledger: &mut LedgerBook,
        caller: UserId,
        id: JournalEntryId,
    ) -> Result<(), AccountingError> {
        let entry = self.get(id)?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            )));
        }

        let mut affected: Vec<Option<TransactionId>> = vec![entry.transaction_id];
        let cascade: Vec<JournalEntryId> = self
            .complementaries_of(id)
            .iter()
            .map(|entry| entry.id)
            .collect();

        self.get_mut(id)?.status = EntryStatus::SoftDeleted;
        for complementary_id in cascade {
            let complementary = self.get_mut(complementary_id)?;
            complementary.status = EntryStatus::SoftDeleted;
            affected.push(complementary.transaction_id);
        }

        for transaction in affected.into_iter().flatten() {
            self.refresh_status(ledger, transaction)?;
        }
        debug!(%id, "soft-deleted journal entry");
        Ok(())
    }

    /// Permanently removes an entry and its complementaries
    ///
    /// Refused while the entry or any complementary is still linked.
    pub fn hard_delete(
        &mut self,
        caller: UserId,
        id: JournalEntryId,
    ) -> Result<(), AccountingError> {
        let entry = self.get(id)?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            )));
        }
        let mut doomed = vec![id];
        doomed.extend(self.complementaries_of(id).iter().map(|entry| entry.id));
        for doomed_id in &doomed {
            if self.get(*doomed_id)?.transaction_id.is_some() {
                return Err(AccountingError::validation(format!(
                    "Entry {doomed_id} is linked; unlink before hard delete"
                )));
            }
        }
        for doomed_id in doomed {
            self.entries.remove(&doomed_id);
        }
        Ok(())
    }

    /// Links an entry to a transaction, guarded by the cap
    pub fn link(
        &mut self,
        ledger: &mut LedgerBook,
        entry_id: JournalEntryId,
        transaction: TransactionId,
    ) -> Result<(), AccountingError> {
        let entry = self.get(entry_id)?;
        if entry.status == EntryStatus::SoftDeleted {
            return Err(AccountingError::validation(format!(
                "Entry {entry_id} is soft-deleted"
            )));
        }
        if entry.transaction_id.is_some() {
            return Err(AccountingError::validation(format!(
                "Entry {entry_id} is already linked"
            )));
        }
        let tx = ledger.get(transaction)?;
        check_link(
            entry.amount_ttc,
            entry.owner,
            tx,
            self.linked_sum_for(transaction),
        )?;

        self.get_mut(entry_id)?.transaction_id = Some(transaction);
        self.get_mut(entry_id)?.flagged = false;
        self.refresh_status(ledger, transaction)?;
        debug!(%entry_id, %transaction, "linked journal entry");
        Ok(())
    }

    /// Clears an entry's link and re-derives the transaction's status
    pub fn unlink(
        &mut self,
        ledger: &mut LedgerBook,
        entry_id: JournalEntryId,
    ) -> Result<(), AccountingError> {
        let transaction = self.get(entry_id)?.transaction_id.ok_or_else(|| {
            AccountingError::validation(format!("Entry {entry_id} is not linked"))
        })?;
        self.get_mut(entry_id)?.transaction_id = None;
        self.refresh_status(ledger, transaction)?;
        debug!(%entry_id, "unlinked journal entry");
        Ok(())
    }
}
