//! Transfer aggregate planning
//!
//! An internal transfer is an aggregate of two sibling transactions joined
//! by one transfer reference. Callers never mutate a single sibling; the
//! plan produced here is inserted as a whole inside one transactional unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    Currency, ExternalTransferId, PrincipalAccountId, TransactionId, TransferReference, UserId,
};

use crate::account::{AccountKind, AccountRef};
use crate::error::LedgerError;
use crate::transaction::{NewTransaction, TransactionType};

/// One side of a planned transfer: the account plus the facts needed to
/// validate pairing (ownership, and the parent for sub-accounts)
#[derive(Debug, Clone, Copy)]
pub struct TransferEndpoint {
    pub account: AccountRef,
    pub owner: UserId,
    /// Parent principal; set iff the account is a sub-account
    pub parent: Option<PrincipalAccountId>,
}

impl TransferEndpoint {
    pub fn principal(id: PrincipalAccountId, owner: UserId) -> Self {
        Self {
            account: AccountRef::principal(id),
            owner,
            parent: None,
        }
    }

    pub fn sub_account(
        id: core_kernel::SubAccountId,
        parent: PrincipalAccountId,
        owner: UserId,
    ) -> Self {
        Self {
            account: AccountRef::sub_account(id),
            owner,
            parent: Some(parent),
        }
    }
}

/// The two sibling inserts of an internal transfer
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub reference: TransferReference,
    /// Debit sibling, inserted with balance validation
    pub outgoing: NewTransaction,
    /// Credit sibling, inserted without balance validation
    pub incoming: NewTransaction,
}

impl TransferPlan {
    /// Both accounts touched by the plan, in global lock order
    pub fn lock_order(&self) -> [AccountRef; 2] {
        let mut refs = [self.outgoing.account, self.incoming.account];
        refs.sort();
        refs
    }
}

/// Selects the sibling type pair for a source/destination combination
///
/// Principal-to-principal transfers use (transfer_out, transfer_in).
/// Intra-principal transfers always use account_to_sub for the debit row
/// and sub_to_account for the credit row, whichever direction the money
/// moves.
fn sibling_types(
    source: &TransferEndpoint,
    dest: &TransferEndpoint,
) -> Result<(TransactionType, TransactionType), LedgerError> {
    match (source.account.kind, dest.account.kind) {
        (AccountKind::Principal, AccountKind::Principal) => {
            Ok((TransactionType::TransferOut, TransactionType::TransferIn))
        }
        (AccountKind::Principal, AccountKind::SubAccount) => {
            let parent = dest.parent.ok_or_else(|| {
                LedgerError::validation("Sub-account endpoint is missing its parent".to_string())
            })?;
            if parent.as_i64() != source.account.id {
                return Err(LedgerError::validation(format!(
                    "Sub-account {} can only be funded from its parent principal {}",
                    dest.account, parent
                )));
            }
            Ok((TransactionType::AccountToSub, TransactionType::SubToAccount))
        }
        (AccountKind::SubAccount, AccountKind::Principal) => {
            let parent = source.parent.ok_or_else(|| {
                LedgerError::validation("Sub-account endpoint is missing its parent".to_string())
            })?;
            if parent.as_i64() != dest.account.id {
                return Err(LedgerError::validation(format!(
                    "Sub-account {} can only pay back into its parent principal {}",
                    source.account, parent
                )));
            }
            Ok((TransactionType::AccountToSub, TransactionType::SubToAccount))
        }
        (AccountKind::SubAccount, AccountKind::SubAccount) => Err(LedgerError::validation(
            "Transfers between two sub-accounts must route through the parent principal"
                .to_string(),
        )),
    }
}

/// Plans an internal transfer: validates the pair and produces the two
/// sibling inserts under a fresh transfer reference
///
/// The caller is responsible for the balance check on the source account
/// (the outgoing sibling is inserted with validation enabled) and for
/// running the balance recomputer on both accounts.
pub fn plan_internal_transfer(
    source: &TransferEndpoint,
    dest: &TransferEndpoint,
    amount: Decimal,
    at: DateTime<Utc>,
    description: impl Into<String>,
) -> Result<TransferPlan, LedgerError> {
    if source.account == dest.account {
        return Err(LedgerError::validation(
            "Cannot transfer from an account to itself".to_string(),
        ));
    }
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "Transfer amount must be positive, got {amount}"
        )));
    }
    if source.owner != dest.owner {
        return Err(LedgerError::permission_denied(format!(
            "Accounts {} and {} belong to different owners",
            source.account, dest.account
        )));
    }

    let (outgoing_type, incoming_type) = sibling_types(source, dest)?;
    let description = description.into();
    let reference = TransferReference::generate();

    let outgoing = NewTransaction::new(
        source.account,
        outgoing_type,
        amount,
        description.clone(),
        source.owner,
        at,
    )
    .with_transfer_reference(reference.clone());

    let incoming = NewTransaction::new(
        dest.account,
        incoming_type,
        amount,
        description,
        dest.owner,
        at,
    )
    .with_transfer_reference(reference.clone());

    Ok(TransferPlan {
        reference,
        outgoing,
        incoming,
    })
}

/// Status of an external transfer in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTransferStatus {
    Pending,
    Executed,
    Cancelled,
}

impl ExternalTransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalTransferStatus::Pending => "pending",
            ExternalTransferStatus::Executed => "executed",
            ExternalTransferStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExternalTransferStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExternalTransferStatus::Pending),
            "executed" => Ok(ExternalTransferStatus::Executed),
            "cancelled" => Ok(ExternalTransferStatus::Cancelled),
            other => Err(LedgerError::validation(format!(
                "Unknown external transfer status: {other}"
            ))),
        }
    }
}

/// A registry record for a transfer toward an external beneficiary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTransfer {
    pub id: ExternalTransferId,
    pub owner: UserId,
    pub source: AccountRef,
    /// Debit transaction created on the source account
    pub transaction_id: TransactionId,
    pub iban: String,
    pub bic: Option<String>,
    pub beneficiary_name: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub status: ExternalTransferStatus,
    pub requested_at: DateTime<Utc>,
}

/// Request for an external transfer
#[derive(Debug, Clone)]
pub struct ExternalTransferRequest {
    pub iban: String,
    pub bic: Option<String>,
    pub beneficiary_name: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub at: DateTime<Utc>,
    pub description: String,
}

impl ExternalTransferRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "Transfer amount must be positive, got {}",
                self.amount
            )));
        }
        if self.iban.trim().is_empty() {
            return Err(LedgerError::validation(
                "External transfer requires an IBAN".to_string(),
            ));
        }
        if self.beneficiary_name.trim().is_empty() {
            return Err(LedgerError::validation(
                "External transfer requires a beneficiary name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Plans the debit transaction of an external transfer
pub fn plan_external_transfer(
    source: &TransferEndpoint,
    request: &ExternalTransferRequest,
) -> Result<NewTransaction, LedgerError> {
    request.validate()?;
    Ok(NewTransaction::new(
        source.account,
        TransactionType::ExternalTransfer,
        request.amount,
        request.description.clone(),
        source.owner,
        request.at,
    )
    .with_reference(format!("SEPA {} / {}", request.iban, request.beneficiary_name)))
}

/// Plans the reversal credit cancelling a pending external transfer
pub fn plan_external_reversal(
    transfer: &ExternalTransfer,
    at: DateTime<Utc>,
) -> Result<NewTransaction, LedgerError> {
    if transfer.status != ExternalTransferStatus::Pending {
        return Err(LedgerError::validation(format!(
            "Only pending external transfers can be cancelled, status is {}",
            transfer.status.as_str()
        )));
    }
    Ok(NewTransaction::new(
        transfer.source,
        TransactionType::ReversalCredit,
        transfer.amount,
        format!("Reversal: {}", transfer.description),
        transfer.owner,
        at,
    )
    .with_reference(transfer.id.to_string()))
}
