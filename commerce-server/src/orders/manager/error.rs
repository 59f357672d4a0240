use shared::order::IllegalTransition;
use thiserror::Error;

use crate::capacity::CapacityError;
use crate::invoicing::InvoiceError;
use crate::orders::installments::LedgerError;
use crate::orders::schedule::ScheduleConfigError;
use crate::payment::PaymentError;
use crate::storage::StorageError;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Offering not found: {0}")]
    OfferingNotFound(String),

    #[error("No order carries installment: {0}")]
    InstallmentNotFound(String),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error(transparent)]
    Installments(#[from] LedgerError),

    #[error(transparent)]
    Invoicing(#[from] InvoiceError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Schedule(#[from] ScheduleConfigError),

    #[error("Payment backend error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<redb::CommitError> for ManagerError {
    fn from(err: redb::CommitError) -> Self {
        ManagerError::Storage(StorageError::from(err))
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
