//! Booking status state machine
//!
//! ```text
//! enquiry ──send contract──▶ negotiation ──sign contract──▶ confirmed ──paid / performed──▶ completed
//!    │                           │                              │
//!    └───────────reject──────────┴─────────────reject───────────┴──▶ cancelled
//! ```
//!
//! Status only moves through named actions. Progress tags are projections of
//! the contract and invoice rows, never stored alongside the booking.

use chrono::NaiveDate;
use gigflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::documents::{Contract, ContractStatus, Invoice, InvoiceStatus};
use crate::models::{Booking, BookingStatus};

/// Side-effecting lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    SendContract,
    SignContract,
    SendInvoice,
    MarkPaid,
    MarkCompleted,
    Reject,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SendContract => "send-contract",
            Action::SignContract => "sign-contract",
            Action::SendInvoice => "send-invoice",
            Action::MarkPaid => "mark-paid",
            Action::MarkCompleted => "mark-completed",
            Action::Reject => "reject",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "send-contract" => Ok(Action::SendContract),
            "sign-contract" => Ok(Action::SignContract),
            "send-invoice" => Ok(Action::SendInvoice),
            "mark-paid" => Ok(Action::MarkPaid),
            "mark-completed" => Ok(Action::MarkCompleted),
            "reject" => Ok(Action::Reject),
            other => Err(Error::InvalidInput(format!("Unknown booking action: {}", other))),
        }
    }
}

/// Read-only progress indicators derived from related records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTags {
    pub contract_sent: bool,
    pub contract_signed: bool,
    pub invoice_sent: bool,
    pub paid_in_full: bool,
}

impl ProgressTags {
    pub fn derive(contracts: &[Contract], invoices: &[Invoice]) -> Self {
        Self {
            contract_sent: !contracts.is_empty(),
            contract_signed: contracts.iter().any(|c| c.status == ContractStatus::Signed),
            invoice_sent: !invoices.is_empty(),
            paid_in_full: !invoices.is_empty()
                && invoices.iter().all(|i| i.status == InvoiceStatus::Paid),
        }
    }
}

/// Status after `action`, given the booking's records as they will be once
/// the action's own side effect is applied
///
/// `today` decides whether the performance date has passed.
pub fn next_status(
    booking: &Booking,
    action: Action,
    tags: &ProgressTags,
    today: NaiveDate,
) -> Result<BookingStatus> {
    use BookingStatus::*;

    let current = booking.status;
    let invalid = |reason: &str| {
        Err(Error::InvalidTransition(format!(
            "cannot {} a booking in status {}: {}",
            action, current, reason
        )))
    };

    if current.is_terminal() {
        return invalid("status is terminal");
    }

    let performed = |inclusive: bool| {
        booking
            .event_date
            .is_some_and(|d| if inclusive { d <= today } else { d < today })
    };

    match (action, current) {
        (Action::SendContract, Enquiry | Negotiation) => Ok(Negotiation),
        (Action::SendContract, _) => invalid("contract already signed"),

        (Action::SignContract, Negotiation) if tags.contract_sent => Ok(Confirmed),
        (Action::SignContract, Negotiation) => invalid("no contract has been sent"),
        (Action::SignContract, _) => invalid("contracts are signed during negotiation"),

        (Action::SendInvoice, Negotiation | Confirmed) => Ok(current),
        (Action::SendInvoice, _) => invalid("nothing agreed to invoice yet"),

        (Action::MarkPaid, Confirmed) if tags.paid_in_full && performed(false) => Ok(Completed),
        (Action::MarkPaid, Negotiation | Confirmed) => Ok(current),
        (Action::MarkPaid, _) => invalid("no invoice has been sent"),

        (Action::MarkCompleted, Confirmed) if performed(true) => Ok(Completed),
        (Action::MarkCompleted, Confirmed) => invalid("performance date has not arrived"),
        (Action::MarkCompleted, _) => invalid("only confirmed bookings can complete"),

        (Action::Reject, _) => Ok(Cancelled),
    }
}
