use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RelayError, Result};

/// Debit/credit nature of a ledger entry
///
/// Wire code is the single letter the accounting system expects:
/// `D` for debit, `C` for credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nature {
    Debit,
    Credit,
}

impl Nature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Nature::Debit => "D",
            Nature::Credit => "C",
        }
    }
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Nature {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "D" | "DEBIT" => Ok(Nature::Debit),
            "C" | "CREDIT" => Ok(Nature::Credit),
            _ => Err("invalid nature; expected D|C"),
        }
    }
}

/// Delivery status state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Awaiting delivery (initial)
    Pending,
    /// Delivered successfully (terminal)
    Sent,
    /// Delivery failed (terminal, but re-enterable via manual resend)
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Error => "ERROR",
        }
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        match (self, target) {
            // Successful batch delivery
            (Pending, Sent) => true,
            // Failed batch delivery
            (Pending, Error) => true,
            // Manual resend
            (Error, Pending) => true,
            // A Sent entry is never reverted automatically or manually
            _ => false,
        }
    }

    /// Get valid next statuses from the current status
    pub fn valid_transitions(&self) -> Vec<DeliveryStatus> {
        use DeliveryStatus::*;

        match self {
            Pending => vec![Sent, Error],
            Error => vec![Pending],
            Sent => vec![],
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DeliveryStatus::Pending),
            "SENT" => Ok(DeliveryStatus::Sent),
            "ERROR" => Ok(DeliveryStatus::Error),
            _ => Err("invalid status; expected PENDING|SENT|ERROR"),
        }
    }
}

/// One accounting ledger line awaiting transmission to the external system
///
/// Created Pending by a collaborator (CLI or import); mutated only by the
/// orchestrator (status transitions) or by an explicit manual resend. Never
/// auto-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Assigned by the store on first persist; None = unsaved
    pub id: Option<i64>,
    /// Account code
    pub account: String,
    /// Entry description (historic)
    pub description: String,
    /// Amount at currency precision; never binary floating point
    pub amount: Decimal,
    /// Calendar date of the entry, no time component
    pub entry_date: NaiveDate,
    pub nature: Nature,
    pub status: DeliveryStatus,
    /// Non-null only when status = Error
    pub error_message: Option<String>,
    /// Non-null only when status = Sent
    pub sent_date: Option<NaiveDate>,
}

impl LedgerEntry {
    /// Create a new pending entry
    pub fn new(
        account: impl Into<String>,
        description: impl Into<String>,
        amount: Decimal,
        entry_date: NaiveDate,
        nature: Nature,
    ) -> Self {
        Self {
            id: None,
            account: account.into(),
            description: description.into(),
            amount,
            entry_date,
            nature,
            status: DeliveryStatus::Pending,
            error_message: None,
            sent_date: None,
        }
    }

    fn transition(&mut self, target: DeliveryStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(RelayError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Pending -> Sent: sets sent_date to the current date, clears any error
    pub fn mark_sent(&mut self) -> Result<()> {
        self.transition(DeliveryStatus::Sent)?;
        self.sent_date = Some(Local::now().date_naive());
        self.error_message = None;
        Ok(())
    }

    /// Pending -> Error: records the diagnostic, sent_date left unset
    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(DeliveryStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Error -> Pending: manual resend, clears error and sent date
    pub fn reset_for_resend(&mut self) -> Result<()> {
        self.transition(DeliveryStatus::Pending)?;
        self.error_message = None;
        self.sent_date = None;
        Ok(())
    }

    /// ISO-8601 calendar form (YYYY-MM-DD) of the entry date
    pub fn entry_date_iso(&self) -> String {
        self.entry_date.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry() -> LedgerEntry {
        LedgerEntry::new(
            "1.1.01.001",
            "Office supplies",
            dec!(120.50),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            Nature::Debit,
        )
    }

    #[test]
    fn new_entry_is_pending_without_sent_date() {
        let e = entry();
        assert_eq!(e.status, DeliveryStatus::Pending);
        assert!(e.id.is_none());
        assert!(e.error_message.is_none());
        assert!(e.sent_date.is_none());
    }

    #[test]
    fn mark_sent_sets_date_and_clears_error() {
        let mut e = entry();
        e.mark_sent().unwrap();
        assert_eq!(e.status, DeliveryStatus::Sent);
        assert!(e.sent_date.is_some());
        assert!(e.error_message.is_none());
    }

    #[test]
    fn mark_error_records_diagnostic_and_leaves_sent_date_unset() {
        let mut e = entry();
        e.mark_error("HTTP 500: upstream unavailable").unwrap();
        assert_eq!(e.status, DeliveryStatus::Error);
        assert_eq!(
            e.error_message.as_deref(),
            Some("HTTP 500: upstream unavailable")
        );
        assert!(e.sent_date.is_none());
    }

    #[test]
    fn resend_clears_error_and_sent_date() {
        let mut e = entry();
        e.mark_error("boom").unwrap();
        e.reset_for_resend().unwrap();
        assert_eq!(e.status, DeliveryStatus::Pending);
        assert!(e.error_message.is_none());
        assert!(e.sent_date.is_none());
    }

    #[test]
    fn sent_is_terminal() {
        let mut e = entry();
        e.mark_sent().unwrap();
        assert!(e.mark_error("late failure").is_err());
        assert!(e.reset_for_resend().is_err());
        assert!(DeliveryStatus::Sent.valid_transitions().is_empty());
    }

    #[test]
    fn pending_cannot_be_resent() {
        let mut e = entry();
        assert!(e.reset_for_resend().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<DeliveryStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn nature_wire_codes() {
        assert_eq!(Nature::Debit.as_str(), "D");
        assert_eq!(Nature::Credit.as_str(), "C");
        assert_eq!("c".parse::<Nature>().unwrap(), Nature::Credit);
    }
}
