//! Closed status and classification enums for every billing document.
//!
//! The database stores these as their canonical upper-case strings; the
//! string⇄enum mapping lives here and nowhere else. API payloads use the
//! same canonical strings via serde.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! str_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant,)+
        }

        impl $name {
            /// Canonical persistence string.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(LedgerError::Validation(format!(
                        "invalid {}: '{}'", stringify!($name), other
                    ))),
                }
            }
        }
    };
}

str_enum! {
    /// Lifecycle of a billing case.
    CaseStatus {
        Open => "OPEN",
        ReadyForPost => "READY_FOR_POST",
        Closed => "CLOSED",
    }
}

str_enum! {
    /// Who ultimately funds the encounter.
    PayerMode {
        SelfPay => "SELF",
        CreditPlan => "CREDIT_PLAN",
        Corporate => "CORPORATE",
        Tpa => "TPA",
        Insurance => "INSURANCE",
    }
}

str_enum! {
    /// Which party an invoice bills.
    InvoiceType {
        Patient => "PATIENT",
        Insurer => "INSURER",
    }
}

str_enum! {
    /// Invoice document lifecycle. POSTED and VOID are terminal.
    DocStatus {
        Draft => "DRAFT",
        Approved => "APPROVED",
        Posted => "POSTED",
        Void => "VOID",
    }
}

str_enum! {
    /// Clinical service category of a charge line.
    ServiceGroup {
        Consultation => "CONSULT",
        Laboratory => "LAB",
        Radiology => "RAD",
        Pharmacy => "PHARM",
        OperationTheatre => "OT",
        Procedure => "PROC",
        Room => "ROOM",
        Nursing => "NURSING",
        Misc => "MISC",
    }
}

str_enum! {
    /// Insurer coverage of a single line.
    CoverageFlag {
        Covered => "YES",
        NotCovered => "NO",
        Partial => "PARTIAL",
    }
}

str_enum! {
    /// Instrument used for a payment.
    PaymentMode {
        Cash => "CASH",
        Card => "CARD",
        Upi => "UPI",
        Bank => "BANK",
        Cheque => "CHEQUE",
        Credit => "CREDIT",
        Advance => "ADVANCE",
    }
}

str_enum! {
    /// What a payment row represents.
    PaymentKind {
        Receipt => "RECEIPT",
        AdvanceAdjustment => "ADVANCE_ADJUSTMENT",
    }
}

str_enum! {
    /// Direction of money movement.
    PaymentDirection {
        In => "IN",
        Out => "OUT",
    }
}

str_enum! {
    /// Payment/allocation row status. VOID rows are excluded from all
    /// paid aggregates.
    PayStatus {
        Active => "ACTIVE",
        Void => "VOID",
    }
}

str_enum! {
    /// Which liability bucket an amount is attributed to.
    PayerBucket {
        Patient => "PATIENT",
        Insurer => "INSURER",
        Tpa => "TPA",
        Corporate => "CORPORATE",
    }
}

str_enum! {
    /// Advance wallet entry types.
    AdvanceEntryType {
        Advance => "ADVANCE",
        Refund => "REFUND",
        Adjustment => "ADJUSTMENT",
    }
}

str_enum! {
    /// Edit-after-approval request lifecycle.
    EditRequestStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

str_enum! {
    /// Payer kind behind an insurance case.
    PayerKind {
        Insurance => "INSURANCE",
        Tpa => "TPA",
        Corporate => "CORPORATE",
    }
}

str_enum! {
    /// Preauthorization request lifecycle. One decision per request.
    PreauthStatus {
        Draft => "DRAFT",
        Submitted => "SUBMITTED",
        Approved => "APPROVED",
        Partial => "PARTIAL",
        Rejected => "REJECTED",
    }
}

str_enum! {
    /// Claim lifecycle. ACKNOWLEDGED is first-class (the payer confirmed
    /// receipt but has not adjudicated yet).
    ClaimStatus {
        Draft => "DRAFT",
        Submitted => "SUBMITTED",
        Acknowledged => "ACKNOWLEDGED",
        UnderQuery => "UNDER_QUERY",
        Approved => "APPROVED",
        Denied => "DENIED",
        Settled => "SETTLED",
    }
}

str_enum! {
    /// Counter reset policy for a number series.
    ResetPeriod {
        None => "NONE",
        Year => "YEAR",
        Month => "MONTH",
    }
}

str_enum! {
    /// Document types that draw numbers from a series.
    DocType {
        Case => "CASE",
        Invoice => "INVOICE",
        Receipt => "RECEIPT",
        Claim => "CLAIM",
        Preauth => "PREAUTH",
    }
}

impl PreauthStatus {
    /// A preauth in this state contributes coverage to the posting gate.
    pub fn grants_coverage(&self) -> bool {
        matches!(self, Self::Approved | Self::Partial)
    }
}

impl PayerBucket {
    /// Bucket an invoice's dues belong to, given who the invoice bills.
    pub fn for_invoice(invoice_type: InvoiceType, payer_kind: Option<PayerKind>) -> Self {
        match invoice_type {
            InvoiceType::Patient => Self::Patient,
            InvoiceType::Insurer => match payer_kind {
                Some(PayerKind::Tpa) => Self::Tpa,
                Some(PayerKind::Corporate) => Self::Corporate,
                _ => Self::Insurer,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_strings() {
        assert_eq!(DocStatus::from_str("POSTED").unwrap(), DocStatus::Posted);
        assert_eq!(ClaimStatus::Acknowledged.as_str(), "ACKNOWLEDGED");
        assert_eq!(
            ClaimStatus::from_str("UNDER_QUERY").unwrap(),
            ClaimStatus::UnderQuery
        );
    }

    #[test]
    fn rejects_unknown_status() {
        assert!(DocStatus::from_str("posted").is_err());
        assert!(PayerBucket::from_str("EMPLOYER").is_err());
    }

    #[test]
    fn invoice_bucket_follows_payer_kind() {
        assert_eq!(
            PayerBucket::for_invoice(InvoiceType::Insurer, Some(PayerKind::Tpa)),
            PayerBucket::Tpa
        );
        assert_eq!(
            PayerBucket::for_invoice(InvoiceType::Patient, Some(PayerKind::Insurance)),
            PayerBucket::Patient
        );
    }
}
