//! Warehouse documents.
//!
//! Each document kind is its own type implementing [`Document`]; the kind is
//! chosen at runtime through [`DocumentFactory`]. Shared bookkeeping lives in
//! [`DocumentHeader`], kind-specific behaviour in the trait implementations.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DocumentId, DomainError, DomainResult, ProductId, ValueObject};

use crate::events::MutationKind;
use crate::mutator::{LineOutcome, StockMutator};
use crate::registry::ProductRegistry;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    SaleReceipt,
    IncomeInvoice,
    OutcomeInvoice,
    Stocktake,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::SaleReceipt,
        DocumentKind::IncomeInvoice,
        DocumentKind::OutcomeInvoice,
        DocumentKind::Stocktake,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::SaleReceipt => "sale-receipt",
            DocumentKind::IncomeInvoice => "income-invoice",
            DocumentKind::OutcomeInvoice => "outcome-invoice",
            DocumentKind::Stocktake => "stocktake",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown document kind: {s}")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Sold,
    Accepted,
    Shipped,
    Reconciled,
}

/// One line of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub comment: String,
}

impl ValueObject for DocumentLine {}

/// Data shared by every document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub id: DocumentId,
    pub number: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub lines: Vec<DocumentLine>,
    fields: BTreeMap<&'static str, String>,
}

impl DocumentHeader {
    fn new(
        id: DocumentId,
        number: impl Into<String>,
        created_by: impl Into<String>,
        defaults: &[(&'static str, &str)],
    ) -> Self {
        Self {
            id,
            number: number.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            status: DocumentStatus::Draft,
            lines: Vec::new(),
            fields: defaults.iter().map(|(k, v)| (*k, (*v).to_string())).collect(),
        }
    }
}

/// Result of processing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub lines: Vec<LineOutcome>,
}

impl DocumentReport {
    pub fn failed_lines(&self) -> usize {
        self.lines.iter().filter(|l| !l.is_success()).count()
    }
}

/// Capabilities shared by every document kind.
pub trait Document: Send + Sync + core::fmt::Debug {
    fn header(&self) -> &DocumentHeader;

    fn header_mut(&mut self) -> &mut DocumentHeader;

    fn kind(&self) -> DocumentKind;

    /// Human-readable document title.
    fn title(&self) -> &'static str;

    /// Status the document moves to once processed.
    fn processed_status(&self) -> DocumentStatus;

    /// Stock effect of one line when the document is processed.
    fn apply_line(&self, mutator: &StockMutator, line: &DocumentLine) -> DomainResult<i64>;

    /// Hook run after all lines were applied.
    fn finish(&mut self, _outcomes: &[LineOutcome]) {}

    fn id(&self) -> DocumentId {
        self.header().id
    }

    fn number(&self) -> &str {
        &self.header().number
    }

    fn status(&self) -> DocumentStatus {
        self.header().status
    }

    fn lines(&self) -> &[DocumentLine] {
        &self.header().lines
    }

    fn add_line(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        comment: &str,
    ) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if self.status() != DocumentStatus::Draft {
            return Err(DomainError::conflict("cannot add lines to a processed document"));
        }
        self.header_mut().lines.push(DocumentLine {
            product_id,
            quantity,
            comment: comment.to_string(),
        });
        Ok(())
    }

    /// Set one of the kind-specific fields. Unknown names are rejected.
    fn set_field(&mut self, name: &str, value: &str) -> DomainResult<()> {
        let title = self.title();
        match self.header_mut().fields.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(DomainError::validation(format!("{title} has no field '{name}'"))),
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.header().fields.get(name).map(String::as_str)
    }

    /// Sum of price × quantity over lines whose product is registered.
    fn total_cents(&self, registry: &ProductRegistry) -> u64 {
        self.lines()
            .iter()
            .filter_map(|line| {
                registry
                    .find(line.product_id)
                    .map(|p| p.price_cents().saturating_mul(u64::from(line.quantity)))
            })
            .fold(0u64, u64::saturating_add)
    }

    /// Apply every line (best-effort, in order) and move to the processed status.
    fn process(&mut self, mutator: &StockMutator) -> DomainResult<DocumentReport> {
        if self.status() != DocumentStatus::Draft {
            return Err(DomainError::conflict(format!(
                "{} {} already processed",
                self.title(),
                self.number()
            )));
        }

        let outcomes: Vec<LineOutcome> = self
            .lines()
            .iter()
            .map(|line| LineOutcome {
                product_id: line.product_id,
                quantity: line.quantity,
                result: self.apply_line(mutator, line),
            })
            .collect();

        self.finish(&outcomes);
        let status = self.processed_status();
        self.header_mut().status = status;

        tracing::info!(
            document_id = %self.id(),
            kind = self.kind().as_str(),
            number = self.number(),
            lines = outcomes.len(),
            "document processed"
        );

        Ok(DocumentReport {
            document_id: self.id(),
            kind: self.kind(),
            status,
            lines: outcomes,
        })
    }
}

/// Checkout receipt: stock leaves the shelf.
#[derive(Debug, Clone)]
pub struct SaleReceipt {
    header: DocumentHeader,
}

/// Goods received from a supplier.
#[derive(Debug, Clone)]
pub struct IncomeInvoice {
    header: DocumentHeader,
}

/// Goods shipped to a recipient.
#[derive(Debug, Clone)]
pub struct OutcomeInvoice {
    header: DocumentHeader,
}

/// Stocktake act: counts are compared with the registry, nothing is changed.
#[derive(Debug, Clone)]
pub struct StocktakeAct {
    header: DocumentHeader,
}

impl Document for SaleReceipt {
    fn header(&self) -> &DocumentHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut DocumentHeader {
        &mut self.header
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::SaleReceipt
    }

    fn title(&self) -> &'static str {
        "Sale receipt"
    }

    fn processed_status(&self) -> DocumentStatus {
        DocumentStatus::Sold
    }

    fn apply_line(&self, mutator: &StockMutator, line: &DocumentLine) -> DomainResult<i64> {
        mutator.reserve(line.product_id, line.quantity)
    }
}

impl Document for IncomeInvoice {
    fn header(&self) -> &DocumentHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut DocumentHeader {
        &mut self.header
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::IncomeInvoice
    }

    fn title(&self) -> &'static str {
        "Income invoice"
    }

    fn processed_status(&self) -> DocumentStatus {
        DocumentStatus::Accepted
    }

    fn apply_line(&self, mutator: &StockMutator, line: &DocumentLine) -> DomainResult<i64> {
        mutator.return_stock(line.product_id, line.quantity)
    }
}

impl Document for OutcomeInvoice {
    fn header(&self) -> &DocumentHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut DocumentHeader {
        &mut self.header
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::OutcomeInvoice
    }

    fn title(&self) -> &'static str {
        "Outcome invoice"
    }

    fn processed_status(&self) -> DocumentStatus {
        DocumentStatus::Shipped
    }

    fn apply_line(&self, mutator: &StockMutator, line: &DocumentLine) -> DomainResult<i64> {
        mutator.reserve(line.product_id, line.quantity)
    }
}

impl Document for StocktakeAct {
    fn header(&self) -> &DocumentHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut DocumentHeader {
        &mut self.header
    }

    fn kind(&self) -> DocumentKind {
        DocumentKind::Stocktake
    }

    fn title(&self) -> &'static str {
        "Stocktake act"
    }

    fn processed_status(&self) -> DocumentStatus {
        DocumentStatus::Reconciled
    }

    fn apply_line(&self, mutator: &StockMutator, line: &DocumentLine) -> DomainResult<i64> {
        mutator.apply(MutationKind::Check, line.product_id, line.quantity)
    }

    fn finish(&mut self, outcomes: &[LineOutcome]) {
        let shortfalls = outcomes.iter().filter(|o| !o.is_success()).count();
        let result = if shortfalls == 0 {
            "matched".to_string()
        } else {
            let noun = if shortfalls == 1 { "discrepancy" } else { "discrepancies" };
            format!("{shortfalls} {noun}")
        };
        if let Some(slot) = self.header.fields.get_mut("result") {
            *slot = result;
        }
    }
}

/// Runtime selection of the document type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentFactory;

impl DocumentFactory {
    pub fn create(
        kind: DocumentKind,
        id: DocumentId,
        number: &str,
        created_by: &str,
    ) -> Box<dyn Document> {
        match kind {
            DocumentKind::SaleReceipt => Box::new(SaleReceipt {
                header: DocumentHeader::new(
                    id,
                    number,
                    created_by,
                    &[
                        ("employee", ""),
                        ("shift", ""),
                        ("order_number", ""),
                        ("payment_type", "cash"),
                    ],
                ),
            }),
            DocumentKind::IncomeInvoice => Box::new(IncomeInvoice {
                header: DocumentHeader::new(
                    id,
                    number,
                    created_by,
                    &[
                        ("supplier", ""),
                        ("contract", ""),
                        ("invoice_ref", ""),
                        ("receiving_warehouse", "main"),
                    ],
                ),
            }),
            DocumentKind::OutcomeInvoice => Box::new(OutcomeInvoice {
                header: DocumentHeader::new(
                    id,
                    number,
                    created_by,
                    &[
                        ("recipient", ""),
                        ("basis", ""),
                        ("shipping_warehouse", "main"),
                        ("transport", ""),
                    ],
                ),
            }),
            DocumentKind::Stocktake => Box::new(StocktakeAct {
                header: DocumentHeader::new(
                    id,
                    number,
                    created_by,
                    &[
                        ("commission", ""),
                        ("warehouse", "main"),
                        ("reason", "scheduled stocktake"),
                        ("result", "not performed"),
                    ],
                ),
            }),
        }
    }
}
