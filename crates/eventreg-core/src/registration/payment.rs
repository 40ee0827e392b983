use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::models::{ModuleName, RegistrationRequest};

use super::discount::DiscountBook;
use super::steps::Rejection;

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("Receipt file is empty")]
    Empty,

    #[error("File size must be less than {} MB (got {size} bytes)", limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported receipt type '{0}' - use PDF, JPG or PNG")]
    UnsupportedType(String),

    #[error("Could not read receipt: {0}")]
    Io(#[from] std::io::Error),
}

/// File formats the payment desk accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Pdf,
    Jpeg,
    Png,
}

impl ReceiptKind {
    pub fn from_file_name(file_name: &str) -> Result<Self, ReceiptError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(ReceiptKind::Pdf),
            "jpg" | "jpeg" => Ok(ReceiptKind::Jpeg),
            "png" => Ok(ReceiptKind::Png),
            _ => Err(ReceiptError::UnsupportedType(file_name.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReceiptKind::Pdf => "application/pdf",
            ReceiptKind::Jpeg => "image/jpeg",
            ReceiptKind::Png => "image/png",
        }
    }
}

/// A validated payment receipt held in memory until submission.
#[derive(Clone, PartialEq, Eq)]
pub struct Receipt {
    file_name: String,
    kind: ReceiptKind,
    bytes: Vec<u8>,
}

impl fmt::Debug for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receipt")
            .field("file_name", &self.file_name)
            .field("kind", &self.kind)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Receipt {
    pub fn from_bytes(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        max_bytes: u64,
    ) -> Result<Self, ReceiptError> {
        let file_name = file_name.into();
        let kind = ReceiptKind::from_file_name(&file_name)?;
        Self::check_size(bytes.len() as u64, max_bytes)?;
        Ok(Self { file_name, kind, bytes })
    }

    /// Read a receipt from disk, checking type and size before loading it.
    pub async fn from_path(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, ReceiptError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let kind = ReceiptKind::from_file_name(&file_name)?;

        let metadata = tokio::fs::metadata(path).await?;
        Self::check_size(metadata.len(), max_bytes)?;
        let bytes = tokio::fs::read(path).await?;
        Self::check_size(bytes.len() as u64, max_bytes)?;

        Ok(Self { file_name, kind, bytes })
    }

    fn check_size(size: u64, max_bytes: u64) -> Result<(), ReceiptError> {
        if size == 0 {
            Err(ReceiptError::Empty)
        } else if size > max_bytes {
            Err(ReceiptError::TooLarge { size, limit: max_bytes })
        } else {
            Ok(())
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> ReceiptKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Payment step inputs. Kept intact across failed submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentForm {
    pub transaction_id: String,
    pub receipt: Option<Receipt>,
}

impl PaymentForm {
    pub fn has_transaction_id(&self) -> bool {
        !self.transaction_id.trim().is_empty()
    }
}

/// Everything `POST /events/{id}/payment` needs, frozen at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSubmission {
    pub team_name: String,
    /// First selected module; the payment record carries a single competition.
    pub competition: ModuleName,
    pub transaction_id: String,
    pub receipt: Receipt,
    pub discount_codes: BTreeMap<ModuleName, String>,
}

impl PaymentSubmission {
    /// Freeze the payment for the registration the server accepted.
    ///
    /// The server matches a payment to its registration by team name, so the
    /// team and modules come from `registered`, never from the live draft.
    pub fn build(
        registered: &RegistrationRequest,
        form: &PaymentForm,
        discounts: &DiscountBook,
    ) -> Result<Self, Rejection> {
        let competition = registered
            .modules
            .first()
            .cloned()
            .ok_or(Rejection::NoModulesSelected)?;
        let receipt = form.receipt.clone().ok_or(Rejection::MissingReceipt)?;
        if !form.has_transaction_id() {
            return Err(Rejection::MissingTransactionId);
        }

        Ok(Self {
            team_name: registered.team_name.trim().to_string(),
            competition,
            transaction_id: form.transaction_id.trim().to_string(),
            receipt,
            discount_codes: discounts.valid_codes_for(&registered.modules),
        })
    }

    /// `discount_codes` form field: a JSON object of module to code, omitted when empty.
    pub fn discount_codes_json(&self) -> Result<Option<String>> {
        if self.discount_codes.is_empty() {
            return Ok(None);
        }
        let json = serde_json::to_string(&self.discount_codes)
            .context("Failed to encode discount codes")?;
        Ok(Some(json))
    }
}
