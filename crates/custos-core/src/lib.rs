#![warn(missing_docs)]
//! # custos-core
//!
//! ## Purpose
//! Defines the pure data model used across the `custos` workspace.
//!
//! ## Responsibilities
//! - Represent captured media and the evidence record derived from it.
//! - Build the single `coverCrime` call descriptor submitted on-chain.
//! - Carry fee parameters handed to the gasless executor.
//! - Validate contract/account addresses and parse stored wallet accounts.
//!
//! ## Data flow
//! Capture code emits [`CapturedMedia`]. At submission time the operator's
//! title turns it into an [`EvidenceRecord`], which is packaged into a
//! [`CallDescriptor`] and executed with [`SubmissionParameters`].
//!
//! ## Ownership and lifetimes
//! All values own their strings so records can outlive the capture task that
//! produced them and be retried without re-borrowing screen state.
//!
//! ## Error model
//! Blank titles, empty locators, malformed addresses and codec failures return
//! [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! Stored account parsing keeps only the public address; any key material in
//! the stored JSON is dropped during deserialization.
//!
//! ## Example
//! ```rust
//! use custos_core::{CallDescriptor, CapturedMedia, EvidenceRecord, COVER_CRIME_ENTRYPOINT};
//! use time::macros::datetime;
//!
//! let media = CapturedMedia::video("file:///clip.mp4", 10, "720p").unwrap();
//! let record = EvidenceRecord::new("Incident A", &media, datetime!(2024-05-01 12:00 UTC)).unwrap();
//! let call = CallDescriptor::cover_crime("0x1234", &record).unwrap();
//! assert_eq!(call.entrypoint, COVER_CRIME_ENTRYPOINT);
//! assert_eq!(call.calldata, vec!["file:///clip.mp4".to_string()]);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Contract entrypoint that anchors one evidence locator on-chain.
pub const COVER_CRIME_ENTRYPOINT: &str = "coverCrime";

/// Maximum field element width accepted for addresses, in bytes.
pub const MAX_ADDRESS_BYTES: usize = 32;

/// Kind of media produced by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Single still image.
    Photo,
    /// Recorded video clip.
    Video,
}

/// Media produced by one completed capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedMedia {
    /// Device locator of the captured file.
    pub uri: String,
    /// Photo or video.
    pub kind: MediaKind,
    /// Displayed recording length; only present for videos.
    pub duration_seconds: Option<u32>,
    /// Quality preset the device was asked for.
    pub quality_hint: String,
}

impl CapturedMedia {
    /// Creates video media with its displayed duration.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyMediaUri`] when `uri` is blank.
    pub fn video(
        uri: impl Into<String>,
        duration_seconds: u32,
        quality_hint: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Self::build(
            uri.into(),
            MediaKind::Video,
            Some(duration_seconds),
            quality_hint.into(),
        )
    }

    /// Creates photo media.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyMediaUri`] when `uri` is blank.
    pub fn photo(uri: impl Into<String>, quality_hint: impl Into<String>) -> Result<Self, CoreError> {
        Self::build(uri.into(), MediaKind::Photo, None, quality_hint.into())
    }

    fn build(
        uri: String,
        kind: MediaKind,
        duration_seconds: Option<u32>,
        quality_hint: String,
    ) -> Result<Self, CoreError> {
        if uri.trim().is_empty() {
            return Err(CoreError::EmptyMediaUri);
        }

        Ok(Self {
            uri,
            kind,
            duration_seconds,
            quality_hint,
        })
    }
}

/// Named evidence snapshot handed to registration and on-chain submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Operator supplied title.
    pub title: String,
    /// RFC 3339 UTC timestamp taken at submission time.
    #[serde(rename = "timestamp")]
    pub timestamp_iso: String,
    /// Locator of the captured media.
    #[serde(rename = "uri")]
    pub media_uri: String,
}

impl EvidenceRecord {
    /// Builds a record from captured media and an operator title.
    ///
    /// The title is trimmed; the timestamp is normalized to UTC.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyTitle`] for blank titles and
    /// [`CoreError::Timestamp`] when the instant cannot be formatted.
    pub fn new(
        title: &str,
        media: &CapturedMedia,
        submitted_at: OffsetDateTime,
    ) -> Result<Self, CoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::EmptyTitle);
        }

        let timestamp_iso = submitted_at
            .to_offset(UtcOffset::UTC)
            .format(&Rfc3339)
            .map_err(|error| CoreError::Timestamp(error.to_string()))?;

        Ok(Self {
            title: title.to_string(),
            timestamp_iso,
            media_uri: media.uri.clone(),
        })
    }

    /// Returns the lowercase hex SHA-256 of the record's JSON encoding.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn fingerprint(&self) -> Result<String, CoreError> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    /// Serializes the record to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }
}

/// Fee parameters forwarded to the gasless executor.
///
/// Absent values mean "use the executor default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionParameters {
    /// Token used to pay fees instead of the native asset.
    pub fee_token_address: Option<String>,
    /// Upper bound on the fee, in fee-token base units.
    pub max_fee_token_amount: Option<u128>,
}

impl SubmissionParameters {
    /// Returns `true` when no override is set.
    pub fn is_default(&self) -> bool {
        self.fee_token_address.is_none() && self.max_fee_token_amount.is_none()
    }
}

/// One contract call to be executed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDescriptor {
    /// Contract entrypoint name.
    pub entrypoint: String,
    /// Target contract address.
    pub contract_address: String,
    /// Ordered call arguments.
    pub calldata: Vec<String>,
}

impl CallDescriptor {
    /// Builds the `coverCrime` call anchoring `record`'s media locator.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidAddress`] for malformed contract addresses
    /// and [`CoreError::EmptyMediaUri`] when the record has no locator.
    pub fn cover_crime(contract_address: &str, record: &EvidenceRecord) -> Result<Self, CoreError> {
        validate_address(contract_address)?;
        if record.media_uri.trim().is_empty() {
            return Err(CoreError::EmptyMediaUri);
        }

        Ok(Self {
            entrypoint: COVER_CRIME_ENTRYPOINT.to_string(),
            contract_address: contract_address.to_string(),
            calldata: vec![record.media_uri.clone()],
        })
    }
}

/// Wallet account entry; the first stored entry is the active signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    /// Account contract address.
    pub address: String,
}

impl WalletAccount {
    /// Creates a validated account entry.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidAddress`] when `address` is malformed.
    pub fn new(address: impl Into<String>) -> Result<Self, CoreError> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self { address })
    }
}

/// Parses the stored account list (a JSON array of objects with `address`).
///
/// # Errors
/// Returns [`CoreError::Codec`] for malformed JSON and
/// [`CoreError::InvalidAddress`] when any entry has a malformed address.
pub fn parse_stored_accounts(raw: &str) -> Result<Vec<WalletAccount>, CoreError> {
    let accounts: Vec<WalletAccount> = serde_json::from_str(raw)?;
    for account in &accounts {
        validate_address(&account.address)?;
    }
    Ok(accounts)
}

/// Validates a `0x`-prefixed hex field element of at most 32 bytes.
///
/// # Errors
/// Returns [`CoreError::InvalidAddress`] describing the first violation.
pub fn validate_address(address: &str) -> Result<(), CoreError> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| CoreError::InvalidAddress(format!("{address}: missing 0x prefix")))?;

    if digits.is_empty() {
        return Err(CoreError::InvalidAddress(format!("{address}: no digits")));
    }

    if digits.len() > MAX_ADDRESS_BYTES * 2 {
        return Err(CoreError::InvalidAddress(format!(
            "{address}: wider than {MAX_ADDRESS_BYTES} bytes"
        )));
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    hex::decode(&padded)
        .map_err(|error| CoreError::InvalidAddress(format!("{address}: {error}")))?;

    Ok(())
}

/// Error type for core validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Evidence title must contain non-whitespace characters.
    #[error("evidence title is empty")]
    EmptyTitle,
    /// Media locator must not be blank.
    #[error("media uri is empty")]
    EmptyMediaUri,
    /// Address failed hex field element validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Submission instant could not be rendered.
    #[error("timestamp formatting failed: {0}")]
    Timestamp(String),
    /// JSON encoding/decoding error.
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}
