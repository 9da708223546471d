#![warn(missing_docs)]
//! # custos-submission
//!
//! ## Purpose
//! Anchors named evidence on-chain through a gasless executor.
//!
//! ## Responsibilities
//! - Define the collaborator traits: media library, off-chain registry,
//!   gasless executor, gas pricing, and wallet accounts.
//! - Validate relay options and the contract registry.
//! - Derive [`SubmissionParameters`] from pricing data via [`FeeTokenPolicy`].
//! - Run the sequential [`SubmissionPipeline`].
//!
//! ## Data flow
//! [`EvidenceRecord`] -> save media -> register record -> build one
//! [`CallDescriptor`] -> [`GaslessExecutor::execute_calls`] ->
//! [`SubmissionReport`].
//!
//! ## Ownership and lifetimes
//! Collaborators are shared `Arc<dyn _>` handles; records and descriptors are
//! borrowed for one submission and cloned into the report.
//!
//! ## Error model
//! Only the execution step (and a missing contract) fails a submission.
//! Library and registry failures are logged and surfaced as flags on the
//! report, so partial completion is visible and retriable.
//!
//! ## Security and privacy notes
//! Signing stays with the executor; this crate only sees account addresses.

use std::sync::Arc;

use async_trait::async_trait;
use custos_core::{
    CallDescriptor, CoreError, EvidenceRecord, SubmissionParameters, WalletAccount,
    validate_address,
};
use thiserror::Error;
use url::Url;

/// Default relay used for gasless execution on the Sepolia test network.
pub const SEPOLIA_RELAY_BASE_URL: &str = "https://sepolia.api.avnu.fi";

/// Operator-facing text shown when on-chain execution fails.
pub const EXECUTION_FAILED_MESSAGE: &str = "Failed to execute transaction. Please try again.";

/// Default safety multiplier applied to converted fee budgets.
pub const DEFAULT_MAX_FEE_MULTIPLIER: u32 = 3;

/// Connection options for the gasless relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaslessOptions {
    base_url: Url,
}

impl GaslessOptions {
    /// Creates validated relay options.
    ///
    /// # Errors
    /// Returns [`SubmissionError::InvalidRelay`] for unparsable or non-HTTPS
    /// URLs.
    pub fn new(base_url: &str) -> Result<Self, SubmissionError> {
        let parsed = Url::parse(base_url)
            .map_err(|error| SubmissionError::InvalidRelay(format!("invalid relay url: {error}")))?;

        if parsed.scheme() != "https" {
            return Err(SubmissionError::InvalidRelay(
                "relay endpoint must use https".to_string(),
            ));
        }

        Ok(Self { base_url: parsed })
    }

    /// Returns the relay base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns options for the Sepolia relay.
    ///
    /// # Errors
    /// Propagates [`GaslessOptions::new`] validation errors.
    pub fn sepolia() -> Result<Self, SubmissionError> {
        Self::new(SEPOLIA_RELAY_BASE_URL)
    }
}

/// Process-wide registry of deployed contract addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractRegistry {
    evidence_contract: Option<String>,
}

impl ContractRegistry {
    /// Creates a registry with an optional evidence contract address.
    ///
    /// # Errors
    /// Returns [`SubmissionError::Core`] when the address is malformed.
    pub fn new(evidence_contract: Option<String>) -> Result<Self, SubmissionError> {
        if let Some(address) = &evidence_contract {
            validate_address(address)?;
        }
        Ok(Self { evidence_contract })
    }

    /// Returns the evidence contract address.
    ///
    /// # Errors
    /// Returns [`SubmissionError::ContractUnavailable`] when none is deployed.
    pub fn evidence_contract(&self) -> Result<&str, SubmissionError> {
        self.evidence_contract
            .as_deref()
            .ok_or(SubmissionError::ContractUnavailable)
    }
}

/// Receipt returned by the gasless executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Hash of the relayed transaction.
    pub transaction_hash: String,
}

/// Whether an account can use gasless execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountCompatibility {
    /// Account contract supports relayed execution.
    pub is_compatible: bool,
    /// Extra gas consumed by the relay wrapper.
    pub gas_consumed_overhead: u128,
}

/// Live price of one fee token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasTokenPrice {
    /// Fee token contract address.
    pub token_address: String,
    /// Native-asset base units per one whole token.
    pub price_in_native: u128,
    /// Token decimals.
    pub decimals: u8,
}

/// Device media library.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Copies the media at `uri` into the library.
    async fn save_to_library(&self, uri: &str) -> Result<(), SubmissionError>;
}

/// Off-chain bookkeeping of submitted recordings.
#[async_trait]
pub trait RecordingRegistry: Send + Sync {
    /// Registers one evidence record.
    async fn register_recording(&self, record: &EvidenceRecord) -> Result<(), SubmissionError>;
}

/// Gas-abstracted executor that signs and relays calls.
#[async_trait]
pub trait GaslessExecutor: Send + Sync {
    /// Executes `calls` for `account` in one round-trip through the relay
    /// named by `options`.
    async fn execute_calls(
        &self,
        account: &WalletAccount,
        calls: &[CallDescriptor],
        parameters: &SubmissionParameters,
        options: &GaslessOptions,
    ) -> Result<ExecutionReceipt, SubmissionError>;
}

/// Fee token compatibility and price feed.
#[async_trait]
pub trait GasPricing: Send + Sync {
    /// Reports whether `address` can use gasless execution.
    async fn fetch_account_compatibility(
        &self,
        address: &str,
        options: &GaslessOptions,
    ) -> Result<AccountCompatibility, SubmissionError>;

    /// Lists supported fee tokens with live prices.
    async fn fetch_gas_token_prices(
        &self,
        options: &GaslessOptions,
    ) -> Result<Vec<GasTokenPrice>, SubmissionError>;
}

/// Wallet account store.
pub trait AccountProvider: Send + Sync {
    /// Returns stored accounts; the first entry is the active signer.
    fn accounts(&self) -> Result<Vec<WalletAccount>, SubmissionError>;

    /// Returns the active signer, if any account is stored.
    fn active_account(&self) -> Result<Option<WalletAccount>, SubmissionError> {
        Ok(self.accounts()?.into_iter().next())
    }
}

/// Pricing data fetched for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricingSnapshot {
    /// Account the snapshot was fetched for.
    pub account_address: String,
    /// Compatibility answer, absent when the fetch failed.
    pub compatibility: Option<AccountCompatibility>,
    /// Token prices, empty when the fetch failed.
    pub prices: Vec<GasTokenPrice>,
}

/// Fetches compatibility and prices for `address`.
///
/// Fetch failures are logged and leave the corresponding field empty.
pub async fn refresh_pricing(
    pricing: &dyn GasPricing,
    address: &str,
    options: &GaslessOptions,
) -> PricingSnapshot {
    let compatibility = match pricing.fetch_account_compatibility(address, options).await {
        Ok(compatibility) => Some(compatibility),
        Err(error) => {
            tracing::warn!(stage = "pricing", action = "compatibility", %error, "fetch failed");
            None
        }
    };

    let prices = match pricing.fetch_gas_token_prices(options).await {
        Ok(prices) => prices,
        Err(error) => {
            tracing::warn!(stage = "pricing", action = "token_prices", %error, "fetch failed");
            Vec::new()
        }
    };

    PricingSnapshot {
        account_address: address.to_string(),
        compatibility,
        prices,
    }
}

/// Chooses the fee token and fee cap for submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeTokenPolicy {
    /// Token to pay fees in; `None` leaves the choice to the executor.
    pub preferred_token: Option<String>,
    /// Expected fee in native base units, converted into the fee cap.
    pub native_fee_budget: Option<u128>,
    /// Multiplier applied to the converted budget.
    pub max_fee_multiplier: u32,
}

impl Default for FeeTokenPolicy {
    fn default() -> Self {
        Self {
            preferred_token: None,
            native_fee_budget: None,
            max_fee_multiplier: DEFAULT_MAX_FEE_MULTIPLIER,
        }
    }
}

impl FeeTokenPolicy {
    /// Derives submission parameters from `snapshot`.
    ///
    /// The preferred token is used only when the account is compatible and
    /// the token has a live price; otherwise both parameters stay absent.
    pub fn resolve(&self, snapshot: &PricingSnapshot) -> SubmissionParameters {
        let Some(preferred) = &self.preferred_token else {
            return SubmissionParameters::default();
        };

        let compatible = snapshot
            .compatibility
            .map(|compatibility| compatibility.is_compatible)
            .unwrap_or(false);
        if !compatible {
            tracing::info!(stage = "pricing", action = "resolve", "account not gasless compatible");
            return SubmissionParameters::default();
        }

        let Some(price) = snapshot
            .prices
            .iter()
            .find(|price| price.token_address.eq_ignore_ascii_case(preferred))
        else {
            tracing::info!(stage = "pricing", action = "resolve", token = %preferred, "no live price");
            return SubmissionParameters::default();
        };

        let max_fee_token_amount = self
            .native_fee_budget
            .and_then(|budget| fee_in_gas_token(budget, price))
            .and_then(|amount| amount.checked_mul(u128::from(self.max_fee_multiplier)));

        SubmissionParameters {
            fee_token_address: Some(price.token_address.clone()),
            max_fee_token_amount,
        }
    }
}

/// Converts a native fee into fee-token base units, rounding up.
///
/// Returns `None` for a zero price or on overflow.
pub fn fee_in_gas_token(native_fee: u128, price: &GasTokenPrice) -> Option<u128> {
    if price.price_in_native == 0 {
        return None;
    }
    let scale = 10u128.checked_pow(u32::from(price.decimals))?;
    let scaled = native_fee.checked_mul(scale)?;
    Some(scaled.div_ceil(price.price_in_native))
}

/// Outcome of one successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReport {
    /// Fingerprint of the submitted record.
    pub fingerprint: String,
    /// The single call that was executed.
    pub call: CallDescriptor,
    /// Executor receipt.
    pub receipt: ExecutionReceipt,
    /// Media library save succeeded.
    pub saved_to_library: bool,
    /// Off-chain registration succeeded.
    pub registered: bool,
}

/// Sequential evidence submission pipeline.
#[derive(Clone)]
pub struct SubmissionPipeline {
    library: Arc<dyn MediaLibrary>,
    registry: Arc<dyn RecordingRegistry>,
    executor: Arc<dyn GaslessExecutor>,
    contracts: ContractRegistry,
    relay: GaslessOptions,
}

impl SubmissionPipeline {
    /// Creates a pipeline over the given collaborators.
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        registry: Arc<dyn RecordingRegistry>,
        executor: Arc<dyn GaslessExecutor>,
        contracts: ContractRegistry,
        relay: GaslessOptions,
    ) -> Self {
        Self {
            library,
            registry,
            executor,
            contracts,
            relay,
        }
    }

    /// Returns the contract registry in use.
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Returns the relay options passed to the executor.
    pub fn relay(&self) -> &GaslessOptions {
        &self.relay
    }

    /// Submits `record` on behalf of `account`.
    ///
    /// Steps run strictly in order: save media, validate the record, register
    /// it, build one `coverCrime` call, execute. Save and register failures
    /// do not stop the pipeline.
    ///
    /// # Errors
    /// Returns [`SubmissionError::ContractUnavailable`] without a deployed
    /// contract, [`SubmissionError::Core`] for invalid records, and the
    /// executor's error when execution fails.
    pub async fn submit(
        &self,
        record: &EvidenceRecord,
        account: &WalletAccount,
        parameters: &SubmissionParameters,
    ) -> Result<SubmissionReport, SubmissionError> {
        let contract = self.contracts.evidence_contract()?;
        let fingerprint = record.fingerprint()?;

        let saved_to_library = match self.library.save_to_library(&record.media_uri).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    stage = "submission",
                    action = "save_to_library",
                    evidence = %fingerprint,
                    %error,
                    "local save failed; continuing"
                );
                false
            }
        };

        if record.title.trim().is_empty() {
            return Err(SubmissionError::Core(CoreError::EmptyTitle));
        }

        let registered = match self.registry.register_recording(record).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    stage = "submission",
                    action = "register_recording",
                    evidence = %fingerprint,
                    %error,
                    "off-chain registration failed; continuing"
                );
                false
            }
        };

        let call = CallDescriptor::cover_crime(contract, record)?;
        let receipt = self
            .executor
            .execute_calls(account, std::slice::from_ref(&call), parameters, &self.relay)
            .await
            .inspect_err(|error| {
                tracing::error!(
                    stage = "submission",
                    action = "execute_calls",
                    evidence = %fingerprint,
                    %error,
                    "execution rejected"
                );
            })?;

        tracing::info!(
            stage = "submission",
            action = "confirmed",
            evidence = %fingerprint,
            transaction = %receipt.transaction_hash,
            saved_to_library,
            registered,
            "evidence anchored"
        );

        Ok(SubmissionReport {
            fingerprint,
            call,
            receipt,
            saved_to_library,
            registered,
        })
    }
}

/// Submission layer errors.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Executor rejected or failed the call.
    #[error("execution failed: {0}")]
    Execution(String),
    /// No wallet account is available to sign.
    #[error("no active wallet account")]
    NoAccount,
    /// No evidence contract address is configured.
    #[error("evidence contract address is not configured")]
    ContractUnavailable,
    /// Relay endpoint violates policy.
    #[error("invalid relay endpoint: {0}")]
    InvalidRelay(String),
    /// Media library failure.
    #[error("media library failure: {0}")]
    Library(String),
    /// Off-chain registry failure.
    #[error("recording registry failure: {0}")]
    Registry(String),
    /// Pricing service failure.
    #[error("gas pricing failure: {0}")]
    Pricing(String),
    /// Account store failure.
    #[error("account store failure: {0}")]
    Accounts(String),
    /// Record or descriptor validation failure.
    #[error("invalid evidence: {0}")]
    Core(#[from] CoreError),
}

impl SubmissionError {
    /// Returns the message shown to the operator.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Execution(_) => EXECUTION_FAILED_MESSAGE.to_string(),
            SubmissionError::NoAccount => "Connect a wallet before saving evidence.".to_string(),
            SubmissionError::ContractUnavailable => {
                "Evidence contract is unavailable. Please try again later.".to_string()
            }
            SubmissionError::Core(CoreError::EmptyTitle) => {
                "Give your evidence a name before saving.".to_string()
            }
            other => format!("Failed to save evidence: {other}"),
        }
    }
}
