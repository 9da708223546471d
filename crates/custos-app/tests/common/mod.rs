//! Shared fakes for app integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use custos_app::{AppConfig, ScreenServices};
use custos_capture::SyntheticCaptureDevice;
use custos_core::{CallDescriptor, EvidenceRecord, SubmissionParameters, WalletAccount, parse_stored_accounts};
use custos_permissions::{Permission, PermissionError, PermissionProvider, PermissionStatus};
use custos_submission::{
    AccountCompatibility, AccountProvider, ExecutionReceipt, GasPricing, GasTokenPrice,
    GaslessExecutor, GaslessOptions, MediaLibrary, RecordingRegistry, SubmissionError,
};

pub const CONTRACT: &str = "0x04b2c1e5f0a7";
pub const ACCOUNT_A: &str = "0x0a11ce";
pub const ACCOUNT_B: &str = "0x0b0b";
pub const FEE_TOKEN: &str = "0x05dc";

/// Grants everything except the listed permissions.
pub struct ScriptedPermissions {
    denied: Vec<Permission>,
}

impl ScriptedPermissions {
    pub fn denying(denied: &[Permission]) -> Self {
        Self {
            denied: denied.to_vec(),
        }
    }
}

#[async_trait]
impl PermissionProvider for ScriptedPermissions {
    async fn request(&self, permission: Permission) -> Result<PermissionStatus, PermissionError> {
        if self.denied.contains(&permission) {
            Ok(PermissionStatus::Denied)
        } else {
            Ok(PermissionStatus::Granted)
        }
    }
}

#[derive(Default)]
pub struct MemoryLibrary {
    pub fail: bool,
    pub saved: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaLibrary for MemoryLibrary {
    async fn save_to_library(&self, uri: &str) -> Result<(), SubmissionError> {
        if self.fail {
            return Err(SubmissionError::Library("storage full".to_string()));
        }
        self.saved.lock().expect("library lock").push(uri.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    pub records: Mutex<Vec<EvidenceRecord>>,
}

#[async_trait]
impl RecordingRegistry for MemoryRegistry {
    async fn register_recording(&self, record: &EvidenceRecord) -> Result<(), SubmissionError> {
        self.records.lock().expect("registry lock").push(record.clone());
        Ok(())
    }
}

/// Records every batch; the first `failures` batches are rejected.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub failures: AtomicU32,
    pub batches: Mutex<Vec<(String, Vec<CallDescriptor>, SubmissionParameters)>>,
    pub relays: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<(String, Vec<CallDescriptor>, SubmissionParameters)> {
        self.batches.lock().expect("executor lock").clone()
    }

    pub fn relays(&self) -> Vec<String> {
        self.relays.lock().expect("relay lock").clone()
    }
}

#[async_trait]
impl GaslessExecutor for ScriptedExecutor {
    async fn execute_calls(
        &self,
        account: &WalletAccount,
        calls: &[CallDescriptor],
        parameters: &SubmissionParameters,
        options: &GaslessOptions,
    ) -> Result<ExecutionReceipt, SubmissionError> {
        self.relays
            .lock()
            .expect("relay lock")
            .push(options.base_url().to_string());
        self.batches.lock().expect("executor lock").push((
            account.address.clone(),
            calls.to_vec(),
            parameters.clone(),
        ));
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SubmissionError::Execution("relay rejected call".to_string()));
        }
        Ok(ExecutionReceipt {
            transaction_hash: format!("0x{:04x}", self.batches().len()),
        })
    }
}

/// Compatible account, one priced token, counts fetches.
#[derive(Default)]
pub struct StaticPricing {
    pub fetches: AtomicU32,
}

impl StaticPricing {
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GasPricing for StaticPricing {
    async fn fetch_account_compatibility(
        &self,
        _address: &str,
        _options: &GaslessOptions,
    ) -> Result<AccountCompatibility, SubmissionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(AccountCompatibility {
            is_compatible: true,
            gas_consumed_overhead: 0,
        })
    }

    async fn fetch_gas_token_prices(
        &self,
        _options: &GaslessOptions,
    ) -> Result<Vec<GasTokenPrice>, SubmissionError> {
        Ok(vec![GasTokenPrice {
            token_address: FEE_TOKEN.to_string(),
            price_in_native: 400_000_000_000_000,
            decimals: 6,
        }])
    }
}

/// Raw JSON account store, as persisted by the wallet.
pub struct StoredAccounts {
    raw: Mutex<String>,
}

impl StoredAccounts {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: Mutex::new(raw.to_string()),
        }
    }

    pub fn replace(&self, raw: &str) {
        *self.raw.lock().expect("accounts lock") = raw.to_string();
    }
}

impl AccountProvider for StoredAccounts {
    fn accounts(&self) -> Result<Vec<WalletAccount>, SubmissionError> {
        let raw = self
            .raw
            .lock()
            .map_err(|_| SubmissionError::Accounts("lock poisoned".to_string()))?;
        Ok(parse_stored_accounts(&raw)?)
    }
}

pub fn stored(address: &str) -> String {
    format!(r#"[{{"address":"{address}","privateKey":"0xdead"}}]"#)
}

/// All fakes used by one screen.
pub struct Harness {
    pub permissions: Arc<ScriptedPermissions>,
    pub camera: Arc<SyntheticCaptureDevice>,
    pub library: Arc<MemoryLibrary>,
    pub registry: Arc<MemoryRegistry>,
    pub executor: Arc<ScriptedExecutor>,
    pub pricing: Arc<StaticPricing>,
    pub accounts: Arc<StoredAccounts>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            permissions: Arc::new(ScriptedPermissions::denying(&[])),
            camera: Arc::new(SyntheticCaptureDevice::new()),
            library: Arc::new(MemoryLibrary::default()),
            registry: Arc::new(MemoryRegistry::default()),
            executor: Arc::new(ScriptedExecutor::default()),
            pricing: Arc::new(StaticPricing::default()),
            accounts: Arc::new(StoredAccounts::new(&stored(ACCOUNT_A))),
        }
    }

    pub fn services(&self) -> ScreenServices {
        ScreenServices {
            permissions: self.permissions.clone(),
            camera: self.camera.clone(),
            library: self.library.clone(),
            registry: self.registry.clone(),
            executor: self.executor.clone(),
            pricing: self.pricing.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

/// Config with the evidence contract set plus `overrides`.
pub fn config(overrides: &[(&str, &str)]) -> AppConfig {
    let mut values: HashMap<String, String> = overrides
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    values
        .entry("CUSTOS_CRIME_CONTRACT".to_string())
        .or_insert_with(|| CONTRACT.to_string());
    AppConfig::from_lookup(|key| values.get(key).cloned()).expect("test config should load")
}
