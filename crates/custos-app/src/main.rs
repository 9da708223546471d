#![warn(missing_docs)]
//! # custos-app binary
//!
//! Prints the build version and the resolved runtime configuration.

use custos_app::{AppConfig, app_version, init_tracing};

/// CLI entry point.
fn main() {
    if let Err(error) = init_tracing() {
        eprintln!("failed to initialize logging: {error}");
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(stage = "startup", action = "load_config", %error, "invalid configuration");
            eprintln!("custos-app: {error}");
            std::process::exit(1);
        }
    };

    println!("custos-app {}", app_version());
    println!("relay={} (CUSTOS_RELAY_BASE_URL)", config.relay.base_url());
    println!(
        "evidence_contract={} (CUSTOS_CRIME_CONTRACT)",
        config.evidence_contract.as_deref().unwrap_or("<unset>")
    );
    println!(
        "require_media_library={} (CUSTOS_REQUIRE_LIBRARY_PERMISSION)",
        config.gate_policy.require_media_library
    );
    println!(
        "fee_token={} (CUSTOS_FEE_TOKEN)",
        config.fee_policy.preferred_token.as_deref().unwrap_or("<executor default>")
    );
    println!(
        "capture_enabled={} (CUSTOS_CAPTURE_ENABLED)",
        config.capture_enabled
    );
}
