// src/pipeline/validate.rs

use std::path::Path;

use crate::error::Result;
use crate::models::Config;
use crate::utils::http::build_headers;
use crate::utils::log;

/// Load and validate a configuration file, logging the effective settings.
pub fn run_validate(config_path: &Path) -> Result<Config> {
    log::header("Validating configuration");

    let result = Config::load(config_path).and_then(|config| {
        config.validate()?;
        build_headers(&config.http.headers)?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            log::success(&format!("Configuration valid: {}", config_path.display()));
            log::sub_item(&format!("User agent: {}", config.http.user_agent));
            log::sub_item(&format!("Timeout: {}s", config.http.timeout_secs));
            log::sub_item(&format!("Headers: {}", config.http.headers.len()));
            log::sub_item(&format!(
                "In flight: {} (per host {})",
                config.scheduler.max_in_flight, config.scheduler.max_per_host
            ));
            log::sub_item(&format!(
                "Listing: cursors {}..={} step {}",
                config.source.listing_start, config.source.listing_ceiling, config.source.page_step
            ));
            log::sub_item(&format!(
                "Retries: {} rate-limited ({}ms base), {} transient",
                config.retry.max_rate_limit_retries,
                config.retry.backoff_base_ms,
                config.retry.max_transient_retries
            ));
            log::sub_item(&format!(
                "Checkpoints: {} every {} items",
                config.checkpoint.dir.display(),
                config.checkpoint.interval
            ));
            Ok(config)
        }
        Err(e) => {
            log::error(&format!("Configuration invalid: {}", e));
            Err(e)
        }
    }
}
