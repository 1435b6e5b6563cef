use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Result};

pub const ENV_PREFIX: &str = "MAILPIXEL_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the MAILPIXEL_ prefix
    /// Used for platform variables (PORT, GOOGLE_SHEET_ID, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides to the runtime config.
///
/// Unprefixed platform variables are applied first so that an explicit
/// MAILPIXEL_* value always wins.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Hosting platforms hand us a bare port
    if let Some(port) = get_raw_env_string(env, "PORT") {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| anyhow!("Failed to parse PORT: {}", e))?;
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    // Standard Google credential variables
    if let Some(json) = get_raw_env_string(env, "GOOGLE_SERVICE_ACCOUNT_JSON") {
        config.sheets.credentials_json = Some(json);
    }
    if let Some(path) = get_raw_env_string(env, "GOOGLE_APPLICATION_CREDENTIALS") {
        config.sheets.credentials_path = Some(path);
    }
    if let Some(id) = get_raw_env_string(env, "GOOGLE_SHEET_ID") {
        config.sheets.document_id = Some(id);
    }

    // Server configuration (listen addr, log level/format)
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    // Tracking log connection
    if let Some(json) = get_env_string(env, "CREDENTIALS_JSON") {
        config.sheets.credentials_json = Some(json);
    }
    if let Some(path) = get_env_string(env, "CREDENTIALS_PATH") {
        config.sheets.credentials_path = Some(path);
    }
    if let Some(id) = get_env_string(env, "DOCUMENT_ID") {
        config.sheets.document_id = Some(id);
    }
    if let Some(name) = get_env_string(env, "SHEET_NAME") {
        config.sheets.sheet_name = name;
    }
    if let Some(base) = get_env_string(env, "SHEETS_API_BASE") {
        config.sheets.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(val) = get_env_u64(env, "REQUEST_TIMEOUT_SECS")? {
        config.sheets.request_timeout_secs = val;
    }

    // Tracking behaviour
    if let Some(val) = get_env_u64(env, "DEDUP_WINDOW_MS")? {
        config.tracking.dedup_window_ms = val;
    }
    if let Some(list) = get_env_string(env, "IGNORED_SENDERS") {
        config.tracking.ignored_senders = parse_list(&list);
    }
    if let Some(val) = get_env_bool(env, "CREATE_MISSING_ROWS")? {
        config.tracking.create_missing_rows = val;
    }
    if let Some(val) = get_env_u64(env, "LOAD_ATTEMPTS")? {
        config.tracking.load_attempts = u32::try_from(val)
            .map_err(|e| anyhow!("Failed to parse {}LOAD_ATTEMPTS: {}", ENV_PREFIX, e))?;
    }
    if let Some(val) = get_env_u64(env, "RETRY_DELAY_MS")? {
        config.tracking.retry_delay_ms = val;
    }

    Ok(())
}

/// Prefixed lookup; blank values are treated as unset.
fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.trim().is_empty())
}

/// Get a raw environment variable without the MAILPIXEL_ prefix
fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key).filter(|v| !v.trim().is_empty())
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.trim().to_lowercase().parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
