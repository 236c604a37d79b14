use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Result};

const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub text_model: String,
    pub image_model: String,
    /// Upper bound for a single AI gateway call (text or one image view).
    pub ai_call_timeout: Duration,
    pub supabase: Option<SupabaseConfig>,
    /// JSON file of designs and access tokens for local mode.
    pub local_seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub storage_bucket: String,
    pub designs_table: String,
    pub inquiries_table: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let var_or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let Some(gemini_api_key) = var("GEMINI_API_KEY") else {
            bail!("GEMINI_API_KEY must be set");
        };

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
                storage_bucket: var_or("SUPABASE_STORAGE_BUCKET", "design-renders"),
                designs_table: var_or("SUPABASE_DESIGNS_TABLE", "saved_designs"),
                inquiries_table: var_or("SUPABASE_INQUIRIES_TABLE", "custom_inquiries"),
            }),
            (None, None) => None,
            _ => bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together"),
        };

        Ok(Self {
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            gemini_api_key,
            gemini_api_base: var_or("GEMINI_API_BASE", DEFAULT_GEMINI_BASE),
            text_model: var_or("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            image_model: var_or("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image-preview"),
            ai_call_timeout: Duration::from_secs(
                var("AI_CALL_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(90),
            ),
            supabase,
            local_seed_file: var("LOCAL_SEED_FILE").map(PathBuf::from),
        })
    }
}
