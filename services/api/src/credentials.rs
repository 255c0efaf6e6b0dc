use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use realtime_middle_tier::{Credential, TokenProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;

pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
pub const SEARCH_SCOPE: &str = "https://search.azure.com/.default";

/// Tokens are refreshed this many seconds before they expire.
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

#[cfg(windows)]
const AZ: &str = "az.cmd";
#[cfg(not(windows))]
const AZ: &str = "az";

/// Output of `az account get-access-token --output json`.
#[derive(Debug, Deserialize)]
struct AzAccessToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix timestamp, present in newer CLI versions.
    #[serde(default)]
    expires_on: Option<i64>,
    /// Local time, e.g. "2024-05-01 13:45:10.000000".
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

fn parse_token(stdout: &[u8]) -> Result<CachedToken> {
    let raw: AzAccessToken =
        serde_json::from_slice(stdout).context("unexpected output from az account get-access-token")?;

    let expires_at = match (raw.expires_on, raw.expires_on_local.as_deref()) {
        (Some(timestamp), _) => DateTime::from_timestamp(timestamp, 0)
            .with_context(|| format!("token expiry {} is out of range", timestamp))?,
        (None, Some(local)) => {
            let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
                .with_context(|| format!("unrecognized token expiry '{}'", local))?;
            Local
                .from_local_datetime(&naive)
                .earliest()
                .with_context(|| format!("token expiry '{}' does not exist locally", local))?
                .with_timezone(&Utc)
        }
        (None, None) => bail!("az returned a token without an expiry"),
    };

    Ok(CachedToken {
        token: SecretString::from(raw.access_token),
        expires_at,
    })
}

/// Bearer tokens from the signed-in Azure CLI, cached until shortly before expiry.
pub struct AzureCliCredential {
    scope: String,
    tenant_id: Option<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl AzureCliCredential {
    pub fn new(scope: &str, tenant_id: Option<&str>) -> Self {
        Self {
            scope: scope.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            cache: Mutex::new(None),
        }
    }

    fn command_args(&self) -> Vec<&str> {
        let mut args = vec!["account", "get-access-token", "--scope", self.scope.as_str()];
        if let Some(tenant_id) = &self.tenant_id {
            args.extend(["--tenant", tenant_id.as_str()]);
        }
        args.extend(["--output", "json"]);
        args
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let output = Command::new(AZ)
            .args(self.command_args())
            .output()
            .await
            .context("Failed to run the Azure CLI; is `az` installed and on PATH?")?;
        if !output.status.success() {
            bail!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_token(&output.stdout)
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    async fn token(&self) -> Result<SecretString> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(SecretString::from(cached.token.expose_secret().to_string()));
        }

        tracing::debug!("requesting a token for {} from the Azure CLI", self.scope);
        let fresh = self.fetch().await?;
        tracing::info!(
            "obtained token for {} valid until {}",
            self.scope,
            fresh.expires_at
        );
        let token = SecretString::from(fresh.token.expose_secret().to_string());
        *cache = Some(fresh);
        Ok(token)
    }
}

/// The API key when one is configured, otherwise a warmed-up Azure CLI credential.
pub async fn credential_for(
    api_key: Option<SecretString>,
    scope: &str,
    tenant_id: Option<&str>,
) -> Result<Credential> {
    if let Some(key) = api_key {
        return Ok(Credential::ApiKey(key));
    }

    match tenant_id {
        Some(tenant_id) => tracing::info!("Using Azure CLI credentials for tenant {}", tenant_id),
        None => tracing::info!("Using Azure CLI credentials"),
    }
    let provider = AzureCliCredential::new(scope, tenant_id);
    provider
        .token()
        .await
        .with_context(|| format!("Failed to acquire a token for {}", scope))?;
    Ok(Credential::Bearer(Arc::new(provider)))
}
