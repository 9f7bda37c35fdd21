//! Algod REST client — the slice of the node's v2 API this app needs:
//! suggested params, application/account state, raw submission and
//! round/pending-status polling.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::txn::{SuggestedParams, VALIDITY_WINDOW};

const AUTH_HEADER: &str = "X-Algo-API-Token";

// ─────────────────────────────────────────────────────────
// REST response shapes
// ─────────────────────────────────────────────────────────

/// One global- or local-state entry as the node reports it: a base64 key
/// and a payload tagged as either bytes or a uint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: TealValue,
}

/// Tag 1 marks a byte string, tag 2 a uint. The node serializes both
/// payload fields regardless, so the tag is the only reliable signal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TealValue {
    #[serde(rename = "type")]
    pub kind: u64,
    #[serde(default)]
    pub bytes: String,
    #[serde(default)]
    pub uint: u64,
}

pub const TEAL_BYTES: u64 = 1;
pub const TEAL_UINT: u64 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub address: String,
    /// Balance in base units.
    pub amount: u64,
    #[serde(rename = "apps-local-state", default)]
    pub apps_local_state: Vec<AppLocalState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppLocalState {
    pub id: u64,
    #[serde(rename = "key-value", default)]
    pub key_value: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingInfo {
    #[serde(rename = "confirmed-round", default)]
    pub confirmed_round: u64,
    #[serde(rename = "pool-error", default)]
    pub pool_error: String,
}

#[derive(Debug, Deserialize)]
struct ParamsDto {
    #[serde(default)]
    fee: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
    #[serde(rename = "genesis-hash")]
    genesis_hash: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationDto {
    params: ApplicationParamsDto,
}

#[derive(Debug, Deserialize)]
struct ApplicationParamsDto {
    #[serde(rename = "global-state", default)]
    global_state: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct StatusDto {
    #[serde(rename = "last-round")]
    last_round: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitDto {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDto {
    message: String,
}

// ─────────────────────────────────────────────────────────
// Ledger trait
// ─────────────────────────────────────────────────────────

/// The node operations the builder, decoder and waiter depend on.
/// [`AlgodClient`] is the production implementation; tests substitute an
/// in-memory ledger.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    async fn suggested_params(&self) -> Result<SuggestedParams>;
    async fn global_state(&self, app_id: u64) -> Result<Vec<KeyValue>>;
    async fn account(&self, address: &str) -> Result<AccountInfo>;
    /// Broadcasts one transaction or one atomic group as a single call.
    async fn submit(&self, blobs: &[Vec<u8>]) -> Result<String>;
    async fn last_round(&self) -> Result<u64>;
    /// Blocks until the round after `round` is finalized.
    async fn wait_for_round_after(&self, round: u64) -> Result<u64>;
    async fn pending(&self, txid: &str) -> Result<PendingInfo>;
}

// ─────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────

pub struct AlgodClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AlgodClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(AlgodClient {
            http,
            base_url: config.algod_url.trim_end_matches('/').to_string(),
            token: config.algod_token.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.http.get(format!("{}{path}", self.base_url));
        if self.token.is_empty() {
            request
        } else {
            request.header(AUTH_HEADER, &self.token)
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }
}

/// Algod error bodies are `{"message": "..."}`; fall back to the raw text.
fn api_error(status: u16, body: String) -> ClientError {
    let message = match serde_json::from_str::<ErrorDto>(&body) {
        Ok(err) => err.message,
        Err(_) => body,
    };
    ClientError::Api { status, message }
}

fn params_from_dto(dto: ParamsDto) -> Result<SuggestedParams> {
    let hash = BASE64
        .decode(&dto.genesis_hash)
        .map_err(|e| ClientError::Wire(format!("genesis hash: {e}")))?;
    let genesis_hash: [u8; 32] = hash
        .try_into()
        .map_err(|_| ClientError::Wire("genesis hash is not 32 bytes".to_string()))?;
    Ok(SuggestedParams {
        fee: dto.fee,
        min_fee: dto.min_fee,
        first_valid: dto.last_round,
        last_valid: dto.last_round + VALIDITY_WINDOW,
        genesis_id: dto.genesis_id,
        genesis_hash,
    })
}

impl Ledger for AlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let dto: ParamsDto = self.fetch("/v2/transactions/params").await?;
        params_from_dto(dto)
    }

    async fn global_state(&self, app_id: u64) -> Result<Vec<KeyValue>> {
        let dto: ApplicationDto = self.fetch(&format!("/v2/applications/{app_id}")).await?;
        debug!("app {app_id}: {} global-state entries", dto.params.global_state.len());
        Ok(dto.params.global_state)
    }

    async fn account(&self, address: &str) -> Result<AccountInfo> {
        self.fetch(&format!("/v2/accounts/{address}")).await
    }

    async fn submit(&self, blobs: &[Vec<u8>]) -> Result<String> {
        let body: Vec<u8> = blobs.concat();
        let mut request = self
            .http
            .post(format!("{}/v2/transactions", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(body);
        if !self.token.is_empty() {
            request = request.header(AUTH_HEADER, &self.token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), body));
        }
        let dto: SubmitDto = response.json().await?;
        Ok(dto.tx_id)
    }

    async fn last_round(&self) -> Result<u64> {
        let dto: StatusDto = self.fetch("/v2/status").await?;
        Ok(dto.last_round)
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        let dto: StatusDto = self
            .fetch(&format!("/v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(dto.last_round)
    }

    async fn pending(&self, txid: &str) -> Result<PendingInfo> {
        self.fetch(&format!("/v2/transactions/pending/{txid}")).await
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
