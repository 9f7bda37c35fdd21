//! Cross-module pipeline tests: a scripted wallet and an in-memory
//! ledger exercising the full validate → opt-in → build → sign → submit
//! → confirm chains.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::address::Address;
use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::flows::{self, Pipeline, Stage};
use crate::model::ProjectDraft;
use crate::rpc::{AccountInfo, AppLocalState, KeyValue, Ledger, PendingInfo, TealValue};
use crate::state::PROJECT_COUNT_KEY;
use crate::txn::SuggestedParams;
use crate::wallet::{
    SignedReply, SigningPayload, SigningRequest, SigningState, WalletProvider, WalletSession,
};

const APP_ID: u64 = 746_106_150;

fn sender() -> String {
    Address([7u8; 32]).to_string()
}

fn config() -> Config {
    Config { app_id: APP_ID, max_wait_rounds: 3, ..Config::default() }
}

fn params() -> SuggestedParams {
    SuggestedParams {
        fee: 0,
        min_fee: 1_000,
        first_valid: 41_000_000,
        last_valid: 41_001_000,
        genesis_id: "testnet-v1.0".to_string(),
        genesis_hash: [3u8; 32],
    }
}

fn kv_uint(key: &[u8], uint: u64) -> KeyValue {
    KeyValue {
        key: BASE64.encode(key),
        value: TealValue { kind: 2, bytes: String::new(), uint },
    }
}

fn kv_bytes(key: &[u8], bytes: &[u8]) -> KeyValue {
    KeyValue {
        key: BASE64.encode(key),
        value: TealValue { kind: 1, bytes: BASE64.encode(bytes), uint: 0 },
    }
}

fn project_key(id: u64, suffix: &str) -> Vec<u8> {
    let mut key = b"p_".to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(b"_");
    key.extend_from_slice(suffix.as_bytes());
    key
}

fn account(amount: u64, opted_in: bool, local: Vec<KeyValue>) -> AccountInfo {
    let apps_local_state = if opted_in {
        vec![AppLocalState { id: APP_ID, key_value: local }]
    } else {
        Vec::new()
    };
    AccountInfo { address: sender(), amount, apps_local_state }
}

// ─────────────────────────────────────────────────────────
// In-memory collaborators
// ─────────────────────────────────────────────────────────

struct MockLedger {
    params: SuggestedParams,
    global: Vec<KeyValue>,
    account: AccountInfo,
    /// Groups handed to `submit`, in order.
    submissions: Mutex<Vec<Vec<Vec<u8>>>>,
    /// Popped once per `submit` call before the submission is accepted.
    submit_failures: Mutex<Vec<(u16, String)>>,
    /// `u64::MAX` keeps every transaction pending forever.
    confirm_after_polls: u64,
    polls: Mutex<u64>,
}

impl MockLedger {
    fn new(account: AccountInfo) -> Self {
        MockLedger {
            params: params(),
            global: Vec::new(),
            account,
            submissions: Mutex::new(Vec::new()),
            submit_failures: Mutex::new(Vec::new()),
            confirm_after_polls: 0,
            polls: Mutex::new(0),
        }
    }

    fn submissions(&self) -> Vec<Vec<Vec<u8>>> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Ledger for MockLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        Ok(self.params.clone())
    }

    async fn global_state(&self, _app_id: u64) -> Result<Vec<KeyValue>> {
        Ok(self.global.clone())
    }

    async fn account(&self, _address: &str) -> Result<AccountInfo> {
        Ok(self.account.clone())
    }

    async fn submit(&self, blobs: &[Vec<u8>]) -> Result<String> {
        if let Some((status, message)) = self.submit_failures.lock().unwrap().pop() {
            return Err(ClientError::Api { status, message });
        }
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(blobs.to_vec());
        Ok(format!("TX{}", submissions.len()))
    }

    async fn last_round(&self) -> Result<u64> {
        Ok(100)
    }

    async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
        Ok(round + 1)
    }

    async fn pending(&self, _txid: &str) -> Result<PendingInfo> {
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        if self.confirm_after_polls != u64::MAX && *polls > self.confirm_after_polls {
            Ok(PendingInfo { confirmed_round: 105, pool_error: String::new() })
        } else {
            Ok(PendingInfo::default())
        }
    }
}

struct MockWallet {
    reject_base64: bool,
    cancel: bool,
    attempts: Vec<&'static str>,
}

impl MockWallet {
    fn accepting() -> Self {
        MockWallet { reject_base64: false, cancel: false, attempts: Vec::new() }
    }

    fn structured_only() -> Self {
        MockWallet { reject_base64: true, cancel: false, attempts: Vec::new() }
    }

    fn cancelling() -> Self {
        MockWallet { reject_base64: false, cancel: true, attempts: Vec::new() }
    }
}

impl WalletProvider for MockWallet {
    async fn reconnect(&mut self) -> Result<Vec<String>> {
        Ok(vec![sender()])
    }

    async fn connect(&mut self) -> Result<Vec<String>> {
        Ok(vec![sender()])
    }

    async fn sign(&mut self, request: &SigningRequest) -> Result<SignedReply> {
        if self.cancel {
            return Err(ClientError::UserCancelled);
        }
        match &request.payload {
            SigningPayload::Base64(items) => {
                self.attempts.push("base64");
                if self.reject_base64 {
                    return Err(ClientError::WalletFormatMismatch(
                        "unsupported payload".to_string(),
                    ));
                }
                // Nested on purpose: the coordinator must flatten this.
                Ok(SignedReply::List(
                    items
                        .iter()
                        .map(|b64| {
                            SignedReply::List(vec![SignedReply::Blob(
                                BASE64.decode(b64).unwrap(),
                            )])
                        })
                        .collect(),
                ))
            }
            SigningPayload::Structured(wrappers) => {
                self.attempts.push("structured");
                let mut blobs = Vec::new();
                for wrapper in wrappers {
                    blobs.push(SignedReply::Blob(wrapper.txn.encode().unwrap()));
                }
                Ok(SignedReply::List(blobs))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

fn draft() -> ProjectDraft {
    ProjectDraft {
        name: "Solar".to_string(),
        description: "Panels for schools".to_string(),
        target: 5_000_000_000,
        deadline: i64::MAX - 1,
        category: "Environment".to_string(),
    }
}

// ─────────────────────────────────────────────────────────
// Pipelines
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn contribute_self_heals_a_missing_opt_in() -> anyhow::Result<()> {
    let ledger = MockLedger::new(account(1_000_000_000, false, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut stages = Vec::new();
    let mut progress = |stage: Stage| stages.push(stage);
    let txid = pipeline.contribute(&sender(), 4, 25_000_000, &mut progress).await?;

    assert_eq!(txid, "TX2");
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 2, "opt-in first, then the contribution group");
    assert_eq!(submissions[0].len(), 1);
    assert_eq!(submissions[1].len(), 2);
    assert_eq!(
        stages,
        [
            Stage::Validating,
            Stage::CheckingOptIn,
            Stage::OptingIn,
            Stage::Building,
            Stage::Signing,
            Stage::Submitting,
            Stage::Confirming,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn contribute_skips_opt_in_when_already_present() {
    let ledger = MockLedger::new(account(1_000_000_000, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut stages = Vec::new();
    let mut progress = |stage: Stage| stages.push(stage);
    pipeline.contribute(&sender(), 0, 10_000_000, &mut progress).await.unwrap();

    assert_eq!(ledger.submissions().len(), 1);
    assert!(!stages.contains(&Stage::OptingIn));
}

#[tokio::test]
async fn contribute_rejects_insufficient_balance_before_signing() {
    // 5 base units short of amount + two fees
    let ledger = MockLedger::new(account(10_001_995, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let err = pipeline.contribute(&sender(), 0, 10_000_000, &mut progress).await.unwrap_err();

    match err {
        ClientError::InsufficientBalance { have, need } => {
            assert_eq!(have, 10_001_995);
            assert_eq!(need, 10_002_000);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ledger.submissions().is_empty());
    assert!(wallet.attempts.is_empty(), "the wallet must never be prompted");
}

#[tokio::test]
async fn contribute_rejects_out_of_range_amounts_without_panicking() {
    let ledger = MockLedger::new(account(u64::MAX, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let err = pipeline.contribute(&sender(), 0, u64::MAX, &mut progress).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(ledger.submissions().is_empty());
    assert!(wallet.attempts.is_empty());
}

#[tokio::test]
async fn preflight_budgets_the_opt_in_fee_for_a_stale_account() {
    // Covers amount + two group fees exactly, but the self-heal opt-in
    // costs a third fee; spending it would strand the account mid-flow.
    let ledger = MockLedger::new(account(10_002_000, false, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let err = pipeline.contribute(&sender(), 0, 10_000_000, &mut progress).await.unwrap_err();

    match err {
        ClientError::InsufficientBalance { have, need } => {
            assert_eq!(have, 10_002_000);
            assert_eq!(need, 10_003_000);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ledger.submissions().is_empty(), "the opt-in fee must not be spent");
}

#[tokio::test]
async fn preflight_needs_only_group_fees_when_already_opted_in() {
    let ledger = MockLedger::new(account(10_002_000, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    pipeline.contribute(&sender(), 0, 10_000_000, &mut progress).await.unwrap();

    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 2);
}

#[tokio::test]
async fn explicit_opt_in_submits_once_and_reports_the_txid() {
    let ledger = MockLedger::new(account(1_000_000, false, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut stages = Vec::new();
    let mut progress = |stage: Stage| stages.push(stage);
    let txid = pipeline.opt_in(&sender(), &mut progress).await.unwrap();

    assert_eq!(txid, Some("TX1".to_string()));
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].len(), 1);
    assert_eq!(stages, [Stage::CheckingOptIn, Stage::OptingIn]);
}

#[tokio::test]
async fn explicit_opt_in_short_circuits_when_already_present() {
    let ledger = MockLedger::new(account(1_000_000, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut stages = Vec::new();
    let mut progress = |stage: Stage| stages.push(stage);
    let txid = pipeline.opt_in(&sender(), &mut progress).await.unwrap();

    assert_eq!(txid, None);
    assert!(ledger.submissions().is_empty());
    assert!(wallet.attempts.is_empty());
    assert_eq!(stages, [Stage::CheckingOptIn]);
}

#[tokio::test]
async fn opt_in_rejection_for_an_existing_opt_in_counts_as_success() {
    let ledger = MockLedger::new(account(1_000_000_000, false, Vec::new()));
    ledger.submit_failures.lock().unwrap().push((
        400,
        format!("TransactionPool.Remember: account {} has already opted in to app {APP_ID}", sender()),
    ));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let txid = pipeline.contribute(&sender(), 4, 25_000_000, &mut progress).await.unwrap();

    assert_eq!(txid, "TX1");
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1, "only the contribution group lands");
    assert_eq!(submissions[0].len(), 2);
}

#[tokio::test]
async fn create_project_signs_through_the_structured_fallback() -> anyhow::Result<()> {
    let ledger = MockLedger::new(account(1_000_000_000, true, Vec::new()));
    let mut wallet = MockWallet::structured_only();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let txid = pipeline.create_project(&sender(), &draft(), &mut progress).await?;

    assert_eq!(txid, "TX1");
    assert_eq!(wallet.attempts, ["base64", "structured"]);
    assert_eq!(session.state(), SigningState::Signed);
    Ok(())
}

#[tokio::test]
async fn create_project_validates_before_any_network_call() {
    let ledger = MockLedger::new(account(1, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut bad = draft();
    bad.name = String::new();
    let mut progress = |_: Stage| {};
    let err = pipeline.create_project(&sender(), &bad, &mut progress).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(ledger.submissions().is_empty());
    assert!(wallet.attempts.is_empty());
}

#[tokio::test]
async fn cancellation_surfaces_as_user_cancelled_with_nothing_submitted() {
    let ledger = MockLedger::new(account(1_000_000_000, true, Vec::new()));
    let mut wallet = MockWallet::cancelling();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let err = pipeline.contribute(&sender(), 4, 25_000_000, &mut progress).await.unwrap_err();

    assert!(matches!(err, ClientError::UserCancelled));
    assert!(ledger.submissions().is_empty());
    assert_eq!(session.state(), SigningState::Rejected);
}

#[tokio::test]
async fn confirmation_timeout_is_bounded_by_config() {
    let mut ledger = MockLedger::new(account(1_000_000_000, true, Vec::new()));
    ledger.confirm_after_polls = u64::MAX;
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    let err = pipeline.create_project(&sender(), &draft(), &mut progress).await.unwrap_err();

    assert!(matches!(err, ClientError::ConfirmationTimeout { rounds: 3 }));
}

#[tokio::test]
async fn withdraw_refund_and_mint_submit_single_calls() {
    let ledger = MockLedger::new(account(1_000_000_000, true, Vec::new()));
    let mut wallet = MockWallet::accepting();
    let mut session = WalletSession::new();
    let config = config();
    let mut pipeline =
        Pipeline { ledger: &ledger, provider: &mut wallet, session: &mut session, config: &config };

    let mut progress = |_: Stage| {};
    pipeline.withdraw(&sender(), 1, &mut progress).await.unwrap();
    pipeline.refund(&sender(), 1, &mut progress).await.unwrap();
    pipeline.mint_reward(&sender(), 1, &mut progress).await.unwrap();

    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 3);
    assert!(submissions.iter().all(|group| group.len() == 1));
}

// ─────────────────────────────────────────────────────────
// View refresh
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn load_projects_decodes_the_half_funded_snapshot() {
    let mut ledger = MockLedger::new(account(0, false, Vec::new()));
    ledger.global = vec![
        kv_uint(PROJECT_COUNT_KEY, 1),
        kv_bytes(&project_key(0, "name"), b"Solar"),
        kv_uint(&project_key(0, "target"), 5_000_000_000),
        kv_uint(&project_key(0, "collected"), 2_500_000_000),
    ];

    let projects = flows::load_projects(&ledger, APP_ID).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "Solar");
    assert_eq!(projects[0].progress_percentage(), 50.0);
}

#[tokio::test]
async fn load_rewards_joins_global_and_local_state() {
    let local = vec![
        kv_uint(b"contrib_7", 50_000_000),
        kv_uint(b"nft_7", 55_512_345),
        kv_uint(b"contrib_0", 10_000_000),
    ];
    let mut ledger = MockLedger::new(account(0, true, local));
    ledger.global = vec![
        kv_uint(PROJECT_COUNT_KEY, 8),
        kv_bytes(&project_key(0, "name"), b"Solar"),
        kv_uint(&project_key(0, "target"), 1),
        kv_bytes(&project_key(7, "name"), b"Reef"),
        kv_uint(&project_key(7, "target"), 1),
    ];

    let rewards = flows::load_rewards(&ledger, APP_ID, &sender()).await.unwrap();
    assert_eq!(rewards.len(), 2);

    let solar = rewards.iter().find(|r| r.project_id == 0).unwrap();
    assert!(solar.eligible, "threshold met and nothing minted");
    assert_eq!(solar.minted_asset, None);

    let reef = rewards.iter().find(|r| r.project_id == 7).unwrap();
    assert!(!reef.eligible, "a recorded mint disqualifies the pair");
    assert_eq!(reef.minted_asset, Some(55_512_345));
}
