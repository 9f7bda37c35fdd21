//! End-to-end action pipelines: validate → ensure-opt-in → build → sign
//! → submit → confirm, with per-stage progress reporting.
//!
//! Each pipeline runs as one sequential async chain; a failure at any
//! stage surfaces as a single consolidated error rather than a partial
//! state. Opt-in is self-healing: an action that needs local state first
//! checks the account and issues the opt-in itself when it is missing,
//! and a ledger rejection saying the account is already opted in counts
//! as success.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::builder;
use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::model::{Action, Project, ProjectDraft, RewardStatus};
use crate::rpc::{AccountInfo, Ledger};
use crate::state;
use crate::submit;
use crate::txn::{SuggestedParams, Transaction};
use crate::wallet::{sign_transactions, WalletProvider, WalletSession};

/// Pipeline phase, reported to the caller for incremental progress text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    CheckingOptIn,
    OptingIn,
    Building,
    Signing,
    Submitting,
    Confirming,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Validating => "Validating input",
            Stage::CheckingOptIn => "Checking opt-in status",
            Stage::OptingIn => "Opting in to the app",
            Stage::Building => "Building transaction",
            Stage::Signing => "Awaiting wallet signature",
            Stage::Submitting => "Submitting to the network",
            Stage::Confirming => "Waiting for confirmation",
        }
    }
}

/// Progress sink invoked at each stage boundary.
pub type Progress<'a> = dyn FnMut(Stage) + 'a;

/// One user action's worth of collaborators: the node, the wallet and
/// its session, and the app configuration. Holding `&mut` on the
/// provider serializes signing attempts per session.
pub struct Pipeline<'a, L: Ledger, P: WalletProvider> {
    pub ledger: &'a L,
    pub provider: &'a mut P,
    pub session: &'a mut WalletSession,
    pub config: &'a Config,
}

impl<'a, L: Ledger, P: WalletProvider> Pipeline<'a, L, P> {
    /// Registers a new project on chain and returns the transaction id.
    pub async fn create_project(
        &mut self,
        sender: &str,
        draft: &ProjectDraft,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        progress(Stage::Validating);
        let now = Utc::now().timestamp();
        builder::validate_create(sender, draft, now)?;

        progress(Stage::Building);
        let params = self.ledger.suggested_params().await?;
        let txn = builder::build_create(&params, sender, self.config.app_id, draft, now)?;

        let txid = self.sign_and_submit(std::slice::from_ref(&txn), progress).await?;
        info!("project {:?} created in {txid}", draft.name);
        Ok(txid)
    }

    /// Funds a project with an atomic payment + app-call group.
    ///
    /// Pre-flight: the sender must cover the amount plus both fees, and
    /// must be opted in (healed automatically when stale).
    pub async fn contribute(
        &mut self,
        sender: &str,
        project_id: u64,
        amount: u64,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        progress(Stage::Validating);
        builder::validate_sender(sender)?;
        if amount == 0 {
            return Err(ClientError::InvalidArgument(
                "contribution amount must be positive".to_string(),
            ));
        }

        let params = self.ledger.suggested_params().await?;
        let account = self.ledger.account(sender).await?;
        // Two fees for the group, plus a third when the opt-in self-heal
        // will have to be sent first.
        let fee_count: u64 = if state::is_opted_in(&account, self.config.app_id) { 2 } else { 3 };
        let need = params
            .flat_fee()
            .checked_mul(fee_count)
            .and_then(|fees| amount.checked_add(fees))
            .ok_or_else(|| {
                ClientError::InvalidArgument("contribution amount is out of range".to_string())
            })?;
        if account.amount < need {
            return Err(ClientError::InsufficientBalance { have: account.amount, need });
        }

        self.ensure_opted_in(sender, &params, &account, progress).await?;

        progress(Stage::Building);
        let group =
            builder::build_contribute(&params, sender, self.config.app_id, project_id, amount)?;

        let txid = self.sign_and_submit(&group, progress).await?;
        info!("contributed {amount} base units to project {project_id} in {txid}");
        Ok(txid)
    }

    /// Explicit opt-in. Returns `None` when the account was already
    /// opted in and nothing had to be sent.
    pub async fn opt_in(
        &mut self,
        sender: &str,
        progress: &mut Progress<'_>,
    ) -> Result<Option<String>> {
        builder::validate_sender(sender)?;
        progress(Stage::CheckingOptIn);
        let account = self.ledger.account(sender).await?;
        if state::is_opted_in(&account, self.config.app_id) {
            debug!("{sender} is already opted in to app {}", self.config.app_id);
            return Ok(None);
        }

        progress(Stage::OptingIn);
        let params = self.ledger.suggested_params().await?;
        self.submit_opt_in(&params, sender).await
    }

    pub async fn withdraw(
        &mut self,
        sender: &str,
        project_id: u64,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        self.project_action(sender, Action::Withdraw, project_id, progress).await
    }

    pub async fn refund(
        &mut self,
        sender: &str,
        project_id: u64,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        self.project_action(sender, Action::Refund, project_id, progress).await
    }

    pub async fn mint_reward(
        &mut self,
        sender: &str,
        project_id: u64,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        self.project_action(sender, Action::MintNft, project_id, progress).await
    }

    async fn project_action(
        &mut self,
        sender: &str,
        action: Action,
        project_id: u64,
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        progress(Stage::Validating);
        builder::validate_sender(sender)?;
        let params = self.ledger.suggested_params().await?;
        let account = self.ledger.account(sender).await?;
        self.ensure_opted_in(sender, &params, &account, progress).await?;

        progress(Stage::Building);
        let app_id = self.config.app_id;
        let txn = match action {
            Action::Withdraw => builder::build_withdraw(&params, sender, app_id, project_id)?,
            Action::Refund => builder::build_refund(&params, sender, app_id, project_id)?,
            Action::MintNft => builder::build_mint_reward(&params, sender, app_id, project_id)?,
            Action::Create | Action::Contribute => {
                return Err(ClientError::InvalidArgument(format!(
                    "{} is not a bare project action",
                    action.as_str()
                )))
            }
        };

        let txid = self.sign_and_submit(std::slice::from_ref(&txn), progress).await?;
        info!("{} for project {project_id} confirmed in {txid}", action.as_str());
        Ok(txid)
    }

    /// Issues an opt-in when the fetched account state lacks one.
    async fn ensure_opted_in(
        &mut self,
        sender: &str,
        params: &SuggestedParams,
        account: &AccountInfo,
        progress: &mut Progress<'_>,
    ) -> Result<()> {
        progress(Stage::CheckingOptIn);
        if state::is_opted_in(account, self.config.app_id) {
            return Ok(());
        }
        warn!("{sender} is not opted in to app {}; opting in first", self.config.app_id);
        progress(Stage::OptingIn);
        self.submit_opt_in(params, sender).await?;
        Ok(())
    }

    async fn submit_opt_in(
        &mut self,
        params: &SuggestedParams,
        sender: &str,
    ) -> Result<Option<String>> {
        let txn = builder::build_opt_in(params, sender, self.config.app_id)?;
        let blobs = sign_transactions(self.provider, self.session, std::slice::from_ref(&txn))
            .await?;
        match submit::submit_and_confirm(self.ledger, &blobs, self.config.max_wait_rounds).await {
            Ok(txid) => {
                info!("opted in to app {} in {txid}", self.config.app_id);
                Ok(Some(txid))
            }
            // Stale account cache: the chain already holds the opt-in.
            Err(e) if is_already_opted_in(&e) => {
                debug!("ledger reports an existing opt-in; continuing");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_and_submit(
        &mut self,
        txns: &[Transaction],
        progress: &mut Progress<'_>,
    ) -> Result<String> {
        progress(Stage::Signing);
        let blobs = sign_transactions(self.provider, self.session, txns).await?;
        progress(Stage::Submitting);
        let txid = submit::broadcast(self.ledger, &blobs).await?;
        progress(Stage::Confirming);
        submit::wait_for_confirmation(self.ledger, &txid, self.config.max_wait_rounds).await?;
        Ok(txid)
    }
}

fn is_already_opted_in(err: &ClientError) -> bool {
    let message = match err {
        ClientError::Api { message, .. } => message,
        ClientError::PoolRejected(message) => message,
        _ => return false,
    };
    message.to_ascii_lowercase().contains("already opted in")
}

// ─────────────────────────────────────────────────────────
// View refresh (no wallet involved)
// ─────────────────────────────────────────────────────────

/// Fetches and decodes the full project list.
pub async fn load_projects<L: Ledger>(ledger: &L, app_id: u64) -> Result<Vec<Project>> {
    let global = ledger.global_state(app_id).await?;
    Ok(state::decode_projects(&global, Utc::now().timestamp()))
}

/// Fetches the reward-gallery view for one account.
pub async fn load_rewards<L: Ledger>(
    ledger: &L,
    app_id: u64,
    address: &str,
) -> Result<Vec<RewardStatus>> {
    let projects = load_projects(ledger, app_id).await?;
    let account = ledger.account(address).await?;
    Ok(state::reward_statuses(&projects, state::local_state(&account, app_id)))
}
