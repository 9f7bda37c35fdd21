//! Unsigned-transaction construction for every contract action.
//!
//! The argument order and encoding here are a fixed external protocol:
//! the action tag leads, strings are raw UTF-8 and integers are 8-byte
//! big-endian. Any drift silently breaks the call on chain.

use crate::address::Address;
use crate::errors::{ClientError, Result};
use crate::model::{Action, ProjectDraft};
use crate::txn::{assign_group_id, OnComplete, SuggestedParams, Transaction};

fn itob(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Checksum-validates the sender up front. A malformed sender otherwise
/// surfaces much later as an opaque wallet rejection.
fn parse_sender(sender: &str) -> Result<Address> {
    Address::parse(sender).map_err(|e| match e {
        ClientError::InvalidAddress(msg) => {
            ClientError::InvalidAddress(format!("sender: {msg}"))
        }
        other => other,
    })
}

/// Checksum-validates a sender without building anything, so callers can
/// fail before any network round-trip.
pub fn validate_sender(sender: &str) -> Result<()> {
    parse_sender(sender).map(|_| ())
}

/// Validates a project draft without touching the network, so callers can
/// reject bad input before fetching params.
pub fn validate_create(sender: &str, draft: &ProjectDraft, now: i64) -> Result<()> {
    parse_sender(sender)?;
    if draft.name.trim().is_empty() {
        return Err(ClientError::InvalidArgument("project name is empty".to_string()));
    }
    if draft.description.trim().is_empty() {
        return Err(ClientError::InvalidArgument(
            "project description is empty".to_string(),
        ));
    }
    if draft.category.trim().is_empty() {
        return Err(ClientError::InvalidArgument("project category is empty".to_string()));
    }
    if draft.target == 0 {
        return Err(ClientError::InvalidArgument(
            "target amount must be positive".to_string(),
        ));
    }
    if draft.deadline <= now {
        return Err(ClientError::InvalidArgument(
            "deadline must be in the future".to_string(),
        ));
    }
    Ok(())
}

/// Application call registering a new project.
///
/// The deployed contract accepts exactly six arguments; a reward
/// threshold is not one of them.
pub fn build_create(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    draft: &ProjectDraft,
    now: i64,
) -> Result<Transaction> {
    validate_create(sender, draft, now)?;
    let sender = parse_sender(sender)?;
    let args = vec![
        Action::Create.tag().to_vec(),
        draft.name.as_bytes().to_vec(),
        draft.description.as_bytes().to_vec(),
        itob(draft.target),
        itob(draft.deadline as u64),
        draft.category.as_bytes().to_vec(),
    ];
    Ok(Transaction::app_call(params, sender, app_id, OnComplete::NoOp, args))
}

/// Atomic two-transaction group funding a project: a payment to the
/// app's escrow account, then the `contribute` call. The shared group id
/// makes the ledger commit both or neither.
pub fn build_contribute(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    project_id: u64,
    amount: u64,
) -> Result<Vec<Transaction>> {
    let sender = parse_sender(sender)?;
    if amount == 0 {
        return Err(ClientError::InvalidArgument(
            "contribution amount must be positive".to_string(),
        ));
    }
    let payment = Transaction::payment(params, sender, Address::escrow(app_id), amount);
    let call = Transaction::app_call(
        params,
        sender,
        app_id,
        OnComplete::NoOp,
        vec![Action::Contribute.tag().to_vec(), itob(project_id)],
    );
    let mut group = vec![payment, call];
    assign_group_id(&mut group)?;
    Ok(group)
}

/// Opt-in call allocating the sender's local storage for the app.
pub fn build_opt_in(params: &SuggestedParams, sender: &str, app_id: u64) -> Result<Transaction> {
    let sender = parse_sender(sender)?;
    Ok(Transaction::app_call(params, sender, app_id, OnComplete::OptIn, vec![]))
}

fn project_call(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    action: Action,
    project_id: u64,
) -> Result<Transaction> {
    let sender = parse_sender(sender)?;
    Ok(Transaction::app_call(
        params,
        sender,
        app_id,
        OnComplete::NoOp,
        vec![action.tag().to_vec(), itob(project_id)],
    ))
}

pub fn build_withdraw(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    project_id: u64,
) -> Result<Transaction> {
    project_call(params, sender, app_id, Action::Withdraw, project_id)
}

pub fn build_refund(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    project_id: u64,
) -> Result<Transaction> {
    project_call(params, sender, app_id, Action::Refund, project_id)
}

pub fn build_mint_reward(
    params: &SuggestedParams,
    sender: &str,
    app_id: u64,
    project_id: u64,
) -> Result<Transaction> {
    project_call(params, sender, app_id, Action::MintNft, project_id)
}
