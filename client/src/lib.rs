//! Rise crowdfunding client — the protocol layer between a UI and the
//! chain.
//!
//! Builds unsigned transactions/groups for the deployed contract's
//! actions, decodes its global/local key-value state into projects,
//! contributions and NFT-reward eligibility, drives an external wallet
//! through the reconnect → sign → normalize protocol, and broadcasts
//! with bounded confirmation polling.

pub mod address;
pub mod amount;
pub mod builder;
pub mod config;
pub mod errors;
pub mod flows;
pub mod model;
pub mod rpc;
pub mod state;
pub mod submit;
pub mod txn;
pub mod wallet;

#[cfg(test)]
mod test_flows;

pub use address::Address;
pub use config::Config;
pub use errors::{ClientError, Result};
pub use flows::{Pipeline, Stage};
pub use model::{Action, Contribution, Project, ProjectDraft, RewardStatus};
pub use rpc::{AlgodClient, Ledger};
pub use txn::{SuggestedParams, Transaction};
pub use wallet::{SignedReply, SigningState, WalletProvider, WalletSession};
