//! Domain types decoded from chain state or fed to the transaction
//! builder.

use serde::Serialize;

use crate::amount;

/// Contribution size, in base units, that earns a supporter NFT.
pub const NFT_REWARD_THRESHOLD: u64 = 10_000_000;

/// Contract actions dispatched through the first application argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Contribute,
    Withdraw,
    Refund,
    MintNft,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Contribute => "contribute",
            Action::Withdraw => "withdraw",
            Action::Refund => "refund",
            Action::MintNft => "mint_nft",
        }
    }

    /// The action tag as it appears in the first application argument.
    pub fn tag(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// A crowdfunding project assembled from global state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: String,
    /// Rendered creator address; empty when the contract never stored one.
    pub creator: String,
    pub target: u64,
    pub deadline: i64,
    pub collected: u64,
    pub category: String,
    /// Per-project reward threshold; 0 when the deployed contract stores
    /// none, in which case [`NFT_REWARD_THRESHOLD`] applies.
    pub threshold: u64,
    pub active: bool,
}

impl Project {
    pub fn progress_percentage(&self) -> f64 {
        amount::progress_percentage(self.collected, self.target)
    }

    pub fn is_funded(&self) -> bool {
        self.target > 0 && self.collected >= self.target
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.deadline
    }

    /// Creators may withdraw once the target is met and the deadline passed.
    pub fn can_withdraw(&self, now: i64) -> bool {
        self.is_funded() && self.is_expired(now)
    }

    /// Contributors may reclaim funds from an expired project that missed
    /// its target.
    pub fn can_refund(&self, now: i64) -> bool {
        !self.is_funded() && self.is_expired(now)
    }
}

/// Input for creating a new project on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub target: u64,
    pub deadline: i64,
    pub category: String,
}

/// One account's recorded contribution to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub project_id: u64,
    pub amount: u64,
}

/// Per-project supporter standing, as shown in the reward gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardStatus {
    pub project_id: u64,
    pub project_name: String,
    pub contributed: u64,
    /// Asset id of the minted supporter NFT, if one exists.
    pub minted_asset: Option<u64>,
    pub eligible: bool,
}
