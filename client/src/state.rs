//! Decodes the contract's flat global/local key-value state into the
//! domain model.
//!
//! Global project fields live under composite keys of the shape
//! `p_` + 8-byte big-endian id + `_suffix`. Decoding is two-pass: one
//! O(n) scan buckets every entry by decoded id, then ids `0..count` are
//! assembled from their field maps. Missing optional fields degrade to
//! documented defaults and are logged, never raised.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::address::Address;
use crate::model::{Contribution, Project, RewardStatus, NFT_REWARD_THRESHOLD};
use crate::rpc::{AccountInfo, KeyValue, TealValue, TEAL_BYTES};

/// Global counter of projects ever created.
pub const PROJECT_COUNT_KEY: &[u8] = b"project_count";

const PROJECT_PREFIX: &[u8] = b"p_";
const CONTRIB_PREFIX: &[u8] = b"contrib_";
const NFT_PREFIX: &[u8] = b"nft_";

const DEFAULT_CATEGORY: &str = "General";
const DEFAULT_DEADLINE_SECS: i64 = 30 * 86_400;

/// A state payload after branching on the node's type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StateValue {
    Bytes(Vec<u8>),
    Uint(u64),
}

impl StateValue {
    fn decode(value: &TealValue) -> Self {
        if value.kind == TEAL_BYTES {
            StateValue::Bytes(BASE64.decode(&value.bytes).unwrap_or_default())
        } else {
            StateValue::Uint(value.uint)
        }
    }

    fn as_uint(&self) -> Option<u64> {
        match self {
            StateValue::Uint(v) => Some(*v),
            StateValue::Bytes(_) => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            StateValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            StateValue::Uint(_) => None,
        }
    }
}

/// Decodes base64 keys, dropping entries whose key is not valid base64.
fn decode_entries(kvs: &[KeyValue]) -> Vec<(Vec<u8>, StateValue)> {
    kvs.iter()
        .filter_map(|kv| match BASE64.decode(&kv.key) {
            Ok(key) => Some((key, StateValue::decode(&kv.value))),
            Err(_) => {
                warn!("dropping state entry with undecodable key {:?}", kv.key);
                None
            }
        })
        .collect()
}

/// Splits a `p_` + itob(id) + `_suffix` key into its id and suffix.
fn parse_project_key(key: &[u8]) -> Option<(u64, String)> {
    let rest = key.strip_prefix(PROJECT_PREFIX)?;
    if rest.len() < 9 {
        return None;
    }
    let (id_bytes, suffix) = rest.split_at(8);
    let suffix = suffix.strip_prefix(b"_")?;
    let id = u64::from_be_bytes(id_bytes.try_into().ok()?);
    Some((id, String::from_utf8_lossy(suffix).into_owned()))
}

/// Local-state key ids appear both as 8 raw big-endian bytes and as an
/// ASCII decimal rendering, depending on the contract iteration.
fn parse_local_key(key: &[u8], prefix: &[u8]) -> Option<u64> {
    let rest = key.strip_prefix(prefix)?;
    if rest.len() == 8 {
        return Some(u64::from_be_bytes(rest.try_into().ok()?));
    }
    if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
        return None;
    }
    String::from_utf8_lossy(rest).parse().ok()
}

// ─────────────────────────────────────────────────────────
// Global state → projects
// ─────────────────────────────────────────────────────────

/// Reconstructs the project list from application global state.
///
/// Ids outside `0..project_count`, and ids missing their mandatory
/// name/target fields, are skipped rather than fabricated.
pub fn decode_projects(global: &[KeyValue], now: i64) -> Vec<Project> {
    let entries = decode_entries(global);

    let count = entries
        .iter()
        .find(|(key, _)| key == PROJECT_COUNT_KEY)
        .and_then(|(_, value)| value.as_uint())
        .unwrap_or(0);

    // Pass 1: bucket every project-shaped key by its decoded id.
    let mut index: HashMap<u64, HashMap<String, StateValue>> = HashMap::new();
    for (key, value) in entries {
        match parse_project_key(&key) {
            Some((id, suffix)) => {
                index.entry(id).or_default().insert(suffix, value);
            }
            None => {
                if key != PROJECT_COUNT_KEY {
                    debug!("ignoring unrecognized global-state key 0x{}", hex::encode(&key));
                }
            }
        }
    }

    // Pass 2: assemble the dense id range.
    let mut projects = Vec::new();
    for id in 0..count {
        let Some(fields) = index.get(&id) else {
            debug!("project {id} counted but has no state entries yet; skipping");
            continue;
        };
        if let Some(project) = assemble_project(id, fields, now) {
            projects.push(project);
        }
    }
    projects
}

fn assemble_project(id: u64, fields: &HashMap<String, StateValue>, now: i64) -> Option<Project> {
    let name = match fields.get("name").and_then(StateValue::as_text) {
        Some(n) if !n.is_empty() => n,
        _ => {
            debug!("project {id} has no name; treating as not yet materialized");
            return None;
        }
    };
    let target = match fields.get("target").and_then(StateValue::as_uint) {
        Some(t) => t,
        None => {
            debug!("project {id} has no target; treating as not yet materialized");
            return None;
        }
    };

    let description = fields
        .get("desc")
        .or_else(|| fields.get("description"))
        .and_then(StateValue::as_text)
        .unwrap_or_else(|| {
            debug!("project {id} missing description; defaulting to empty");
            String::new()
        });
    let category = fields
        .get("category")
        .and_then(StateValue::as_text)
        .unwrap_or_else(|| {
            debug!("project {id} missing category; defaulting to {DEFAULT_CATEGORY:?}");
            DEFAULT_CATEGORY.to_string()
        });
    let deadline = fields
        .get("deadline")
        .and_then(StateValue::as_uint)
        .map(|d| d as i64)
        .unwrap_or_else(|| {
            debug!("project {id} missing deadline; defaulting to 30 days out");
            now + DEFAULT_DEADLINE_SECS
        });
    let collected = fields
        .get("collected")
        .and_then(StateValue::as_uint)
        .unwrap_or(0);
    let threshold = fields
        .get("threshold")
        .and_then(StateValue::as_uint)
        .unwrap_or(0);
    let active = fields
        .get("active")
        .and_then(StateValue::as_uint)
        .map_or(true, |v| v != 0);
    let creator = decode_creator(id, fields.get("creator"));

    Some(Project {
        id,
        name,
        description,
        creator,
        target,
        deadline,
        collected,
        category,
        threshold,
        active,
    })
}

/// A creator stored as a 32-byte value is rendered as an address; any
/// other shape degrades to its lossy text form.
fn decode_creator(id: u64, value: Option<&StateValue>) -> String {
    match value {
        Some(StateValue::Bytes(raw)) if raw.len() == 32 => {
            let mut key = [0u8; 32];
            key.copy_from_slice(raw);
            Address(key).to_string()
        }
        Some(value) => value.as_text().unwrap_or_default(),
        None => {
            debug!("project {id} missing creator; defaulting to empty");
            String::new()
        }
    }
}

// ─────────────────────────────────────────────────────────
// Local state → contributions and rewards
// ─────────────────────────────────────────────────────────

/// The key-value pairs a user holds for one application, if opted in.
pub fn local_state(account: &AccountInfo, app_id: u64) -> &[KeyValue] {
    account
        .apps_local_state
        .iter()
        .find(|app| app.id == app_id)
        .map_or(&[], |app| app.key_value.as_slice())
}

pub fn is_opted_in(account: &AccountInfo, app_id: u64) -> bool {
    account.apps_local_state.iter().any(|app| app.id == app_id)
}

/// Cumulative contributions recorded under `contrib_<id>` keys.
pub fn decode_contributions(local: &[KeyValue]) -> Vec<Contribution> {
    let mut contributions: Vec<Contribution> = decode_entries(local)
        .into_iter()
        .filter_map(|(key, value)| {
            let project_id = parse_local_key(&key, CONTRIB_PREFIX)?;
            Some(Contribution { project_id, amount: value.as_uint()? })
        })
        .collect();
    contributions.sort_by_key(|c| c.project_id);
    contributions
}

/// Minted reward asset ids recorded under `nft_<id>` keys; zero means no
/// mint has happened.
pub fn decode_mints(local: &[KeyValue]) -> HashMap<u64, u64> {
    decode_entries(local)
        .into_iter()
        .filter_map(|(key, value)| {
            let project_id = parse_local_key(&key, NFT_PREFIX)?;
            Some((project_id, value.as_uint()?))
        })
        .collect()
}

/// A reward is earned once and only once: a recorded mint permanently
/// disqualifies the pair, regardless of contribution size.
pub fn is_eligible(contributed: u64, minted_asset: Option<u64>) -> bool {
    contributed >= NFT_REWARD_THRESHOLD && minted_asset.is_none()
}

/// Joins decoded projects with a user's local state into the reward
/// gallery view.
///
/// When no projects are recoverable from global state (a key-layout
/// mismatch, say), falls back to a local-only scan so the gallery still
/// approximates eligibility. That path is best-effort and logged as
/// degraded.
pub fn reward_statuses(projects: &[Project], local: &[KeyValue]) -> Vec<RewardStatus> {
    let contributions = decode_contributions(local);
    let mints = decode_mints(local);

    if projects.is_empty() && !contributions.is_empty() {
        warn!(
            "no projects decoded from global state; deriving {} reward entries from local state only",
            contributions.len()
        );
        return contributions
            .iter()
            .map(|c| status(c, format!("Project {}", c.project_id), &mints))
            .collect();
    }

    projects
        .iter()
        .filter_map(|project| {
            let contribution = contributions.iter().find(|c| c.project_id == project.id)?;
            Some(status(contribution, project.name.clone(), &mints))
        })
        .collect()
}

fn status(
    contribution: &Contribution,
    project_name: String,
    mints: &HashMap<u64, u64>,
) -> RewardStatus {
    let minted_asset = mints.get(&contribution.project_id).copied().filter(|&a| a != 0);
    RewardStatus {
        project_id: contribution.project_id,
        project_name,
        contributed: contribution.amount,
        minted_asset,
        eligible: is_eligible(contribution.amount, minted_asset),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
