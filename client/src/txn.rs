//! Wire-format transaction types and the canonical encoding the ledger
//! verifies: a msgpack map with alphabetically ordered short keys, where
//! zero or empty fields are omitted entirely.

use rmp::encode::{write_array_len, write_bin, write_map_len, write_str, write_uint};
use sha2::{Digest, Sha512_256};

use crate::address::{base32_encode, Address};
use crate::errors::{ClientError, Result};

/// Flat fee charged per transaction when the network is idle.
pub const MIN_TXN_FEE: u64 = 1_000;

/// Validity window, in rounds, granted to a freshly built transaction.
pub const VALIDITY_WINDOW: u64 = 1_000;

/// The ledger rejects groups larger than this.
pub const MAX_GROUP_SIZE: usize = 16;

/// Domain separator hashed into a transaction id.
const TXID_PREFIX: &[u8] = b"TX";

/// Domain separator hashed into a group id.
const GROUP_PREFIX: &[u8] = b"TG";

/// Network parameters stamped into every transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedParams {
    pub fee: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

impl SuggestedParams {
    /// Flat per-transaction fee, never below the network minimum.
    pub fn flat_fee(&self) -> u64 {
        self.fee.max(self.min_fee)
    }
}

/// On-completion effect requested by an application call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnComplete {
    NoOp = 0,
    OptIn = 1,
}

/// Type-specific transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnPayload {
    Payment {
        receiver: Address,
        amount: u64,
    },
    AppCall {
        app_id: u64,
        on_complete: OnComplete,
        args: Vec<Vec<u8>>,
    },
}

/// An unsigned transaction ready for wallet signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Address,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub group: Option<[u8; 32]>,
    pub note: Vec<u8>,
    pub payload: TxnPayload,
}

impl Transaction {
    pub fn payment(
        params: &SuggestedParams,
        sender: Address,
        receiver: Address,
        amount: u64,
    ) -> Self {
        Self::from_parts(params, sender, TxnPayload::Payment { receiver, amount })
    }

    pub fn app_call(
        params: &SuggestedParams,
        sender: Address,
        app_id: u64,
        on_complete: OnComplete,
        args: Vec<Vec<u8>>,
    ) -> Self {
        Self::from_parts(
            params,
            sender,
            TxnPayload::AppCall { app_id, on_complete, args },
        )
    }

    fn from_parts(params: &SuggestedParams, sender: Address, payload: TxnPayload) -> Self {
        Transaction {
            sender,
            fee: params.flat_fee(),
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            group: None,
            note: Vec::new(),
            payload,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self.payload {
            TxnPayload::Payment { .. } => "pay",
            TxnPayload::AppCall { .. } => "appl",
        }
    }

    /// Canonical encoding the ledger hashes and the wallet signs.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut map = CanonicalMap::default();
        match &self.payload {
            TxnPayload::Payment { receiver, amount } => {
                map.put_uint("amt", *amount)?;
                map.put_bytes("rcv", receiver.as_bytes())?;
            }
            TxnPayload::AppCall { app_id, on_complete, args } => {
                map.put_bin_list("apaa", args)?;
                map.put_uint("apan", *on_complete as u64)?;
                map.put_uint("apid", *app_id)?;
            }
        }
        map.put_uint("fee", self.fee)?;
        map.put_uint("fv", self.first_valid)?;
        map.put_str("gen", &self.genesis_id)?;
        map.put_bytes("gh", &self.genesis_hash)?;
        if let Some(group) = &self.group {
            map.put_bytes("grp", group)?;
        }
        map.put_uint("lv", self.last_valid)?;
        map.put_bytes("note", &self.note)?;
        map.put_bytes("snd", self.sender.as_bytes())?;
        map.put_str("type", self.type_tag())?;
        map.into_bytes()
    }

    /// Raw 32-byte transaction hash, computed over the current encoding.
    /// Group ids derive from this hash before any group is stamped.
    pub fn raw_id(&self) -> Result<[u8; 32]> {
        let mut hasher = Sha512_256::new();
        hasher.update(TXID_PREFIX);
        hasher.update(self.encode()?);
        let digest = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        Ok(id)
    }

    /// Transaction id as rendered by explorers: unpadded base32.
    pub fn id(&self) -> Result<String> {
        Ok(base32_encode(&self.raw_id()?))
    }
}

/// Stamps a shared group id onto a set of transactions. The ledger then
/// accepts them only together and in this order.
pub fn assign_group_id(txns: &mut [Transaction]) -> Result<[u8; 32]> {
    if txns.is_empty() || txns.len() > MAX_GROUP_SIZE {
        return Err(ClientError::InvalidArgument(format!(
            "group must hold 1 to {MAX_GROUP_SIZE} transactions, got {}",
            txns.len()
        )));
    }
    if txns.iter().any(|t| t.group.is_some()) {
        return Err(ClientError::InvalidArgument(
            "transaction already belongs to a group".to_string(),
        ));
    }
    let mut body = Vec::new();
    write_map_len(&mut body, 1).map_err(wire_err)?;
    write_str(&mut body, "txlist").map_err(wire_err)?;
    write_array_len(&mut body, txns.len() as u32).map_err(wire_err)?;
    for txn in txns.iter() {
        write_bin(&mut body, &txn.raw_id()?).map_err(wire_err)?;
    }
    let mut hasher = Sha512_256::new();
    hasher.update(GROUP_PREFIX);
    hasher.update(&body);
    let digest = hasher.finalize();
    let mut group = [0u8; 32];
    group.copy_from_slice(&digest);
    for txn in txns.iter_mut() {
        txn.group = Some(group);
    }
    Ok(group)
}

fn wire_err<E: std::fmt::Display>(err: E) -> ClientError {
    ClientError::Wire(err.to_string())
}

// ───────────────────────── canonical map writer ─────────────────────────

/// Buffers encoded values per key, then emits the map with keys sorted.
/// The put helpers skip zero and empty values, so a field that reaches
/// the entry list is always significant.
#[derive(Default)]
struct CanonicalMap {
    entries: Vec<(&'static str, Vec<u8>)>,
}

impl CanonicalMap {
    fn put_uint(&mut self, key: &'static str, value: u64) -> Result<()> {
        if value == 0 {
            return Ok(());
        }
        let mut buf = Vec::new();
        write_uint(&mut buf, value).map_err(wire_err)?;
        self.entries.push((key, buf));
        Ok(())
    }

    fn put_bytes(&mut self, key: &'static str, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        write_bin(&mut buf, value).map_err(wire_err)?;
        self.entries.push((key, buf));
        Ok(())
    }

    fn put_str(&mut self, key: &'static str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        write_str(&mut buf, value).map_err(wire_err)?;
        self.entries.push((key, buf));
        Ok(())
    }

    fn put_bin_list(&mut self, key: &'static str, items: &[Vec<u8>]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        write_array_len(&mut buf, items.len() as u32).map_err(wire_err)?;
        for item in items {
            write_bin(&mut buf, item).map_err(wire_err)?;
        }
        self.entries.push((key, buf));
        Ok(())
    }

    fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.entries.sort_by(|a, b| a.0.cmp(b.0));
        let mut out = Vec::new();
        write_map_len(&mut out, self.entries.len() as u32).map_err(wire_err)?;
        for (key, value) in self.entries {
            write_str(&mut out, key).map_err(wire_err)?;
            out.extend_from_slice(&value);
        }
        Ok(out)
    }
}
