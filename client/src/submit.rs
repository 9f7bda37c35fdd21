//! Broadcast and bounded confirmation polling.

use tracing::{debug, info};

use crate::errors::{ClientError, Result};
use crate::rpc::Ledger;

/// Broadcasts one transaction or one atomic group as a single call.
pub async fn broadcast<L: Ledger>(ledger: &L, blobs: &[Vec<u8>]) -> Result<String> {
    if blobs.is_empty() {
        return Err(ClientError::InvalidArgument("nothing to submit".to_string()));
    }
    let txid = ledger.submit(blobs).await?;
    debug!("submitted {} transaction(s) as {txid}", blobs.len());
    Ok(txid)
}

/// Polls pending status round by round until the transaction confirms,
/// the pool rejects it, or `max_rounds` rounds elapse.
///
/// Query errors propagate immediately; only the passage of rounds is
/// retried.
pub async fn wait_for_confirmation<L: Ledger>(
    ledger: &L,
    txid: &str,
    max_rounds: u64,
) -> Result<u64> {
    let mut round = ledger.last_round().await?;
    for _ in 0..max_rounds {
        let pending = ledger.pending(txid).await?;
        if pending.confirmed_round > 0 {
            info!("{txid} confirmed in round {}", pending.confirmed_round);
            return Ok(pending.confirmed_round);
        }
        if !pending.pool_error.is_empty() {
            return Err(ClientError::PoolRejected(pending.pool_error));
        }
        round += 1;
        ledger.wait_for_round_after(round).await?;
    }
    Err(ClientError::ConfirmationTimeout { rounds: max_rounds })
}

/// Broadcasts and waits; the transaction id is returned once confirmed.
pub async fn submit_and_confirm<L: Ledger>(
    ledger: &L,
    blobs: &[Vec<u8>],
    max_rounds: u64,
) -> Result<String> {
    let txid = broadcast(ledger, blobs).await?;
    wait_for_confirmation(ledger, &txid, max_rounds).await?;
    Ok(txid)
}
