//! Wallet provider abstraction and the signing coordinator.
//!
//! Provider versions disagree on the payload shape they accept, so a
//! signing attempt presents the group in two candidate encodings and
//! falls through on [`ClientError::WalletFormatMismatch`]. Whatever the
//! provider returns — a blob, a list, lists nested inside lists — is
//! normalized into a flat list of signed byte buffers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use crate::errors::{ClientError, Result};
use crate::txn::Transaction;

/// The unsigned group in one of the encodings a provider may accept.
#[derive(Debug, Clone)]
pub enum SigningPayload {
    /// Base64-serialized unsigned transaction bytes, one per member.
    Base64(Vec<String>),
    /// Object form for providers that re-serialize themselves.
    Structured(Vec<TxnWrapper>),
}

impl SigningPayload {
    fn label(&self) -> &'static str {
        match self {
            SigningPayload::Base64(_) => "base64",
            SigningPayload::Structured(_) => "structured",
        }
    }
}

/// One group member in the structured encoding.
#[derive(Debug, Clone)]
pub struct TxnWrapper {
    pub txn: Transaction,
    /// Addresses expected to sign this member; empty means the connected
    /// account.
    pub signers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub payload: SigningPayload,
}

impl SigningRequest {
    pub fn base64(txns: &[Transaction]) -> Result<Self> {
        let mut items = Vec::with_capacity(txns.len());
        for txn in txns {
            items.push(BASE64.encode(txn.encode()?));
        }
        Ok(SigningRequest { payload: SigningPayload::Base64(items) })
    }

    pub fn structured(txns: &[Transaction]) -> Self {
        SigningRequest {
            payload: SigningPayload::Structured(
                txns.iter()
                    .map(|txn| TxnWrapper { txn: txn.clone(), signers: Vec::new() })
                    .collect(),
            ),
        }
    }
}

/// Whatever shape the provider hands back.
#[derive(Debug, Clone)]
pub enum SignedReply {
    Blob(Vec<u8>),
    List(Vec<SignedReply>),
    Absent,
}

impl SignedReply {
    /// Flattens nested replies into signed byte buffers, dropping empty
    /// blobs and absent slots, preserving order.
    pub fn normalize(self) -> Vec<Vec<u8>> {
        let mut blobs = Vec::new();
        self.collect_into(&mut blobs);
        blobs
    }

    fn collect_into(self, blobs: &mut Vec<Vec<u8>>) {
        match self {
            SignedReply::Blob(blob) => {
                if !blob.is_empty() {
                    blobs.push(blob);
                }
            }
            SignedReply::List(items) => {
                for item in items {
                    item.collect_into(blobs);
                }
            }
            SignedReply::Absent => {}
        }
    }
}

/// An external signing provider (browser extension, mobile wallet).
///
/// `sign` takes `&mut self`: providers allow a single pending request per
/// session, and the exclusive borrow serializes attempts naturally.
#[allow(async_fn_in_trait)]
pub trait WalletProvider {
    /// Silently resumes an existing session, returning its addresses.
    async fn reconnect(&mut self) -> Result<Vec<String>>;
    /// Interactive connect prompt; used only when no session exists.
    async fn connect(&mut self) -> Result<Vec<String>>;
    async fn sign(&mut self, request: &SigningRequest) -> Result<SignedReply>;
    async fn disconnect(&mut self) -> Result<()>;
}

/// Observable phase of the current signing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningState {
    #[default]
    Idle,
    Reconnecting,
    AwaitingSignature,
    Signed,
    Rejected,
    Failed,
}

/// Per-session signing context: the connected address plus the state of
/// the attempt in flight.
#[derive(Debug, Default)]
pub struct WalletSession {
    address: Option<String>,
    state: SigningState,
}

impl WalletSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn state(&self) -> SigningState {
        self.state
    }
}

/// Runs one signing attempt: reconnect (or connect) the session, then
/// present the group in each candidate encoding until one is accepted.
///
/// A user rejection is terminal — no further encodings are tried and the
/// error is [`ClientError::UserCancelled`], never a technical failure.
pub async fn sign_transactions<P: WalletProvider>(
    provider: &mut P,
    session: &mut WalletSession,
    txns: &[Transaction],
) -> Result<Vec<Vec<u8>>> {
    if txns.is_empty() {
        return Err(ClientError::InvalidArgument("nothing to sign".to_string()));
    }

    session.state = SigningState::Reconnecting;
    let addresses = match provider.reconnect().await {
        Ok(addresses) if !addresses.is_empty() => addresses,
        Ok(_) | Err(_) => {
            debug!("no resumable wallet session; prompting an interactive connect");
            provider.connect().await.map_err(|e| settle(session, e))?
        }
    };
    let Some(address) = addresses.first() else {
        session.state = SigningState::Failed;
        return Err(ClientError::WalletUnavailable(
            "wallet connected without any account".to_string(),
        ));
    };
    session.address = Some(address.clone());

    session.state = SigningState::AwaitingSignature;
    let requests = [SigningRequest::base64(txns)?, SigningRequest::structured(txns)];
    let mut mismatch: Option<ClientError> = None;
    for request in requests {
        let label = request.payload.label();
        match provider.sign(&request).await {
            Ok(reply) => {
                let blobs = reply.normalize();
                if blobs.is_empty() {
                    debug!("wallet returned no signed bytes for the {label} payload");
                    mismatch = Some(ClientError::WalletFormatMismatch(format!(
                        "{label} payload produced an empty reply"
                    )));
                    continue;
                }
                session.state = SigningState::Signed;
                return Ok(blobs);
            }
            Err(ClientError::UserCancelled) => {
                session.state = SigningState::Rejected;
                return Err(ClientError::UserCancelled);
            }
            Err(ClientError::WalletFormatMismatch(msg)) => {
                debug!("wallet rejected the {label} payload ({msg}); trying the next encoding");
                mismatch = Some(ClientError::WalletFormatMismatch(msg));
            }
            Err(e) => return Err(settle(session, e)),
        }
    }

    session.state = SigningState::Failed;
    Err(mismatch.unwrap_or_else(|| {
        ClientError::WalletFormatMismatch("every payload encoding was rejected".to_string())
    }))
}

fn settle(session: &mut WalletSession, err: ClientError) -> ClientError {
    session.state = match err {
        ClientError::UserCancelled => SigningState::Rejected,
        _ => SigningState::Failed,
    };
    err
}
