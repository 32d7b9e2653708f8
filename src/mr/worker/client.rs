//! Worker-side RPC client: registration (with retry) and the peer-to-peer
//! `get_imd_data` pull used during reduce. See
//! `worker/rpcClient.go`.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use tarpc::{client, context, tokio_serde::formats::Json};
use tokio::time::sleep;

use crate::mr::codec::{self, KeyValue};
use crate::mr::error::MrError;
use crate::mr::rpc;

/// Whether an RPC-level failure is the kind that's expected to heal on
/// its own (the connection dropped mid-call, or the deadline fired before
/// the master answered) as opposed to a response the master actually sent
/// back describing something permanently wrong with the request.
fn is_transient_rpc_error(err: &tarpc::client::RpcError) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("deadline") || msg.contains("disconnect") || msg.contains("shutdown") || msg.contains("closed")
}

const REGISTER_MAX_ATTEMPTS: u32 = 40;
const REGISTER_BACKOFF: Duration = Duration::from_millis(200);
const REGISTER_DEADLINE: Duration = Duration::from_secs(2);
const SHORT_DEADLINE: Duration = Duration::from_secs(1);

/// A worker's connection to the Master, used for registration and
/// reporting intermediate-file locations. Cheap to clone: every clone
/// shares the same target address and opens its own transport per call.
#[derive(Clone)]
pub struct MasterRpcClient {
    addr: SocketAddr,
}

/// Outcome of one registration attempt, distinguishing failures worth
/// retrying (master not listening yet, RPC deadline) from failures that
/// will not heal themselves (a malformed response, a rejected request).
enum RegisterAttempt {
    Ok(i32),
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

impl MasterRpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn connect(&self) -> anyhow::Result<rpc::MasterClient> {
        let transport = tarpc::serde_transport::tcp::connect(self.addr, Json::default).await?;
        Ok(rpc::MasterClient::new(client::Config::default(), transport).spawn())
    }

    /// Register with the Master, retrying only the failures that are
    /// expected to heal on their own: the master's listener not accepting
    /// connections yet, or an RPC that didn't complete before its
    /// deadline. Anything else — a response the master actually sent back
    /// that says the request itself was bad — fails immediately rather
    /// than burning the full attempt budget.
    pub async fn register(&self, info: rpc::WorkerInfo) -> Result<i32, MrError> {
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..REGISTER_MAX_ATTEMPTS {
            match self.try_register(&info).await {
                RegisterAttempt::Ok(id) => return Ok(id),
                RegisterAttempt::Fatal(e) => {
                    return Err(MrError::RegistrationFailed {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                RegisterAttempt::Transient(e) => last_err = Some(e),
            }
            sleep(REGISTER_BACKOFF).await;
        }

        Err(MrError::RegistrationFailed {
            attempts: REGISTER_MAX_ATTEMPTS,
            source: last_err.unwrap_or_else(|| anyhow::anyhow!("registration failed with no recorded error")),
        })
    }

    async fn try_register(&self, info: &rpc::WorkerInfo) -> RegisterAttempt {
        let client = match self.connect().await {
            Ok(client) => client,
            Err(e) => return RegisterAttempt::Transient(e),
        };
        let mut ctx = context::current();
        ctx.deadline = SystemTime::now() + REGISTER_DEADLINE;
        match client.worker_register(ctx, info.clone()).await {
            Ok(result) if result.ok => RegisterAttempt::Ok(result.id),
            Ok(_) => RegisterAttempt::Fatal(anyhow::anyhow!("worker_register rpc returned ok=false")),
            Err(e) if is_transient_rpc_error(&e) => RegisterAttempt::Transient(e.into()),
            Err(e) => RegisterAttempt::Fatal(e.into()),
        }
    }

    pub async fn update_imd_info(&self, info: rpc::ImdInfo) -> Result<(), MrError> {
        let run = async {
            let client = self.connect().await?;
            let mut ctx = context::current();
            ctx.deadline = SystemTime::now() + SHORT_DEADLINE;
            let ok = client.update_imd_info(ctx, info).await?;
            anyhow::ensure!(ok, "update_imd_info rpc returned false");
            Ok::<(), anyhow::Error>(())
        };
        run.await.map_err(|source| MrError::Rpc {
            call: "update_imd_info",
            source,
        })
    }
}

/// Pull one intermediate shard from the worker that produced it. Used
/// serially during reduce, one peer at a time.
pub async fn get_imd_data(peer_addr: &str, filename: &str) -> Result<Vec<KeyValue>, MrError> {
    let run = async {
        let addr: SocketAddr = peer_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid peer address `{peer_addr}`: {e}"))?;
        let transport = tarpc::serde_transport::tcp::connect(addr, Json::default).await?;
        let client = rpc::WorkerClient::new(client::Config::default(), transport).spawn();

        let mut ctx = context::current();
        ctx.deadline = SystemTime::now() + SHORT_DEADLINE;
        let raw = client
            .get_imd_data(ctx, rpc::ImdLoc { filename: filename.to_string() })
            .await?;
        Ok::<_, anyhow::Error>(codec::decode(&raw))
    };
    run.await.map_err(|source| MrError::Rpc {
        call: "get_imd_data",
        source,
    })
}
