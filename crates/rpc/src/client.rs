use std::time::Duration;

use px_domain::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;

use crate::wire::{read_frame, write_frame};
use crate::RpcFrame;

/// Default end-to-end deadline for a unary call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Issue a unary call with the default 10 s deadline.
pub async fn call<Req, Resp>(addr: &str, request: &Req) -> Result<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    call_with_timeout(addr, request, DEFAULT_TIMEOUT).await
}

/// Issue a unary call: connect, write the request frame, read one
/// response frame. The deadline covers the whole exchange.
pub async fn call_with_timeout<Req, Resp>(
    addr: &str,
    request: &Req,
    timeout: Duration,
) -> Result<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    tokio::time::timeout(timeout, call_inner(addr, request))
        .await
        .map_err(|_| Error::unavailable(format!("rpc to {addr} timed out")))?
}

async fn call_inner<Req, Resp>(addr: &str, request: &Req) -> Result<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| Error::unavailable(format!("rpc connect {addr}: {e}")))?;

    write_frame(&mut stream, request).await?;

    match read_frame::<_, RpcFrame<Resp>>(&mut stream).await? {
        Some(RpcFrame::Reply(resp)) => Ok(resp),
        Some(RpcFrame::Error { kind, message }) => Err(Error::new(kind, message)),
        Some(RpcFrame::Chunk(_)) | Some(RpcFrame::End) => Err(Error::internal(
            "streamed frame received on a unary call",
        )),
        None => Err(Error::unavailable(format!(
            "rpc peer {addr} closed before replying"
        ))),
    }
}
