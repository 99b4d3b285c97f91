use std::sync::Arc;

use px_domain::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};

use crate::wire::{read_frame, write_frame};
use crate::RpcFrame;

/// A service-side request handler. One servicer per service binary;
/// requests on a connection are handled sequentially, connections
/// concurrently.
#[async_trait::async_trait]
pub trait Servicer: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response>;
}

/// Bind `addr` and serve requests forever. A bind failure is returned so
/// the binary can exit with the bind-failure code; per-connection errors
/// are logged and never tear the listener down.
pub async fn serve<S: Servicer>(addr: &str, servicer: Arc<S>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::unavailable(format!("rpc bind {addr}: {e}")))?;
    tracing::info!(addr, "rpc server listening");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let servicer = servicer.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, servicer).await {
                        tracing::debug!(peer = %peer, error = %e, "rpc connection ended");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "rpc accept failed");
            }
        }
    }
}

async fn serve_connection<S: Servicer>(mut stream: TcpStream, servicer: Arc<S>) -> Result<()> {
    loop {
        let request = match read_frame::<_, S::Request>(&mut stream).await {
            Ok(Some(req)) => req,
            Ok(None) => return Ok(()),
            Err(e) => {
                // Malformed request: report the kind back, then drop the
                // connection since framing may be out of sync.
                let frame: RpcFrame<S::Response> = RpcFrame::Error {
                    kind: e.kind,
                    message: e.message.clone(),
                };
                let _ = write_frame(&mut stream, &frame).await;
                return Err(e);
            }
        };

        let frame = match servicer.handle(request).await {
            Ok(resp) => RpcFrame::Reply(resp),
            Err(e) => RpcFrame::Error {
                kind: e.kind,
                message: e.message,
            },
        };
        write_frame(&mut stream, &frame).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    enum EchoRequest {
        Echo(String),
        Fail(String),
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    enum EchoResponse {
        Echoed(String),
    }

    struct EchoServicer;

    #[async_trait::async_trait]
    impl Servicer for EchoServicer {
        type Request = EchoRequest;
        type Response = EchoResponse;

        async fn handle(&self, request: EchoRequest) -> Result<EchoResponse> {
            match request {
                EchoRequest::Echo(s) => Ok(EchoResponse::Echoed(s)),
                EchoRequest::Fail(msg) => Err(Error::permission_denied(msg)),
            }
        }
    }

    #[tokio::test]
    async fn unary_call_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, Arc::new(EchoServicer)).await.ok();
        });

        let resp: EchoResponse = crate::call(&addr, &EchoRequest::Echo("hi".into()))
            .await
            .unwrap();
        assert_eq!(resp, EchoResponse::Echoed("hi".into()));
    }

    #[tokio::test]
    async fn error_kind_crosses_the_wire() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, Arc::new(EchoServicer)).await.ok();
        });

        let err = crate::call::<_, EchoResponse>(&addr, &EchoRequest::Fail("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::PermissionDenied);
        assert_eq!(err.message, "nope");
    }

    #[tokio::test]
    async fn unreachable_peer_is_unavailable() {
        // Port 9 (discard) is almost certainly closed; a refused connect
        // must surface as Unavailable, not hang.
        let err = crate::call_with_timeout::<_, EchoResponse>(
            "127.0.0.1:9",
            &EchoRequest::Echo("x".into()),
            std::time::Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::Unavailable);
    }
}
