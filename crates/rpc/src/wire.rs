//! Frame codec: 4-byte big-endian length prefix + JSON payload.

use px_domain::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame (16 MiB). File content responses are the
/// largest legitimate frames.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Serialize `value` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(Error::invalid_argument(format!(
            "frame of {} bytes exceeds the {} byte cap",
            payload.len(),
            MAX_FRAME_BYTES
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between
/// frames; a close mid-frame is an error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(Error::invalid_argument(format!(
            "incoming frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte cap"
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        body: String,
    }

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = Ping {
            seq: 7,
            body: "hello".into(),
        };
        write_frame(&mut a, &msg).await.unwrap();
        let back: Option<Ping> = read_frame(&mut b).await.unwrap();
        assert_eq!(back, Some(msg));
    }

    #[tokio::test]
    async fn sequential_frames_preserve_order() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        for seq in 0..3u32 {
            write_frame(&mut a, &Ping {
                seq,
                body: "x".into(),
            })
            .await
            .unwrap();
        }
        for seq in 0..3u32 {
            let got: Ping = read_frame(&mut b).await.unwrap().unwrap();
            assert_eq!(got.seq, seq);
        }
    }

    #[tokio::test]
    async fn clean_close_reads_none() {
        let (a, mut b) = tokio::io::duplex(16);
        drop(a);
        let got: Option<Ping> = read_frame(&mut b).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn oversize_declared_length_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let bogus = (MAX_FRAME_BYTES as u32 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut a, &bogus)
            .await
            .unwrap();
        let err = read_frame::<_, Ping>(&mut b).await.unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::InvalidArgument);
    }

    #[test]
    fn length_prefix_is_big_endian() {
        // Mirrors the on-wire layout assertion rather than the codec API.
        let len: u32 = 0x0102_0304;
        assert_eq!(len.to_be_bytes(), [1, 2, 3, 4]);
    }
}
