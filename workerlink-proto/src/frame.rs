//! Multipart message framing over any async byte stream.
//!
//! A message is `[u32 BE part count]` followed by, for each part,
//! `[u32 BE length][payload]`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed payload of a single part (16 MiB).
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Maximum number of parts in one message.
pub const MAX_PARTS: u32 = 64;

/// Writes `frames` as one multipart message and flushes `w`.
///
/// The whole message is assembled first so it reaches the stream in a
/// single write.
pub async fn send_frames<W, F>(w: &mut W, frames: &[F]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    F: AsRef<[u8]>,
{
    let count = u32::try_from(frames.len())
        .ok()
        .filter(|&n| n <= MAX_PARTS)
        .ok_or_else(|| invalid("too many parts in message"))?;

    let total: usize = frames.iter().map(|f| f.as_ref().len() + 4).sum();
    let mut buf = Vec::with_capacity(4 + total);
    buf.extend_from_slice(&count.to_be_bytes());
    for frame in frames {
        let frame = frame.as_ref();
        let len = u32::try_from(frame.len())
            .ok()
            .filter(|&n| n <= MAX_FRAME)
            .ok_or_else(|| invalid("frame exceeds 16 MiB limit"))?;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(frame);
    }

    w.write_all(&buf).await?;
    w.flush().await
}

/// Reads one multipart message from `r`.
pub async fn recv_frames<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let count = r.read_u32().await?;
    if count > MAX_PARTS {
        return Err(invalid("too many parts in message"));
    }

    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = r.read_u32().await?;
        if len > MAX_FRAME {
            return Err(invalid("frame exceeds 16 MiB limit"));
        }
        let mut payload = vec![0u8; len as usize];
        r.read_exact(&mut payload).await?;
        frames.push(payload);
    }
    Ok(frames)
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multipart_roundtrip() {
        let mut buf = Vec::new();
        send_frames(
            &mut buf,
            &[b"primary".as_slice(), b"".as_slice(), b"trailer".as_slice()],
        )
        .await
        .unwrap();

        let mut cursor = io::Cursor::new(buf);
        let frames = recv_frames(&mut cursor).await.unwrap();
        assert_eq!(
            frames,
            vec![b"primary".to_vec(), Vec::new(), b"trailer".to_vec()]
        );
    }

    #[tokio::test]
    async fn zero_part_message() {
        let mut buf = Vec::new();
        send_frames::<_, Vec<u8>>(&mut buf, &[]).await.unwrap();
        assert_eq!(buf, 0u32.to_be_bytes());

        let frames = recv_frames(&mut io::Cursor::new(buf)).await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        // One part whose header claims 32 MiB.
        let mut header = 1u32.to_be_bytes().to_vec();
        header.extend_from_slice(&(32u32 * 1024 * 1024).to_be_bytes());
        let err = recv_frames(&mut io::Cursor::new(header)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn rejects_too_many_parts() {
        let header = (MAX_PARTS + 1).to_be_bytes();
        let err = recv_frames(&mut io::Cursor::new(header.to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_message_is_eof() {
        let mut buf = Vec::new();
        send_frames(&mut buf, &[b"primary".as_slice()]).await.unwrap();
        buf.truncate(buf.len() - 2);
        let err = recv_frames(&mut io::Cursor::new(buf)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
