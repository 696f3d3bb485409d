//! # Frame Transport
//!
//! Message framing over any ordered byte stream:
//!
//! ```text
//! kind: u8 (0 = text, 1 = binary) | len: u32 LE | len bytes
//! ```
//!
//! Text frames carry the handshake, binary frames carry submessages.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NetError, NetResult};

const KIND_TEXT: u8 = 0;
const KIND_BINARY: u8 = 1;

/// Size of the frame prefix.
pub const FRAME_HEADER_SIZE: usize = 5;

/// One transport message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 control text.
    Text(String),
    /// Concatenated submessages.
    Binary(Vec<u8>),
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Self::Text(_) => KIND_TEXT,
            Self::Binary(_) => KIND_BINARY,
        }
    }

    fn body(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Encoded size including the prefix.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.body().len()
    }
}

/// Reads one frame, or `None` on a clean end of stream between frames.
///
/// # Errors
///
/// [`NetError::FrameTooLarge`] if the prefix exceeds `max_len`,
/// [`NetError::UnknownFrameKind`], [`NetError::InvalidText`], or
/// [`NetError::Io`] (including an end of stream inside a frame).
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> NetResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if kind != KIND_TEXT && kind != KIND_BINARY {
        return Err(NetError::UnknownFrameKind(kind));
    }

    let len = reader.read_u32_le().await? as usize;
    if len > max_len {
        return Err(NetError::FrameTooLarge {
            len,
            limit: max_len,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    if kind == KIND_TEXT {
        String::from_utf8(body)
            .map(|text| Some(Frame::Text(text)))
            .map_err(|_| NetError::InvalidText)
    } else {
        Ok(Some(Frame::Binary(body)))
    }
}

/// Writes and flushes one frame.
///
/// # Errors
///
/// [`NetError::FrameTooLarge`] for bodies over `u32::MAX` bytes, or
/// [`NetError::Io`].
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> NetResult<()>
where
    W: AsyncWrite + Unpin,
{
    let body = frame.body();
    let len = u32::try_from(body.len()).map_err(|_| NetError::FrameTooLarge {
        len: body.len(),
        limit: u32::MAX as usize,
    })?;

    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[0] = frame.kind();
    header[1..].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, &Frame::Text("17".into())).await.unwrap();
        write_frame(&mut a, &Frame::Binary(vec![1, 2, 3])).await.unwrap();
        write_frame(&mut a, &Frame::Binary(Vec::new())).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(Frame::Text("17".into())));
        assert_eq!(
            read_frame(&mut b, 64).await.unwrap(),
            Some(Frame::Binary(vec![1, 2, 3]))
        );
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), Some(Frame::Binary(Vec::new())));
        assert_eq!(read_frame(&mut b, 64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, &Frame::Binary(vec![0; 100])).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(NetError::FrameTooLarge { len: 100, limit: 64 })
        ));
    }

    #[tokio::test]
    async fn test_bad_kind_and_truncation() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[7, 0, 0, 0, 0]).await.unwrap();
        assert!(matches!(
            read_frame(&mut b, 64).await,
            Err(NetError::UnknownFrameKind(7))
        ));

        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[1, 10, 0, 0, 0, 1, 2]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b, 64).await, Err(NetError::Io(_))));
    }
}
