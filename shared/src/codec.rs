//! Length-prefixed bincode framing for [`Packet`]s over any async byte stream.
//!
//! Frame layout: `[u32 little-endian payload length][bincode payload]`.

use crate::{Packet, MAX_FRAME_SIZE};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("stream closed")]
    Closed,
    #[error("frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(packet)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(payload.len(), MAX_FRAME_SIZE));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub async fn read_packet<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Packet, CodecError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(CodecError::Closed),
        Err(e) => return Err(CodecError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(len, MAX_FRAME_SIZE));
    }

    let mut payload = vec![0u8; len];
    match stream.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(CodecError::Closed),
        Err(e) => return Err(CodecError::Io(e)),
    }

    Ok(bincode::deserialize(&payload)?)
}

pub async fn write_packet<W: AsyncWrite + Unpin>(
    stream: &mut W,
    packet: &Packet,
) -> Result<(), CodecError> {
    let frame = encode(packet)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}
