//! Blob framing: `[u32 size][size bytes]`, and the opcode framing that
//! wraps it.
//!
//! Modeled directly on `astrid-kernel::socket`'s `[u32 big-endian
//! len][payload]` loop, generalized from a fixed JSON payload to the
//! opcode-tagged shapes this protocol needs.

use sso_core::SessionData;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{PluginHostError, PluginHostResult};

/// Caps a single blob at 16 MiB so a misbehaving subordinate can't make
/// the host allocate unbounded memory from a bogus size prefix.
pub const MAX_BLOB_BYTES: u32 = 16 * 1024 * 1024;

/// Write a `u32` opcode, big-endian.
pub async fn write_opcode<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    opcode: u32,
) -> PluginHostResult<()> {
    writer.write_all(&opcode.to_be_bytes()).await?;
    Ok(())
}

/// Read a `u32` opcode, big-endian.
pub async fn read_opcode<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> PluginHostResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Write a length-prefixed blob containing `data`.
///
/// # Errors
///
/// Returns [`PluginHostError::Protocol`] if `data` cannot be serialized.
pub async fn write_blob<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    data: &SessionData,
) -> PluginHostResult<()> {
    let bytes = serde_json::to_vec(data)
        .map_err(|e| PluginHostError::Protocol(format!("blob serialization failed: {e}")))?;
    let len = u32::try_from(bytes.len())
        .map_err(|_| PluginHostError::Protocol("blob too large to frame".to_owned()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Read a length-prefixed blob and deserialize it into a [`SessionData`].
///
/// Suspends (via the underlying `AsyncRead`) until all `size` bytes have
/// arrived; a failed deserialization is a fatal protocol error on this
/// subordinate, per §4.2.
///
/// # Errors
///
/// Returns [`PluginHostError::Protocol`] if the frame exceeds
/// [`MAX_BLOB_BYTES`] or fails to deserialize.
pub async fn read_blob<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> PluginHostResult<SessionData> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_BLOB_BYTES {
        return Err(PluginHostError::Protocol(format!(
            "blob size {len} exceeds {MAX_BLOB_BYTES}"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload)
        .map_err(|e| PluginHostError::Protocol(format!("blob deserialization failed: {e}")))
}

/// Write a `u32`-length-prefixed UTF-8 string (used for the `TYPE`
/// response and `ERROR` messages).
pub async fn write_string<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    s: &str,
) -> PluginHostResult<()> {
    let bytes = s.as_bytes();
    let len = u32::try_from(bytes.len())
        .map_err(|_| PluginHostError::Protocol("string too large to frame".to_owned()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    Ok(())
}

/// Read a `u32`-length-prefixed UTF-8 string.
pub async fn read_string<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> PluginHostResult<String> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_BLOB_BYTES {
        return Err(PluginHostError::Protocol(format!(
            "string size {len} exceeds {MAX_BLOB_BYTES}"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| PluginHostError::Protocol(format!("non-utf8 string: {e}")))
}

/// Read a `u32`-length-prefixed list of strings (the `MECHANISMS`
/// response).
pub async fn read_string_list<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> PluginHostResult<Vec<String>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let count = u32::from_be_bytes(len_buf);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_string(reader).await?);
    }
    Ok(out)
}

/// Write a `u32`-length-prefixed list of strings.
pub async fn write_string_list<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    items: &[String],
) -> PluginHostResult<()> {
    let count = u32::try_from(items.len())
        .map_err(|_| PluginHostError::Protocol("string list too large to frame".to_owned()))?;
    writer.write_all(&count.to_be_bytes()).await?;
    for item in items {
        write_string(writer, item).await?;
    }
    Ok(())
}
