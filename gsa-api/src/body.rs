//  BODY.rs
//
//  Description:
//!   Decodes a request body that may be plain JSON or gzip-compressed
//!   JSON, transparently, by sniffing the gzip magic bytes before
//!   parsing, via `async_compression::tokio::bufread::GzipDecoder`.

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncReadExt, BufReader};

use crate::errors::ApiError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompresses `raw` if it looks gzip-encoded, otherwise returns it as-is.
pub async fn decompress(raw: bytes::Bytes) -> Result<Vec<u8>, ApiError> {
    if raw.len() >= 2 && raw[0] == GZIP_MAGIC[0] && raw[1] == GZIP_MAGIC[1] {
        let cursor = std::io::Cursor::new(raw.to_vec());
        let mut decoder = GzipDecoder::new(BufReader::new(cursor));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).await.map_err(|err| ApiError::MalformedBody { err: err.to_string() })?;
        Ok(out)
    } else {
        Ok(raw.to_vec())
    }
}

/// Decodes a body into `T`, transparently handling gzip per [`decompress`].
pub async fn decode_json<T: serde::de::DeserializeOwned>(raw: bytes::Bytes) -> Result<T, ApiError> {
    let bytes = decompress(raw).await?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::MalformedBody { err: err.to_string() })
}
