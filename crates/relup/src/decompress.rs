use std::io::Read;

use flate2::read::GzDecoder;
use tokio::io::AsyncReadExt;

use crate::fetch::ByteStream;

/// Drain `stream` and gunzip it.
///
/// Corruption anywhere in the payload (header, deflate data, CRC or length
/// trailer, truncation) fails the whole call; no partial output is returned.
///
/// # Errors
/// Returns the read or decode error from the underlying stream or decoder.
pub async fn decompress(mut stream: ByteStream) -> std::io::Result<Vec<u8>> {
    let mut compressed = Vec::new();
    stream.read_to_end(&mut compressed).await?;
    gunzip(&compressed)
}

pub(crate) fn gunzip(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(raw)
}

#[cfg(test)]
pub(crate) fn gzip(raw: &[u8]) -> Vec<u8> {
    use std::io::Write as _;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(raw).expect("gzip encoder should accept data");
    encoder.finish().expect("gzip encoder should finish")
}
