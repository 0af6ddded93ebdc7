//! Trace ⇄ header-safe text.
//!
//! Encoding is JSON, then a general purpose stream compressor, then
//! standard padded base64. Decoding runs the same steps backwards.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StitchError};
use crate::model::{Timing, Trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobCompression {
    #[default]
    Gzip,
    Zlib,
    Deflate,
}

impl BlobCompression {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "zlib" => Ok(Self::Zlib),
            "deflate" => Ok(Self::Deflate),
            other => Err(StitchError::Config(format!(
                "unknown blob compression: {other}"
            ))),
        }
    }

    pub fn compress(self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(bytes)?;
                encoder.finish()
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(bytes)?;
                encoder.finish()
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(bytes)?;
                encoder.finish()
            }
        }
    }

    pub fn decompress(self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Gzip => GzDecoder::new(bytes).read_to_end(&mut out)?,
            Self::Zlib => ZlibDecoder::new(bytes).read_to_end(&mut out)?,
            Self::Deflate => DeflateDecoder::new(bytes).read_to_end(&mut out)?,
        };
        Ok(out)
    }
}

/// Gzip-compresses arbitrary bytes.
pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    BlobCompression::Gzip.compress(bytes)
}

/// Inverse of [`compress`].
pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    BlobCompression::Gzip.decompress(bytes)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireCodec {
    pub compression: BlobCompression,
}

impl WireCodec {
    pub fn new(compression: BlobCompression) -> Self {
        Self { compression }
    }

    pub fn encode(&self, trace: &Trace) -> Result<String> {
        if trace.root.is_none() {
            return Err(StitchError::InvalidArgument(format!(
                "trace {} has no root timing",
                trace.id
            )));
        }
        if !trace.duration_ms.is_finite() {
            return Err(StitchError::InvalidArgument(format!(
                "trace {} has a non-finite duration",
                trace.id
            )));
        }
        if let Some(name) = trace.root.as_ref().and_then(non_finite_timing) {
            return Err(StitchError::InvalidArgument(format!(
                "timing {name:?} has a non-finite offset"
            )));
        }
        let json = serde_json::to_vec(trace)
            .map_err(|e| StitchError::InvalidArgument(format!("trace not serializable: {e}")))?;
        let compressed = self
            .compression
            .compress(&json)
            .map_err(|e| StitchError::Io(format!("failed to compress trace: {e}")))?;
        Ok(STANDARD.encode(compressed))
    }

    pub fn decode(&self, blob: &str) -> Result<Trace> {
        let blob = blob.trim();
        if blob.is_empty() {
            return Err(StitchError::InvalidArgument(
                "trace blob is empty".to_string(),
            ));
        }
        let compressed = STANDARD
            .decode(blob)
            .map_err(|e| StitchError::MalformedBlob(format!("bad base64: {e}")))?;
        let json = self
            .compression
            .decompress(&compressed)
            .map_err(|e| StitchError::MalformedBlob(format!("decompression failed: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| StitchError::MalformedBlob(format!("not a trace: {e}")))
    }
}

/// JSON has no NaN or infinity, so such offsets would not survive a round
/// trip. Returns the name of the first offending timing.
fn non_finite_timing(timing: &Timing) -> Option<&str> {
    let bad = !timing.start_ms.is_finite()
        || timing.duration_ms.is_some_and(|d| !d.is_finite())
        || timing
            .sub_timings
            .iter()
            .any(|s| !s.start_ms.is_finite() || !s.duration_ms.is_finite());
    if bad {
        return Some(&timing.name);
    }
    timing.children.iter().find_map(non_finite_timing)
}

pub fn encode(trace: &Trace) -> Result<String> {
    WireCodec::default().encode(trace)
}

pub fn decode(blob: &str) -> Result<Trace> {
    WireCodec::default().decode(blob)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::model::{SubTiming, Timing};

    fn sample() -> Trace {
        Trace {
            id: Uuid::new_v4(),
            name: "GET /orders".to_string(),
            started: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            duration_ms: 80.0,
            machine_name: "api-1".to_string(),
            root: Some(
                Timing::new("GET /orders", 0.0)
                    .with_duration(80.0)
                    .with_child(
                        Timing::new("db", 10.0)
                            .with_duration(50.0)
                            .with_sub_timing(SubTiming::new("sql", "select * from orders", 11.0, 30.0)),
                    )
                    .with_child(Timing::new("render", 62.0)),
            ),
        }
    }

    #[test]
    fn round_trips_with_every_compressor() {
        let trace = sample();
        for compression in [
            BlobCompression::Gzip,
            BlobCompression::Zlib,
            BlobCompression::Deflate,
        ] {
            let codec = WireCodec::new(compression);
            let blob = codec.encode(&trace).unwrap();
            assert!(!blob.contains('\n'));
            assert_eq!(codec.decode(&blob).unwrap(), trace);
        }
    }

    #[test]
    fn decoding_twice_yields_independent_values() {
        let blob = encode(&sample()).unwrap();
        let mut a = decode(&blob).unwrap();
        let b = decode(&blob).unwrap();
        a.root.as_mut().unwrap().name = "changed".to_string();
        assert_eq!(b.root.unwrap().name, "GET /orders");
    }

    #[test]
    fn rejects_non_finite_offsets() {
        let mut trace = sample();
        trace.root.as_mut().unwrap().children[1].start_ms = f64::NAN;
        let err = encode(&trace).unwrap_err();
        assert!(matches!(&err, StitchError::InvalidArgument(m) if m.contains("render")));

        let mut trace = sample();
        trace.root.as_mut().unwrap().children[0].sub_timings[0].duration_ms = f64::INFINITY;
        assert!(matches!(encode(&trace), Err(StitchError::InvalidArgument(_))));

        let mut trace = sample();
        trace.duration_ms = f64::NEG_INFINITY;
        assert!(matches!(encode(&trace), Err(StitchError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_missing_root_and_empty_blob() {
        let mut trace = sample();
        trace.root = None;
        assert!(matches!(encode(&trace), Err(StitchError::InvalidArgument(_))));
        assert!(matches!(decode(""), Err(StitchError::InvalidArgument(_))));
        assert!(matches!(decode("   "), Err(StitchError::InvalidArgument(_))));
    }

    #[test]
    fn malformed_input_is_reported_not_panicked() {
        assert!(matches!(
            decode("not base64 at all!"),
            Err(StitchError::MalformedBlob(_))
        ));

        let not_gzip = STANDARD.encode(b"plain bytes");
        assert!(matches!(decode(&not_gzip), Err(StitchError::MalformedBlob(_))));

        let blob = encode(&sample()).unwrap();
        let mut bytes = STANDARD.decode(&blob).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            decode(&STANDARD.encode(bytes)),
            Err(StitchError::MalformedBlob(_))
        ));

        let not_trace = STANDARD.encode(compress(br#"{"hello":"world"}"#).unwrap());
        assert!(matches!(decode(&not_trace), Err(StitchError::MalformedBlob(_))));
    }

    #[test]
    fn compress_round_trips_random_bytes() {
        let expected: Vec<u8> = (0..1024u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let actual = decompress(&compress(&expected).unwrap()).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn parses_compression_names() {
        assert_eq!(BlobCompression::parse("GZIP").unwrap(), BlobCompression::Gzip);
        assert_eq!(BlobCompression::parse("zlib").unwrap(), BlobCompression::Zlib);
        assert_eq!(
            BlobCompression::parse(" deflate ").unwrap(),
            BlobCompression::Deflate
        );
        assert!(BlobCompression::parse("brotli").is_err());
    }
}
