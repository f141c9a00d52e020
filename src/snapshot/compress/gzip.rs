use crate::snapshot::compress::{Compressor, CompressorBuilder};
use crate::snapshot::result_error::result::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use validator::Validate;

/// Same default as `gzip(1)`
static DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Configuration for gzip (DEFLATE) compression
#[skip_serializing_none]
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GzipConfig {
    /// Compression level (0-9), 0 stores without compressing
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
}

impl GzipConfig {
    pub fn with_level(level: u32) -> Self {
        Self { level: Some(level) }
    }
}

impl<W: Write> CompressorBuilder<W> for GzipConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        tracing::debug!("Creating gzip compressor with level={}", level);
        Ok(Compressor::Gzip(GzEncoder::new(
            writer,
            Compression::new(level),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::finish::Finish;
    use flate2::read::GzDecoder;
    use std::io::{Cursor, Read};

    #[test]
    fn test_gzip_config_validation() {
        assert!(GzipConfig::default().validate().is_ok());
        assert!(GzipConfig::with_level(0).validate().is_ok());
        assert!(GzipConfig::with_level(9).validate().is_ok());
        assert!(GzipConfig::with_level(10).validate().is_err());
    }

    #[test]
    fn test_build_compressor_produces_gzip_stream() {
        let mut compressor = GzipConfig::with_level(1)
            .build_compressor(Cursor::new(Vec::new()))
            .unwrap();
        compressor.write_all(b"agents").unwrap();
        let bytes = compressor.finish().unwrap().into_inner();

        // gzip magic
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "agents");
    }

    #[test]
    fn test_gzip_config_serialization_skips_none() {
        let serialized = serde_json::to_string(&GzipConfig::default()).unwrap();
        assert_eq!(serialized, "{}");
    }
}
