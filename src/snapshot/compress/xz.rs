use crate::snapshot::compress::{Compressor, CompressorBuilder};
use crate::snapshot::result_error::result::Result;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use std::num::NonZero;
use validator::Validate;

static DEFAULT_COMPRESSION_LEVEL: u32 = 6;
static DEFAULT_MAX_PARALLELIZATION: usize = 32;

/// Configuration for XZ (LZMA) compression
///
/// Smaller archives than gzip at the cost of CPU time. Multi-threaded
/// encoding is used whenever more than one thread is configured.
#[skip_serializing_none]
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct XzConfig {
    /// Compression level (0-9)
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,

    /// Number of compression threads, half of the available cores when unset
    #[validate(range(min = 1))]
    thread: Option<u32>,
}

impl XzConfig {
    pub fn new(level: Option<u32>, thread: Option<u32>) -> Self {
        Self { level, thread }
    }
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let thread = self.thread.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZero::get)
                .map(|core| core / 2)
                .map(|t| t.max(1))
                .map(|t| t.min(DEFAULT_MAX_PARALLELIZATION) as u32)
                .unwrap_or(1)
        });

        tracing::debug!("Creating XZ compressor with level={}, threads={}", level, thread);

        if thread == 1 {
            Ok(Compressor::Xz(XzEncoder::new(writer, level)))
        } else {
            let stream = MtStreamBuilder::new()
                .preset(level)
                .check(Check::Crc64)
                .threads(thread)
                .encoder()?;
            Ok(Compressor::Xz(XzEncoder::new_stream(writer, stream)))
        }
    }
}
