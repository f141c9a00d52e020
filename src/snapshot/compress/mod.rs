pub mod gzip;
pub mod xz;

use crate::snapshot::file_ext::{FileExtProvider, MediaTypeProvider};
use crate::snapshot::finish::Finish;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::AddDebugObjectAndFnName;
use derive_more::From;
use flate2::write::GzEncoder;
use io_enum::Write;
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use std::io;
use std::io::Write;
use std::result;
use validator::{Validate, ValidationErrors};

#[derive(Write)]
pub enum Compressor<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
    Xz(XzEncoder<W>),
}

/// Compression applied on top of the tar stream.
///
/// Gzip is the default and is what the `*.tar.gz` snapshot layout expects.
#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "compressor_type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CompressorConfig {
    None,
    Gzip(gzip::GzipConfig),
    Xz(xz::XzConfig),
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig::Gzip(gzip::GzipConfig::default())
    }
}

impl Validate for CompressorConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            CompressorConfig::None => Ok(()),
            CompressorConfig::Gzip(gzip) => gzip.validate(),
            CompressorConfig::Xz(xz) => xz.validate(),
        }
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::None(w) => Ok(w),
            Compressor::Gzip(w) => w.finish(),
            Compressor::Xz(w) => w.finish(),
        }
    }
}

impl<W: Write> CompressorBuilder<W> for CompressorConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            CompressorConfig::None => Ok(Compressor::None(writer)),
            CompressorConfig::Gzip(gzip) => gzip.build_compressor(writer),
            CompressorConfig::Xz(xz) => xz.build_compressor(writer),
        }
        .add_debug_object_and_fn_name(self.clone(), "build_compressor")
    }
}

impl FileExtProvider for CompressorConfig {
    fn file_ext(&self) -> Option<&'static str> {
        match self {
            CompressorConfig::None => None,
            CompressorConfig::Gzip(_) => Some("gz"),
            CompressorConfig::Xz(_) => Some("xz"),
        }
    }
}

impl MediaTypeProvider for CompressorConfig {
    fn media_type(&self) -> &'static str {
        match self {
            CompressorConfig::None => "application/x-tar",
            CompressorConfig::Gzip(_) => "application/gzip",
            CompressorConfig::Xz(_) => "application/x-xz",
        }
    }
}
