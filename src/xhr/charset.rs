//! Charset resolution for response bodies
//!
//! Precedence, highest first:
//! 1. `charset` of the override MIME type
//! 2. `charset` of the response `Content-Type`
//! 3. UTF-8
//!
//! Empty or unrecognized labels fall through to the next source. Decoding
//! itself never fails: malformed sequences become U+FFFD.

use encoding_rs::{Encoding, UTF_8};

use super::mime::MimeType;

/// Where the resolved charset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    OverrideMimeType,
    ContentType,
    Default,
}

/// Result of charset resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    pub encoding: &'static Encoding,
    pub source: CharsetSource,
}

impl Charset {
    /// Decode bytes, replacing malformed sequences; a BOM wins over the label
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, actual, had_errors) = self.encoding.decode(bytes);
        if had_errors {
            log::debug!("Malformed {} sequences replaced while decoding", actual.name());
        }
        text.into_owned()
    }
}

/// Picks the decoding charset for a response
pub struct CharsetResolver;

impl CharsetResolver {
    /// Resolve from the override MIME type and the response `Content-Type`
    pub fn resolve(override_mime: Option<&MimeType>, content_type: Option<&MimeType>) -> Charset {
        if let Some(encoding) = override_mime.and_then(Self::encoding_of) {
            return Charset {
                encoding,
                source: CharsetSource::OverrideMimeType,
            };
        }
        if let Some(encoding) = content_type.and_then(Self::encoding_of) {
            return Charset {
                encoding,
                source: CharsetSource::ContentType,
            };
        }
        Charset {
            encoding: UTF_8,
            source: CharsetSource::Default,
        }
    }

    /// Look up an encoding label, `None` when unknown
    pub fn lookup(label: &str) -> Option<&'static Encoding> {
        Encoding::for_label(label.trim().as_bytes())
    }

    fn encoding_of(mime: &MimeType) -> Option<&'static Encoding> {
        let label = mime.charset()?;
        let encoding = Self::lookup(label);
        if encoding.is_none() {
            log::debug!("Unrecognized charset '{}', falling through", label);
        }
        encoding
    }
}
