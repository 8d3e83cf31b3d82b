//! # txkv Codec
//!
//! The attribute value model shared by the store and the transaction layer,
//! plus the CBOR encoding used to persist values as opaque blobs.
//!
//! Encoding goes through `serde`, and every map in the model is a
//! `BTreeMap`, so encoding is deterministic: decoding a blob and encoding it
//! again yields the same bytes.
//!
//! ## Usage
//!
//! ```
//! use txkv_codec::{from_cbor, to_cbor, AttributeValue};
//!
//! let value = AttributeValue::s("hello");
//! let bytes = to_cbor(&value).unwrap();
//! let decoded: AttributeValue = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod value;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{CodecError, CodecResult};
pub use value::{item, item_size, AttributeValue, Item};

/// Encode any serializable value to CBOR bytes.
///
/// # Errors
///
/// Returns `CodecError::EncodingFailed` if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(format!("{e:?}")))?;
    Ok(bytes)
}

/// Decode a value from CBOR bytes.
///
/// The input must contain exactly one encoded value.
///
/// # Errors
///
/// Returns `CodecError::DecodingFailed` if the bytes are not a valid
/// encoding of `T`, or `CodecError::TrailingBytes` if input remains.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(format!("{e:?}")))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.len(),
        });
    }
    Ok(value)
}

/// Trait for types that can be encoded to CBOR.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: Serialize> Encode for T {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl<T: DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
