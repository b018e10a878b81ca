//! # Almanac Codec
//!
//! Record values, index keys and CBOR encoding for Almanac.
//!
//! This crate provides:
//! - [`Value`], the dynamic field value stored in records
//! - [`Fields`] and [`Record`], the unit of storage
//! - [`KeyPart`] and [`IndexKey`], normalized index key components
//! - CBOR encoding for persisted store files
//! - A serde bridge so typed structs can be stored as records
//!
//! ## Usage
//!
//! ```
//! use almanac_codec::{from_cbor, to_cbor, Fields, Record, Value};
//!
//! let record = Record::new("e1", Fields::new().with("title", "Standup"));
//! let bytes = to_cbor(&record.clone().into_value()).unwrap();
//! let decoded = Record::from_value(from_cbor(&bytes).unwrap()).unwrap();
//! assert_eq!(decoded, record);
//! assert_eq!(decoded.get("title"), Some(&Value::from("Standup")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod key;
mod record;
mod value;

pub use cbor::{from_cbor, from_record, to_cbor, to_fields};
pub use error::{CodecError, CodecResult};
pub use key::{IndexKey, KeyPart};
pub use record::{Fields, Record, ID_FIELD};
pub use value::Value;
