//! RESP codec.
//!
//! - `types`: the `RespValue` enum and its serialization
//! - `parser`: incremental parser for incoming frames and log records
//!
//! ```
//! use tidekv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//! assert!(!value.is_error());
//!
//! let reply = RespValue::bulk_string(Bytes::from("tide"));
//! assert_eq!(reply.serialize(), b"$4\r\ntide\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
