//! # graphrelay-mime
//!
//! MIME parsing for messages received over SMTP.
//!
//! ## Features
//!
//! - **Message parsing**: Header block plus a recursive multipart tree
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words, RFC 2231 parameters
//! - **Charsets**: Conversion of legacy charsets (windows-1251, ISO-8859-*, KOI8-R) to UTF-8
//! - **Addresses**: Lenient `To`/`Cc` address list parsing
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_mime::Message;
//!
//! let message = Message::parse(raw_bytes)?;
//! println!("Subject: {}", message.subject().unwrap_or_default());
//!
//! for part in message.leaves() {
//!     if !part.is_inline() {
//!         println!("attachment: {:?}", part.filename());
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;

pub mod charset;
pub mod encoding;

pub use address::{Mailbox, parse_address_list};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Disposition, Message, Part, TransferEncoding, split_header_body};
