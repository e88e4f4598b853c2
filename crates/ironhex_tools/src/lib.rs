//! # Ironhex Development Tools
//!
//! Command-line tools for development:
//! - Unit and board data validators

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod validate;
