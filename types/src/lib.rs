//! Fixed-width unsigned integer types for the cinder work server.
//!
//! `U256` carries root hashes, `U128` carries difficulties and work nonces.
//! Both parse and format the hex forms clients put on the wire.

pub mod error;
pub mod uint128;
pub mod uint256;

pub use error::HexError;
pub use uint128::U128;
pub use uint256::U256;
