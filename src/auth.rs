//! Token, claim, and identity models.

pub mod claims;
pub mod identity;
pub mod token;

pub use claims::*;
pub use identity::*;
pub use token::*;
