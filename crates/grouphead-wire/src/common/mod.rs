mod codec;
mod error;
mod types;

pub(crate) use codec::*;
pub use error::*;
pub use types::*;
