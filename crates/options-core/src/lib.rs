pub mod error;
pub mod time;
pub mod types;

pub use error::*;
pub use time::*;
pub use types::*;
