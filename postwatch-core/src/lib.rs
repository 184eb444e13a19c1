pub mod config;
pub mod error;
pub mod error_recovery;
pub mod error_utils;
pub mod filter;
pub mod handles;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_recovery::*;
pub use error_utils::*;
pub use filter::*;
pub use handles::*;
pub use traits::*;
pub use types::*;
