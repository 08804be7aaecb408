pub mod category;
pub mod common;
pub mod error;
pub mod meta;
pub mod record;

pub use category::*;
pub use common::*;
pub use error::*;
pub use meta::*;
pub use record::*;
