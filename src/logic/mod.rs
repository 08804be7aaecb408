pub mod references;
pub mod validate;

pub use references::*;
pub use validate::*;
