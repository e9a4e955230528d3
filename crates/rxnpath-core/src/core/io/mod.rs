//! Reading and writing coordinate files.

pub mod traits;
pub mod xyz;
