mod direction;
mod result;

pub use direction::*;
pub use result::*;
