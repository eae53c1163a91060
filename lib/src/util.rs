mod arc_id;
mod offset_vec;

pub use arc_id::*;
pub use offset_vec::*;
