pub mod intrinsics;
pub mod reflection;

mod ir;

pub use intrinsics::Intrinsic;
pub use ir::*;
