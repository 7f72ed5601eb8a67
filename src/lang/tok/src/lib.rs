mod tokens;

pub use tokens::*;
