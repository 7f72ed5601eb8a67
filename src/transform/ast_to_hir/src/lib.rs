mod intrinsics;
mod typer;

pub use typer::type_check;
