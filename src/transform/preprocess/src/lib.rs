mod condition_parser;
mod preprocess;

pub use preprocess::{
    preprocess, DirectiveHandler, ExtensionBehavior, NullDirectiveHandler, PreprocessedText,
};
