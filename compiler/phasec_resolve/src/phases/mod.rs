//! The built-in resolver of every phase.

mod annotations;
mod bind;
mod body;
mod imports;
mod status;
mod types;

pub use annotations::AnnotationArgumentsResolver;
pub use body::BodyResolver;
pub use imports::ImportsResolver;
pub use status::StatusResolver;
pub use types::TypesResolver;
