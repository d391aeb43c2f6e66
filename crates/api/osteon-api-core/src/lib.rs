//! osteon-api-core: animated value model and blend arithmetic (engine-agnostic)

pub mod blend;
pub mod error;
pub mod json;
pub mod property_path;
pub mod value;

pub use blend::MatrixBlend;
pub use error::ValueError;
pub use property_path::PropertyPath;
pub use value::{Value, ValueKind};
