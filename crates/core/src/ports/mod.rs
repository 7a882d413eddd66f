mod content;
mod handler;
mod source;
mod store;
mod tokens;

pub use content::*;
pub use handler::*;
pub use source::*;
pub use store::*;
pub use tokens::*;
