//! Request handlers.

pub mod assets;
pub mod generation;
pub mod health;
pub mod jobs;
pub mod styles;

pub use assets::*;
pub use generation::*;
pub use health::*;
pub use jobs::*;
pub use styles::*;
