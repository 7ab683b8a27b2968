//! HTTP request handlers.

pub mod files;
pub mod generate;
pub mod health;
pub mod images;
pub mod presets;

pub use files::*;
pub use generate::*;
pub use health::*;
pub use images::*;
pub use presets::*;
