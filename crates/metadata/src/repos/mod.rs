//! Repository traits for metadata operations.

pub mod generations;
pub mod style_presets;

pub use generations::GenerationRepo;
pub use style_presets::StylePresetRepo;
