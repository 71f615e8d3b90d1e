// Infrastructure implementations for benchlift.

pub mod cargo_runner;
pub mod manifest;
pub mod serializer;
pub mod source_loader;
pub mod workspace;

pub use cargo_runner::CargoToolchain;
pub use source_loader::{Discovery, SourceLoader};
pub use workspace::ScratchWorkspace;
