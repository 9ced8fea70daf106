// Application layer - Use case interactors

pub mod compress_interactor;
pub mod container;
pub mod probe_interactor;

// Re-export interactors
pub use compress_interactor::CompressInteractor;
pub use container::{AppContainer, DefaultAppContainer};
pub use probe_interactor::{ProbeInteractor, ProbeReport};
