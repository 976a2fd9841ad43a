pub mod pe;

// Export the main functionality
pub use pe::{PeError, PeHeaders};
