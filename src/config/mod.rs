pub mod settings;

pub use settings::{Secrets, Settings};
