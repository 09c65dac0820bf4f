//! Disposable automated-browser sessions with passive network capture.

pub mod capture;
pub mod session;

pub use capture::CaptureStore;
pub use session::{LaunchOptions, Session};
