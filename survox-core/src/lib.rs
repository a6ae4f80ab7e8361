pub mod config;
pub mod matcher;
pub mod question;
pub mod session;
pub mod voice;

// Keep the public surface small and intentional.
pub use config::*;
pub use matcher::*;
pub use question::*;
pub use session::*;
pub use voice::*;
