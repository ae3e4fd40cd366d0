//! Built-in music providers implemented against the core provider
//! interface: a local-filesystem provider and a direct-url provider.

pub mod builtin;
pub mod filesystem;

pub use builtin::BuiltinProvider;
pub use filesystem::FilesystemProvider;
