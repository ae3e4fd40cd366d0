//! Provider system.
//!
//! Source providers (streaming services, media servers, local files) plug
//! in behind a capability-scoped interface. The registry tracks configured
//! instances and dispatches lookups; callers check capabilities before
//! invoking — a missing capability silently skips the provider rather than
//! failing the operation.

pub mod capability;
pub mod registry;
pub mod throttle;
pub mod traits;

pub use capability::ProviderCapability;
pub use registry::ProviderRegistry;
pub use throttle::{with_provider_policy, Throttler, PROVIDER_CALL_TIMEOUT};
pub use traits::{empty_stream, ImageResolution, MusicProvider, PlayerProvider};
