pub mod item;
pub mod media;
pub mod metadata;
pub mod pagination;
pub mod player;
pub mod queue;
pub mod stream;

pub use item::*;
pub use media::*;
pub use metadata::*;
pub use pagination::*;
pub use player::*;
pub use queue::*;
pub use stream::*;
