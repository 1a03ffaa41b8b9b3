pub mod asset;
pub mod clock;
pub mod database;
pub mod locks;
pub mod metrics;
pub mod notifier;

pub use asset::PixelAsset;
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::{InMemoryOpenStore, OpenStore, SqliteOpenStore};
pub use locks::KeyedLocks;
pub use notifier::{
    open_message, DisabledNotifier, MockNotifier, Notifier, NotifierError, SlackNotifier,
};
