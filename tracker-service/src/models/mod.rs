pub mod open_event;

pub use open_event::{NewOpenEvent, OpenEvent, UNKNOWN_EMAIL};
