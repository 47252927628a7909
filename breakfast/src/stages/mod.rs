//! The two stages of a breakfast request.
//!
//! [`flip_pancakes`] runs to completion in the caller's task.
//! [`syrup_pancakes`] returns a [`PancakeStream`] immediately and produces
//! into it from a spawned task.

mod flip;
mod stream;
mod syrup;

pub use flip::{flip_pancakes, FLIP_EVENT};
pub use stream::PancakeStream;
pub use syrup::{spawn_syrup_station, syrup_pancakes, ServePolicy, SYRUP_EVENT};
