//! CW (Morse code) engine: tone queue, sine-wave generator, character
//! sender, adaptive-timing receiver, iambic keyer and straight-key input,
//! composed behind a single owned [`engine::Engine`] value.

pub mod audio;
pub mod engine;
pub mod error;
pub mod generator;
pub mod iambic;
pub mod keystate;
pub mod queue;
pub mod receiver;
pub mod sender;
pub mod straight;
pub mod stream;
pub mod table;
pub mod timing;

pub use engine::Engine;
pub use error::{CwError, Result};
