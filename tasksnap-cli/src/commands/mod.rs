//! CLI command implementations

mod config;
mod signal;
mod status;
mod stop;
mod watch;

pub use config::{config, ConfigArgs};
pub use signal::{signal, SignalArgs};
pub use status::status;
pub use stop::{stop, StopArgs};
pub use watch::{watch, WatchArgs};

use tasksnap_core::error::SnapError;

/// Print an error with its hint, if it has one
pub(crate) fn report(err: &SnapError) {
    eprintln!("Error: {}", err);
    if let Some(hint) = err.user_hint() {
        eprintln!("Hint:  {}", hint);
    }
}
