//! Process-wide panic trap.

use std::panic;
use std::sync::Once;

static INSTALL: Once = Once::new();

/// Routes panics through `tracing` before the previous hook runs.
///
/// Installs at most once per process; returns `true` on the call that
/// installed it.
pub fn install_panic_hook() -> bool {
    let mut installed = false;
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            let payload = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(location = %location, "Unhandled panic: {payload}");
            previous(info);
        }));
        installed = true;
    });
    installed
}

/// Whether the trap has been installed.
pub fn is_installed() -> bool {
    INSTALL.is_completed()
}
