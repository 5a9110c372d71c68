//! Process resource sampling.

use std::sync::{Mutex, OnceLock};

use sysinfo::{Pid, System};

static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();

/// Resident memory of this process in megabytes, or 0 when the platform
/// does not report it.
pub fn memory_usage_mb() -> f64 {
    let mut sys = SYSTEM
        .get_or_init(|| Mutex::new(System::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    sys.refresh_all();

    let pid = Pid::from_u32(std::process::id());
    sys.process(pid)
        .map_or(0.0, |process| process.memory() as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_is_non_negative() {
        assert!(memory_usage_mb() >= 0.0);
    }
}
