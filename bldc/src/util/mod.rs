pub mod bitfield;
pub mod spin_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeout {
    pub spins: u32,
}

/// Spins until `condition` holds or `limit` polls have been made. Returns the number of polls
/// that failed before the condition was observed.
pub fn spin_until(limit: u32, mut condition: impl FnMut() -> bool) -> Result<u32, WaitTimeout> {
    let mut spins = 0;
    while !condition() {
        if spins >= limit {
            return Err(WaitTimeout { spins });
        }
        spins += 1;
        core::hint::spin_loop();
    }
    Ok(spins)
}
