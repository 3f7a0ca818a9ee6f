//! Clock access.
//!
//! Every timestamp in the system is Unix epoch milliseconds as i64. The
//! periodic passes and pure helpers all take an explicit `now_ms` so
//! tests drive synthetic clocks; only the task loops and send paths call
//! this.

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_reasonable() {
        // After 2023-01-01 in ms.
        assert!(now_ms() > 1_672_531_200_000);
    }
}
