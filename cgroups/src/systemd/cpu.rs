const MICROSECS_PER_SEC: u64 = 1_000_000;
/// systemd only accepts the quota in steps of 10ms per second
const QUOTA_GRANULARITY: u64 = 10_000;

/// Converts a CFS quota/period pair into systemd's `CPUQuotaPerSecUSec`, the
/// microseconds of cpu time granted per wall-clock second. A quota <= 0 means no limit
/// and yields `u64::MAX`, systemd's infinity.
pub fn quota_per_sec_usec(quota: i64, period: u64) -> u64 {
    if quota <= 0 || period == 0 {
        return u64::MAX;
    }

    let raw = (quota as u64).saturating_mul(MICROSECS_PER_SEC) / period;
    match raw % QUOTA_GRANULARITY {
        0 => raw,
        rem => raw.saturating_add(QUOTA_GRANULARITY - rem),
    }
}
