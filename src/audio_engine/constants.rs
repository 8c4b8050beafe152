//! Audio engine configuration constants and limits.

/// Sample rates the pipeline can be configured to, in Hz.
pub const SAMPLE_RATES: [u32; 6] = [8_000, 16_000, 32_000, 44_100, 48_000, 96_000];

/// Smallest configurable block size, in frames.
pub const BLOCK_SIZE_MIN: usize = 1 << 1;

/// Largest configurable block size, in frames.
pub const BLOCK_SIZE_MAX: usize = 1 << 12;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Number of blocks each source and consumer queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Run loop polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// How long the run loop waits on a live input queue before substituting silence.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// How long the run loop waits for space on a live output queue before dropping the block.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 100;

/// Fixed gain applied to the delay's wet/dry mix.
pub const DELAY_MAKEUP_GAIN: f32 = 1.4;

/// Saturate pre-filter corner frequencies in Hz.
pub const SATURATE_HIGH_PASS_HZ: f64 = 300.0;
pub const SATURATE_BAND_STOP_LOW_HZ: f64 = 2_200.0;
pub const SATURATE_BAND_STOP_HIGH_HZ: f64 = 2_700.0;
pub const SATURATE_LOW_PASS_HZ: f64 = 8_000.0;

/// Saturate pre-filter Butterworth orders.
pub const SATURATE_HIGH_PASS_ORDER: usize = 2;
pub const SATURATE_BAND_STOP_ORDER: usize = 4;
pub const SATURATE_LOW_PASS_ORDER: usize = 4;

/// Test tone defaults.
pub const TONE_DEFAULT_FREQUENCY_HZ: f64 = 440.0;
pub const TONE_DEFAULT_VOLUME_DB: f64 = -20.0;
pub const TONE_CHANNELS: usize = 2;

/// Returns true if `block_size` is a power of two within the configurable range.
pub fn is_valid_block_size(block_size: usize) -> bool {
    block_size.is_power_of_two() && (BLOCK_SIZE_MIN..=BLOCK_SIZE_MAX).contains(&block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_limits() {
        assert!(!is_valid_block_size(0));
        assert!(!is_valid_block_size(1));
        assert!(is_valid_block_size(2));
        assert!(is_valid_block_size(128));
        assert!(!is_valid_block_size(100));
        assert!(is_valid_block_size(4096));
        assert!(!is_valid_block_size(8192));
    }

    #[test]
    fn test_default_rate_is_selectable() {
        assert!(SAMPLE_RATES.contains(&DEFAULT_SAMPLE_RATE));
    }
}
