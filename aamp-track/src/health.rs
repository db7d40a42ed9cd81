//! Buffer health classification (§4.4): a periodic monitor task reads
//! `FragmentBuffer` counters and classifies the current state so the
//! host can be told when playback is at risk of stalling.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHealth {
    /// At least one fragment cached, or enough buffered-ahead duration
    /// that a stall isn't imminent.
    Green,
    /// Buffer is non-empty but thin; a stall is plausible if the network
    /// doesn't keep up.
    Yellow,
    /// Nothing buffered ahead of the injection point.
    Red,
}

const YELLOW_FLOOR_SEC: f64 = 4.0;

#[must_use]
pub fn classify(cached_count: usize, buffered_ahead_sec: f64) -> BufferHealth {
    if cached_count >= 1 || buffered_ahead_sec >= YELLOW_FLOOR_SEC {
        BufferHealth::Green
    } else if buffered_ahead_sec > 0.0 {
        BufferHealth::Yellow
    } else {
        BufferHealth::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_cached_fragment_is_always_green() {
        assert_eq!(classify(1, 0.0), BufferHealth::Green);
    }

    #[test]
    fn thin_but_positive_buffer_is_yellow() {
        assert_eq!(classify(0, 1.5), BufferHealth::Yellow);
    }

    #[test]
    fn four_seconds_buffered_ahead_is_green_even_with_nothing_cached() {
        assert_eq!(classify(0, 4.0), BufferHealth::Green);
    }

    #[test]
    fn nothing_cached_and_nothing_buffered_is_red() {
        assert_eq!(classify(0, 0.0), BufferHealth::Red);
    }
}
