/// Default relative distance from target at which a limit order is submitted
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// Whether `current_price` is close enough to `target_price` to place a limit order.
///
/// True iff `|current - target| / target <= tolerance`. `target_price` must be
/// positive; plans reject anything else before trading starts.
pub fn should_submit(current_price: f64, target_price: f64, tolerance: f64) -> bool {
    // Multiplied out so band edges like 66500 / 70000 don't lose to rounding
    (current_price - target_price).abs() <= tolerance * target_price
}

/// Relative distance from target, for logging
pub fn distance_pct(current_price: f64, target_price: f64) -> f64 {
    (current_price - target_price).abs() / target_price * 100.0
}
