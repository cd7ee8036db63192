//! Unit conversions between the recorder's native units and SI.

/// Standard gravity used by the accelerometer channels (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Miles per hour → metres per second.
pub const MPH_TO_MPS: f64 = 0.44704;

/// Feet → metres.
pub const FT_TO_M: f64 = 0.3048;

#[inline]
pub fn mph_to_mps(v: f64) -> f64 {
    v * MPH_TO_MPS
}

#[inline]
pub fn mps_to_mph(v: f64) -> f64 {
    v / MPH_TO_MPS
}

#[inline]
pub fn g_to_mps2(a: f64) -> f64 {
    a * GRAVITY
}

#[inline]
pub fn mps2_to_g(a: f64) -> f64 {
    a / GRAVITY
}

#[inline]
pub fn ft_to_m(d: f64) -> f64 {
    d * FT_TO_M
}

#[inline]
pub fn m_to_ft(d: f64) -> f64 {
    d / FT_TO_M
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn conversions_invert() {
        assert_abs_diff_eq!(mps_to_mph(mph_to_mps(37.0)), 37.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m_to_ft(ft_to_m(120.0)), 120.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mps2_to_g(g_to_mps2(0.3)), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn known_values() {
        assert_abs_diff_eq!(mph_to_mps(60.0), 26.8224, epsilon = 1e-9);
        assert_abs_diff_eq!(ft_to_m(10.0), 3.048, epsilon = 1e-12);
    }
}
