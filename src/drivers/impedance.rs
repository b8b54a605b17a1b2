//! Impedance conversions for the two EIS front ends.
//!
//! 3-electrode: the firmware reports the rectangular form `re;im`.
//! - |Z| = sqrt(re² + im²)
//! - phase = atan2(-im, re), in degrees
//!
//! 2-electrode: the firmware reports the polar form `|Z|;phase`.
//! - Re(Z) = |Z| cos(phase)
//! - Im(Z) = -|Z| sin(phase)
//! - every quantity is rounded to 3 decimals, matching the device display.
//!
//! An `inf` reading means the cell is open; it is mapped to a fixed ceiling
//! so the point still plots.
use crate::smoothing::round3;

/// Ceiling reported for an open 3-electrode cell (ohms).
pub const OPEN_CIRCUIT_3E_OHMS: f64 = 6.0e8;
/// Ceiling reported for an open 2-electrode cell (ohms).
pub const OPEN_CIRCUIT_2E_OHMS: f64 = 6.0e7;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpedancePoint {
    pub frequency_hz: f64,
    pub magnitude_ohms: f64,
    pub phase_deg: f64,
    pub real_ohms: f64,
    pub imag_ohms: f64,
}

/// Impedance from the real and imaginary parts.
pub fn from_rectangular(frequency_hz: f64, real: f64, imag: f64) -> ImpedancePoint {
    ImpedancePoint {
        frequency_hz,
        magnitude_ohms: real.hypot(imag),
        phase_deg: (-imag).atan2(real).to_degrees(),
        real_ohms: real,
        imag_ohms: imag,
    }
}

/// Impedance from magnitude and phase, rounded like the 2-electrode display.
pub fn from_polar(frequency_hz: f64, magnitude: f64, phase_deg: f64) -> ImpedancePoint {
    let rad = phase_deg.to_radians();
    ImpedancePoint {
        frequency_hz: round3(frequency_hz),
        magnitude_ohms: round3(magnitude),
        phase_deg: round3(phase_deg),
        real_ohms: round3(magnitude * rad.cos()),
        imag_ohms: round3(-magnitude * rad.sin()),
    }
}

pub fn open_circuit_3e(frequency_hz: f64) -> ImpedancePoint {
    ImpedancePoint {
        frequency_hz,
        magnitude_ohms: OPEN_CIRCUIT_3E_OHMS,
        phase_deg: 0.0,
        real_ohms: OPEN_CIRCUIT_3E_OHMS,
        imag_ohms: 0.0,
    }
}

pub fn open_circuit_2e(frequency_hz: f64) -> ImpedancePoint {
    from_polar(frequency_hz, OPEN_CIRCUIT_2E_OHMS, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangular_magnitude_and_phase() {
        let z = from_rectangular(1000.0, 3.0, -4.0);
        assert!((z.magnitude_ohms - 5.0).abs() < 1e-12);
        // capacitive: negative imaginary part gives a positive displayed phase
        assert!((z.phase_deg - 53.130_102_354_155_98).abs() < 1e-9);
    }

    #[test]
    fn polar_components_are_rounded() {
        let z = from_polar(10.0, 100.0, 30.0);
        assert_eq!(z.real_ohms, 86.603);
        assert_eq!(z.imag_ohms, -50.0);
    }

    #[test]
    fn open_circuit_ceilings() {
        assert_eq!(open_circuit_3e(5.0).magnitude_ohms, 6.0e8);
        assert_eq!(open_circuit_3e(5.0).real_ohms, 6.0e8);
        let z = open_circuit_2e(5.0);
        assert_eq!(z.magnitude_ohms, 6.0e7);
        assert_eq!(z.real_ohms, 6.0e7);
        assert_eq!(z.imag_ohms, 0.0);
    }
}
