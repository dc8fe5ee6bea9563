//! # Deviation Meter
//!
//! A text meter showing how far the sung pitch is from the target, with the
//! tolerance band marked so the singer can see how much room is left.
//!
//! ```text
//! [-----|-----+--o--|-----]
//! ```
//! `|` marks the band edges, `+` the target and `o` the current reading.

/// Number of character cells between the meter brackets.
const METER_WIDTH: usize = 41;

/// Text deviation meter for one reading.
pub struct DeviationMeter {
    /// Current deviation in Hz (None if there is no reading)
    deviation_hz: Option<f32>,
    /// Tolerance band half-width in Hz
    tolerance_hz: f32,
}

impl DeviationMeter {
    pub fn new(deviation_hz: Option<f32>, tolerance_hz: f32) -> Self {
        Self {
            deviation_hz,
            tolerance_hz,
        }
    }

    /// The meter spans twice the tolerance band on each side.
    fn range(&self) -> f32 {
        2.0 * self.tolerance_hz
    }

    fn cell_for(&self, deviation: f32) -> usize {
        let range = self.range();
        let clamped = deviation.clamp(-range, range);
        let position = (clamped + range) / (2.0 * range) * (METER_WIDTH - 1) as f32;
        position.round() as usize
    }

    pub fn render(&self) -> String {
        let mut cells = vec!['-'; METER_WIDTH];
        cells[self.cell_for(-self.tolerance_hz)] = '|';
        cells[self.cell_for(self.tolerance_hz)] = '|';
        cells[METER_WIDTH / 2] = '+';

        if let Some(deviation) = self.deviation_hz {
            let needle = if deviation.abs() <= self.tolerance_hz {
                'o'
            } else if deviation > 0.0 {
                '>'
            } else {
                '<'
            };
            cells[self.cell_for(deviation)] = needle;
        }

        let mut meter = String::with_capacity(METER_WIDTH + 2);
        meter.push('[');
        meter.extend(cells);
        meter.push(']');
        meter
    }
}
