//! # Note Catalog Module
//!
//! The fixed table of practice targets: the diatonic notes of two octaves,
//! C3 to B4, in equal temperament with A4 = 440 Hz. Frequencies are rounded
//! to hundredths of a hertz, the precision the targets are displayed with.
//!
//! ## Features
//! - 14-entry catalog computed once at first use
//! - Uniform random target selection (repeats of the previous draw allowed)
//! - Exact lookup by note name
//! - Nearest-note and cent deviation helpers for the readout

use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::BTreeMap;

/// A note the singer is asked to match.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTarget {
    /// Scientific pitch name (e.g., "C3", "A4")
    pub name: String,
    /// Target frequency in Hz
    pub frequency_hz: f32,
}

/// Number of entries in the catalog.
pub const CATALOG_LEN: usize = 14;

/// Every note in the catalog, lowest first.
///
/// Each entry is built from its distance in semitones from A4, using
/// f = 440 * 2^(n/12).
static CATALOG: Lazy<Vec<NoteTarget>> = Lazy::new(|| {
    // Diatonic letters with their semitone offset above C.
    const DIATONIC: [(&str, i32); 7] = [
        ("C", 0),
        ("D", 2),
        ("E", 4),
        ("F", 5),
        ("G", 7),
        ("A", 9),
        ("B", 11),
    ];
    let mut notes = Vec::with_capacity(CATALOG_LEN);

    for octave in 3..=4 {
        for (letter, offset) in DIATONIC {
            // A4 sits 9 semitones above C4.
            let semitones_from_a4 = (octave - 4) * 12 + offset - 9;
            let exact = 440.0 * 2.0_f64.powf(semitones_from_a4 as f64 / 12.0);
            let frequency_hz = ((exact * 100.0).round() / 100.0) as f32;
            notes.push(NoteTarget {
                name: format!("{}{}", letter, octave),
                frequency_hz,
            });
        }
    }
    notes
});

/// Name to catalog index.
static NOTE_MAP: Lazy<BTreeMap<String, usize>> = Lazy::new(|| {
    CATALOG
        .iter()
        .enumerate()
        .map(|(i, note)| (note.name.clone(), i))
        .collect()
});

/// The whole catalog, lowest note first.
pub fn catalog() -> &'static [NoteTarget] {
    &CATALOG
}

/// Draws a target uniformly from the catalog using the thread-local RNG.
pub fn random_target() -> &'static NoteTarget {
    random_target_with(&mut rand::thread_rng())
}

/// Draws a target uniformly from the catalog using the given RNG.
///
/// There is no exclusion rule: the previous target is as likely as any other.
pub fn random_target_with<R: Rng + ?Sized>(rng: &mut R) -> &'static NoteTarget {
    &CATALOG[rng.gen_range(0..CATALOG.len())]
}

/// Exact, case-sensitive lookup by note name.
pub fn target_for_name(name: &str) -> Option<&'static NoteTarget> {
    NOTE_MAP.get(name).map(|&i| &CATALOG[i])
}

/// Finds the catalog note closest to a frequency.
pub fn nearest_note(freq: f32) -> &'static NoteTarget {
    CATALOG
        .iter()
        .min_by(|a, b| {
            let diff_a = (a.frequency_hz - freq).abs();
            let diff_b = (b.frequency_hz - freq).abs();
            diff_a.total_cmp(&diff_b)
        })
        .unwrap_or(&CATALOG[0])
}

/// Deviation of `freq` from `target_freq` in cents (positive = sharp).
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
