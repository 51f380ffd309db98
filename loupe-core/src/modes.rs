//! Display mode definitions.

use crate::compositor::ShaderUniforms;

/// Number of display modes the fragment program understands.
pub const MODE_COUNT: usize = 9;

/// A visual transform applied to the live frame.
///
/// The discriminant is the index passed to the fragment program. Index `0`
/// is always the unmodified picture; every other mode binarizes the frame
/// into a two-color high-contrast scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DisplayMode {
    /// Unmodified picture with a mild contrast stretch.
    #[default]
    Natural = 0,
    /// Blue and yellow binarization.
    BlueOnYellow = 1,
    /// Yellow and blue binarization.
    YellowOnBlue = 2,
    /// Black and white binarization.
    BlackOnWhite = 3,
    /// White and black binarization, inverse of `BlackOnWhite`.
    WhiteOnBlack = 4,
    /// Black and yellow binarization.
    BlackOnYellow = 5,
    /// Yellow and black binarization, inverse of `BlackOnYellow`.
    YellowOnBlack = 6,
    /// Black and green binarization.
    BlackOnGreen = 7,
    /// Green and black binarization, inverse of `BlackOnGreen`.
    GreenOnBlack = 8,
}

impl DisplayMode {
    /// All modes in index order.
    pub const ALL: [DisplayMode; MODE_COUNT] = [
        DisplayMode::Natural,
        DisplayMode::BlueOnYellow,
        DisplayMode::YellowOnBlue,
        DisplayMode::BlackOnWhite,
        DisplayMode::WhiteOnBlack,
        DisplayMode::BlackOnYellow,
        DisplayMode::YellowOnBlack,
        DisplayMode::BlackOnGreen,
        DisplayMode::GreenOnBlack,
    ];

    /// Index of this mode in `[0, MODE_COUNT)`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a mode by index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Whether this is the unmodified picture.
    pub fn is_natural(self) -> bool {
        self == DisplayMode::Natural
    }

    /// The mode `steps` positions away, wrapping around in both directions.
    pub fn cycled(self, steps: i32) -> Self {
        let next = (self.index() as i64 + steps as i64).rem_euclid(MODE_COUNT as i64);
        Self::ALL[next as usize]
    }

    /// Human-readable name shown in the mode overlay.
    pub fn name(self) -> &'static str {
        match self {
            DisplayMode::Natural => "Natural",
            DisplayMode::BlueOnYellow => "Blue on Yellow",
            DisplayMode::YellowOnBlue => "Yellow on Blue",
            DisplayMode::BlackOnWhite => "Black on White",
            DisplayMode::WhiteOnBlack => "White on Black",
            DisplayMode::BlackOnYellow => "Black on Yellow",
            DisplayMode::YellowOnBlack => "Yellow on Black",
            DisplayMode::BlackOnGreen => "Black on Green",
            DisplayMode::GreenOnBlack => "Green on Black",
        }
    }

    /// CPU reference of the fragment program for a single RGB sample.
    ///
    /// Software compositors use this directly; GPU compositors must produce
    /// the same colors. Channels are in `[0, 1]`.
    pub fn shade(self, rgb: [f32; 3], uniforms: &ShaderUniforms) -> [f32; 3] {
        let gain = uniforms.global_contrast.max(0.0);
        let [r, g, b] = rgb.map(|c| (c - 0.5) * gain + 0.5);

        let gray = r * 0.299 + g * 0.587 + b * 0.114;
        // contrast_a > contrast_b, so dark samples binarize towards 1.0
        let t = smoothstep(uniforms.contrast_a, uniforms.contrast_b, gray);
        let inv = 1.0 - t;

        match self {
            DisplayMode::Natural => {
                let pivot = uniforms.contrast_c;
                [r, g, b].map(|c| (c - pivot) * 1.5 + pivot)
            }
            DisplayMode::BlueOnYellow => [inv, inv, t],
            DisplayMode::YellowOnBlue => [t, t, inv],
            DisplayMode::BlackOnWhite => [t, t, t],
            DisplayMode::WhiteOnBlack => [inv, inv, inv],
            DisplayMode::BlackOnYellow => [t, t, 0.0],
            DisplayMode::YellowOnBlack => [inv, inv, 0.0],
            DisplayMode::BlackOnGreen => [0.0, t, 0.0],
            DisplayMode::GreenOnBlack => [0.0, inv, 0.0],
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// GLSL `smoothstep`, tolerant of `edge0 > edge1`.
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span == 0.0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
