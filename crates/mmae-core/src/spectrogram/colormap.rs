use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    #[default]
    Viridis,
    Grayscale,
}

const VIRIDIS: [[u8; 3]; 17] = [
    [68, 1, 84],
    [72, 24, 106],
    [71, 45, 123],
    [66, 64, 134],
    [59, 82, 139],
    [51, 99, 141],
    [44, 114, 142],
    [38, 130, 142],
    [33, 145, 140],
    [31, 160, 136],
    [40, 174, 128],
    [63, 188, 115],
    [94, 201, 98],
    [132, 212, 75],
    [173, 220, 48],
    [216, 226, 25],
    [253, 231, 37],
];

impl Colormap {
    /// Maps a normalized value to RGB. Out-of-range and NaN inputs clamp.
    #[must_use]
    pub fn rgb(self, value: f32) -> [u8; 3] {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        match self {
            Self::Grayscale => {
                let level = (value * 255.0).round() as u8;
                [level, level, level]
            }
            Self::Viridis => interpolate(&VIRIDIS, value),
        }
    }
}

fn interpolate(anchors: &[[u8; 3]], value: f32) -> [u8; 3] {
    let position = value * (anchors.len() - 1) as f32;
    let lower = (position.floor() as usize).min(anchors.len() - 1);
    let upper = (lower + 1).min(anchors.len() - 1);
    let fraction = position - lower as f32;
    let mut rgb = [0_u8; 3];
    for (channel, out) in rgb.iter_mut().enumerate() {
        let a = f32::from(anchors[lower][channel]);
        let b = f32::from(anchors[upper][channel]);
        *out = (a + (b - a) * fraction).round() as u8;
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viridis_endpoints_match_anchors() {
        assert_eq!(Colormap::Viridis.rgb(0.0), [68, 1, 84]);
        assert_eq!(Colormap::Viridis.rgb(1.0), [253, 231, 37]);
        assert_eq!(Colormap::Viridis.rgb(0.5), [33, 145, 140]);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(Colormap::Viridis.rgb(-3.0), Colormap::Viridis.rgb(0.0));
        assert_eq!(Colormap::Grayscale.rgb(7.0), [255, 255, 255]);
        assert_eq!(Colormap::Grayscale.rgb(f32::NAN), [0, 0, 0]);
    }
}
