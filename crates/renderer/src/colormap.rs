//! Colour maps, baked into one RGBA8 texture with a row per map.

pub const COLOR_MAP_WIDTH: u32 = 256;

/// A colour map given as evenly spaced sRGB stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMap {
    pub name: &'static str,
    stops: &'static [[u8; 3]],
}

impl ColorMap {
    /// Colour at `position` in `[0, 1]`, interpolated linearly between stops.
    pub fn sample(&self, position: f32) -> [u8; 3] {
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        let last = self.stops.len() - 1;
        let scaled = position * last as f32;
        let lower = (scaled.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let fraction = scaled - lower as f32;
        let mix = |a: u8, b: u8| -> u8 {
            (f32::from(a) + (f32::from(b) - f32::from(a)) * fraction).round() as u8
        };
        let (a, b) = (self.stops[lower], self.stops[upper]);
        [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
    }
}

pub const COLOR_MAPS: &[ColorMap] = &[
    ColorMap {
        name: "gray",
        stops: &[[0, 0, 0], [255, 255, 255]],
    },
    ColorMap {
        name: "viridis",
        stops: &[
            [0x44, 0x01, 0x54],
            [0x48, 0x28, 0x78],
            [0x3e, 0x49, 0x89],
            [0x31, 0x68, 0x8e],
            [0x26, 0x82, 0x8e],
            [0x1f, 0x9e, 0x89],
            [0x35, 0xb7, 0x79],
            [0x6e, 0xce, 0x58],
            [0xb5, 0xde, 0x2b],
            [0xfd, 0xe7, 0x25],
        ],
    },
    ColorMap {
        name: "inferno",
        stops: &[
            [0x00, 0x00, 0x04],
            [0x1b, 0x0c, 0x41],
            [0x4a, 0x0c, 0x6b],
            [0x78, 0x1c, 0x6d],
            [0xa5, 0x2c, 0x60],
            [0xcf, 0x44, 0x46],
            [0xed, 0x69, 0x25],
            [0xfb, 0x9b, 0x06],
            [0xf7, 0xd1, 0x3d],
            [0xfc, 0xff, 0xa4],
        ],
    },
    ColorMap {
        name: "magma",
        stops: &[
            [0x00, 0x00, 0x04],
            [0x18, 0x0f, 0x3d],
            [0x44, 0x0f, 0x76],
            [0x72, 0x1f, 0x81],
            [0x9e, 0x2f, 0x7f],
            [0xcd, 0x40, 0x71],
            [0xf1, 0x60, 0x5d],
            [0xfd, 0x96, 0x68],
            [0xfe, 0xca, 0x8d],
            [0xfc, 0xfd, 0xbf],
        ],
    },
    ColorMap {
        name: "hot",
        stops: &[[0, 0, 0], [255, 0, 0], [255, 255, 0], [255, 255, 255]],
    },
    ColorMap {
        name: "cool",
        stops: &[[0, 255, 255], [255, 0, 255]],
    },
    ColorMap {
        name: "jet",
        stops: &[
            [0, 0, 128],
            [0, 0, 255],
            [0, 255, 255],
            [255, 255, 0],
            [255, 0, 0],
            [128, 0, 0],
        ],
    },
];

pub fn color_map_index(name: &str) -> Option<u32> {
    COLOR_MAPS
        .iter()
        .position(|map| map.name.eq_ignore_ascii_case(name))
        .map(|index| index as u32)
}

/// RGBA8 texels of every map, `COLOR_MAP_WIDTH` per row, rows in `COLOR_MAPS` order.
pub fn color_map_table() -> Vec<u8> {
    let mut texels = Vec::with_capacity(COLOR_MAPS.len() * COLOR_MAP_WIDTH as usize * 4);
    for map in COLOR_MAPS {
        for column in 0..COLOR_MAP_WIDTH {
            let [r, g, b] = map.sample(column as f32 / (COLOR_MAP_WIDTH - 1) as f32);
            texels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    texels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_row_per_map() {
        let table = color_map_table();
        assert_eq!(table.len(), COLOR_MAPS.len() * 256 * 4);
        let gray_row = &table[..256 * 4];
        assert_eq!(&gray_row[..4], &[0, 0, 0, 255]);
        assert_eq!(&gray_row[255 * 4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn sampling_interpolates_and_clamps() {
        let hot = COLOR_MAPS[color_map_index("hot").expect("hot") as usize];
        assert_eq!(hot.sample(0.0), [0, 0, 0]);
        assert_eq!(hot.sample(0.5), [255, 128, 0]);
        assert_eq!(hot.sample(2.0), [255, 255, 255]);
        assert_eq!(hot.sample(f32::NAN), [0, 0, 0]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(color_map_index("Viridis"), Some(1));
        assert_eq!(color_map_index("unknown"), None);
    }
}
