// ============================================================
// 2-D Sine/Cosine Position Embeddings
// ============================================================
// The transformer sees the image as an unordered bag of feature
// cells, so each cell gets a fixed embedding encoding where it
// sits in the image. Positions are cumulative counts of VALID
// (non-padded) cells, normalised per image to [0, 2π] — two
// images batched at different resolutions therefore span the
// same positional range.
//
// The embedding is a pure function of the padding mask, so it is
// computed on the host and uploaded once per forward pass. Half
// the channels encode the row coordinate, half the column, each
// half interleaving sine and cosine over a geometric frequency
// ladder (same shape as the 1-D encoding in Vaswani et al.).
//
// Reference: Carion et al. (2020), §3.1
//            Parmar et al. (2018) Image Transformer

use burn::prelude::*;

const EPS: f64 = 1e-6;

/// Host-side copy of a batch padding mask, `true` = padded.
/// Cheap to index and to resample to the backbone's output grid.
#[derive(Debug, Clone)]
pub struct MaskGrid {
    pub batch:  usize,
    pub height: usize,
    pub width:  usize,
    flags: Vec<bool>,
}

impl MaskGrid {
    pub fn new(batch: usize, height: usize, width: usize, flags: Vec<bool>) -> Self {
        debug_assert_eq!(flags.len(), batch * height * width);
        Self { batch, height, width, flags }
    }

    pub fn from_tensor<B: Backend>(mask: &Tensor<B, 3, Bool>) -> Self {
        let [batch, height, width] = mask.dims();
        let flags: Vec<i64> = mask
            .clone()
            .int()
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap_or_default();
        Self::new(batch, height, width, flags.iter().map(|&v| v != 0).collect())
    }

    pub fn at(&self, b: usize, y: usize, x: usize) -> bool {
        self.flags[(b * self.height + y) * self.width + x]
    }

    /// Nearest-neighbour resample to the feature grid the backbone
    /// produced: out(y, x) = in(⌊y·H/H'⌋, ⌊x·W/W'⌋).
    pub fn downsample(&self, height: usize, width: usize) -> MaskGrid {
        let mut flags = Vec::with_capacity(self.batch * height * width);
        for b in 0..self.batch {
            for y in 0..height {
                let sy = y * self.height / height;
                for x in 0..width {
                    let sx = x * self.width / width;
                    flags.push(self.at(b, sy, sx));
                }
            }
        }
        MaskGrid { batch: self.batch, height, width, flags }
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3, Bool> {
        let ints: Vec<i32> = self.flags.iter().map(|&padded| padded as i32).collect();
        Tensor::<B, 1, Int>::from_ints(ints.as_slice(), device)
            .reshape([self.batch, self.height, self.width])
            .equal_elem(1)
    }
}

#[derive(Config, Debug)]
pub struct SinePositionEmbeddingConfig {
    /// Channels per axis; the embedding has 2 × this many channels.
    pub num_pos_feats: usize,
    #[config(default = 10000.0)]
    pub temperature: f64,
    /// Normalised positions are stretched to [0, scale].
    #[config(default = "std::f64::consts::TAU")]
    pub scale: f64,
}

impl SinePositionEmbeddingConfig {
    pub fn init(&self) -> SinePositionEmbedding {
        SinePositionEmbedding {
            num_pos_feats: self.num_pos_feats,
            temperature:   self.temperature,
            scale:         self.scale,
        }
    }
}

/// Parameterless, so it is carried by the model as plain data
/// rather than as a Burn module.
#[derive(Debug, Clone)]
pub struct SinePositionEmbedding {
    pub num_pos_feats: usize,
    pub temperature:   f64,
    pub scale:         f64,
}

impl SinePositionEmbedding {
    /// Returns [batch, 2·num_pos_feats, height, width] with the row
    /// channels first, then the column channels.
    pub fn forward<B: Backend>(&self, grid: &MaskGrid, device: &B::Device) -> Tensor<B, 4> {
        let (batch, height, width) = (grid.batch, grid.height, grid.width);
        let channels = 2 * self.num_pos_feats;
        let plane = height * width;
        let mut buf = vec![0f32; batch * channels * plane];

        for b in 0..batch {
            // cumulative count of valid cells, down columns and along rows
            let mut y_embed = vec![0f64; plane];
            let mut x_embed = vec![0f64; plane];
            for y in 0..height {
                for x in 0..width {
                    let valid = if grid.at(b, y, x) { 0.0 } else { 1.0 };
                    y_embed[y * width + x] =
                        valid + if y > 0 { y_embed[(y - 1) * width + x] } else { 0.0 };
                    x_embed[y * width + x] =
                        valid + if x > 0 { x_embed[y * width + x - 1] } else { 0.0 };
                }
            }
            for y in 0..height {
                for x in 0..width {
                    let cell = y * width + x;
                    // normalise by the per-column / per-row totals
                    let yn = y_embed[cell] / (y_embed[(height - 1) * width + x] + EPS) * self.scale;
                    let xn = x_embed[cell] / (x_embed[y * width + width - 1] + EPS) * self.scale;
                    for i in 0..self.num_pos_feats {
                        let dim_t = self
                            .temperature
                            .powf(2.0 * (i / 2) as f64 / self.num_pos_feats as f64);
                        let (py, px) = if i % 2 == 0 {
                            ((yn / dim_t).sin(), (xn / dim_t).sin())
                        } else {
                            ((yn / dim_t).cos(), (xn / dim_t).cos())
                        };
                        buf[(b * channels + i) * plane + cell] = py as f32;
                        buf[(b * channels + self.num_pos_feats + i) * plane + cell] = px as f32;
                    }
                }
            }
        }

        Tensor::<B, 1>::from_floats(buf.as_slice(), device).reshape([
            batch, channels, height, width,
        ])
    }
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn all_valid(batch: usize, height: usize, width: usize) -> MaskGrid {
        MaskGrid::new(batch, height, width, vec![false; batch * height * width])
    }

    /// With 2 features per axis both interleaved channels share
    /// dim_t = 1, so a 2×2 grid lands on sin/cos of π and 2π.
    #[test]
    fn test_known_values_on_full_grid() {
        let embedding = SinePositionEmbeddingConfig::new(2).init();
        let pos = embedding.forward::<TB>(&all_valid(1, 2, 2), &device());

        let expected = TensorData::from([[
            [[0.0f32, 0.0], [0.0, 0.0]],   // sin(y): π and 2π
            [[-1.0, -1.0], [1.0, 1.0]],    // cos(y)
            [[0.0, 0.0], [0.0, 0.0]],      // sin(x)
            [[-1.0, 1.0], [-1.0, 1.0]],    // cos(x)
        ]]);
        pos.into_data().assert_approx_eq(&expected, 3);
    }

    /// Padding shrinks the valid extent, so the rightmost VALID cell
    /// must still land on the full 2π phase.
    #[test]
    fn test_padded_column_rescales_x_axis() {
        let embedding = SinePositionEmbeddingConfig::new(2).init();
        let grid = MaskGrid::new(1, 2, 2, vec![false, true, false, true]);
        let pos = embedding.forward::<TB>(&grid, &device());

        // channel 3 = cos(x); column 0 is now the last valid cell → cos(2π) = 1
        let cos_x = pos
            .slice([0..1, 3..4, 0..1, 0..1])
            .into_scalar();
        assert!((cos_x - 1.0).abs() < 1e-3, "got {cos_x}");
    }

    #[test]
    fn test_downsample_picks_nearest_cell() {
        // right half padded
        let mut flags = vec![false; 16];
        for y in 0..4 {
            for x in 2..4 {
                flags[y * 4 + x] = true;
            }
        }
        let coarse = MaskGrid::new(1, 4, 4, flags).downsample(2, 2);
        assert!(!coarse.at(0, 0, 0));
        assert!(coarse.at(0, 0, 1));
        assert!(!coarse.at(0, 1, 0));
        assert!(coarse.at(0, 1, 1));
    }

    #[test]
    fn test_tensor_roundtrip_preserves_flags() {
        let grid = MaskGrid::new(2, 2, 3, vec![
            false, false, true, false, true, true,
            false, false, false, false, false, true,
        ]);
        let roundtrip = MaskGrid::from_tensor(&grid.to_tensor::<TB>(&device()));
        for b in 0..2 {
            for y in 0..2 {
                for x in 0..3 {
                    assert_eq!(grid.at(b, y, x), roundtrip.at(b, y, x));
                }
            }
        }
    }
}
