use ndarray::{s, Array4, Array5, ArrayView4, Axis};
use num_traits::AsPrimitive;
use tracing::warn;

use crate::error::{MotionError, Result};

/// Geometry shared by every frame of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameShape {
    pub planes: usize,
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl FrameShape {
    /// Pixel count of a single plane.
    pub fn area(&self) -> usize {
        self.rows * self.cols
    }

    fn to_vec(self) -> Vec<usize> {
        vec![self.planes, self.rows, self.cols, self.channels]
    }
}

/// One cycle of frames, shape = (frames, planes, rows, cols, channels).
/// Missing samples are NaN.
#[derive(Clone, Debug)]
pub struct Sequence {
    pub data: Array5<f32>,
}

impl Sequence {
    pub fn new(data: Array5<f32>) -> Self {
        Self { data }
    }

    /// Build from (frames, planes, rows, cols) data without a channel axis.
    pub fn from_planes(data: Array4<f32>) -> Self {
        Self::new(data.insert_axis(Axis(4)))
    }

    /// Convert raw integer or float samples to f32.
    pub fn from_raw<T>(data: &Array5<T>) -> Self
    where
        T: AsPrimitive<f32>,
    {
        Self::new(data.mapv(|v| v.as_()))
    }

    pub fn num_frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn frame_shape(&self) -> FrameShape {
        let (_, planes, rows, cols, channels) = self.data.dim();
        FrameShape {
            planes,
            rows,
            cols,
            channels,
        }
    }

    /// View of a single frame: (planes, rows, cols, channels).
    pub fn frame(&self, index: usize) -> ArrayView4<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn frames(&self) -> impl Iterator<Item = ArrayView4<'_, f32>> {
        self.data.outer_iter()
    }

    /// Copy out the spatial region covered by `tile`.
    pub fn crop(&self, tile: &TileRect) -> Sequence {
        let view = self.data.slice(s![
            ..,
            ..,
            tile.row..tile.row + tile.rows,
            tile.col..tile.col + tile.cols,
            ..
        ]);
        Sequence::new(view.to_owned())
    }
}

/// Ordered collection of cycles with identical frame geometry.
#[derive(Clone, Debug)]
pub struct Dataset {
    sequences: Vec<Sequence>,
    frame_shape: FrameShape,
}

impl Dataset {
    pub fn new(sequences: Vec<Sequence>) -> Result<Self> {
        let first = sequences.first().ok_or(MotionError::EmptyDataset)?;
        let frame_shape = first.frame_shape();
        for seq in &sequences[1..] {
            let shape = seq.frame_shape();
            if shape != frame_shape {
                return Err(MotionError::ShapeMismatch {
                    expected: frame_shape.to_vec(),
                    actual: shape.to_vec(),
                });
            }
        }
        Ok(Self {
            sequences,
            frame_shape,
        })
    }

    pub fn frame_shape(&self) -> FrameShape {
        self.frame_shape
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn num_cycles(&self) -> usize {
        self.sequences.len()
    }

    pub fn frames_per_cycle(&self) -> Vec<usize> {
        self.sequences.iter().map(Sequence::num_frames).collect()
    }

    /// Crop every cycle to the same tile.
    pub fn crop(&self, tile: &TileRect) -> Result<Dataset> {
        if tile.rows == 0
            || tile.cols == 0
            || tile.row + tile.rows > self.frame_shape.rows
            || tile.col + tile.cols > self.frame_shape.cols
        {
            return Err(MotionError::InvalidConfig(format!(
                "tile {}x{} at ({}, {}) does not fit a {}x{} frame",
                tile.rows, tile.cols, tile.row, tile.col, self.frame_shape.rows, self.frame_shape.cols
            )));
        }
        Dataset::new(self.sequences.iter().map(|s| s.crop(tile)).collect())
    }
}

/// A rectangular spatial tile in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Split a frame into a `[rows, cols]` grid of equal tiles in row-major order.
///
/// Tile size uses integer division; remainder pixels along the bottom and
/// right edges are not covered by any tile.
pub fn partition_tiles(shape: &FrameShape, grid: [usize; 2]) -> Result<Vec<TileRect>> {
    let [grid_rows, grid_cols] = grid;
    if grid_rows == 0 || grid_cols == 0 {
        return Err(MotionError::InvalidConfig(format!(
            "partition grid {grid_rows}x{grid_cols} must be non-empty"
        )));
    }
    let tile_rows = shape.rows / grid_rows;
    let tile_cols = shape.cols / grid_cols;
    if tile_rows == 0 || tile_cols == 0 {
        return Err(MotionError::InvalidConfig(format!(
            "partition grid {grid_rows}x{grid_cols} is finer than the {}x{} frame",
            shape.rows, shape.cols
        )));
    }

    let dropped_rows = shape.rows - tile_rows * grid_rows;
    let dropped_cols = shape.cols - tile_cols * grid_cols;
    if dropped_rows > 0 || dropped_cols > 0 {
        warn!(
            dropped_rows,
            dropped_cols, "Partition grid does not divide the frame evenly; remainder is ignored"
        );
    }

    let mut tiles = Vec::with_capacity(grid_rows * grid_cols);
    for ty in 0..grid_rows {
        for tx in 0..grid_cols {
            tiles.push(TileRect {
                row: ty * tile_rows,
                col: tx * tile_cols,
                rows: tile_rows,
                cols: tile_cols,
            });
        }
    }
    Ok(tiles)
}
