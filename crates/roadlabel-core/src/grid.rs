use serde::{Deserialize, Serialize};

/// A 2D raster stored row-major. Every per-tile array in the pipeline
/// (mask, distance field, soft label, hard label) is one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    /// Row-major cell values; `data.len() == width * height`.
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
}

/// Road mask with values in {0, 1}.
pub type BinaryMask = Grid<u8>;
/// Euclidean distance (pixels) to the nearest road pixel.
pub type DistanceField = Grid<f32>;
/// Gaussian proximity label in [0, 1].
pub type SoftLabel = Grid<f32>;
/// Thresholded soft label with values in {0, 1}.
pub type HardLabel = Grid<u8>;

impl<T: Copy> Grid<T> {
    /// Create a grid filled with the given value.
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
        }
    }

    /// Wrap an existing row-major buffer. Returns None if the length does not
    /// match `width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == width * height).then_some(Self { data, width, height })
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: T) {
        self.data[row * self.width + col] = val;
    }

    /// (width, height) pair, the order images and TIFFs report dimensions in.
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Apply `f` to every cell, producing a new grid of the same shape.
    pub fn map<U, F>(&self, f: F) -> Grid<U>
    where
        F: Fn(T) -> U,
    {
        Grid {
            data: self.data.iter().map(|&v| f(v)).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

impl Grid<u8> {
    /// Number of nonzero cells.
    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

impl Grid<f32> {
    /// Quantise a [0, 1] field to 8-bit by truncating `v * 255`.
    pub fn to_u8_scaled(&self) -> Grid<u8> {
        self.map(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
    }
}
