use nalgebra::DMatrix;
use num_complex::Complex64;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

/// Discretization point a coefficient block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub kpoint: usize,
    pub spin: usize,
}

impl BlockKey {
    pub fn new(kpoint: usize, spin: usize) -> Self {
        BlockKey { kpoint, spin }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(k={}, s={})", self.kpoint, self.spin)
    }
}

/// Wave-function coefficients, one `basis × bands` matrix per block.
///
/// Arrays combined in one expression must share the same key set and block
/// shapes. Violating this panics, the same way nalgebra panics on mismatched
/// matrix dimensions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoefficientArray {
    blocks: BTreeMap<BlockKey, DMatrix<Complex64>>,
}

impl CoefficientArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: BlockKey, block: DMatrix<Complex64>) -> Option<DMatrix<Complex64>> {
        self.blocks.insert(key, block)
    }

    pub fn get(&self, key: &BlockKey) -> Option<&DMatrix<Complex64>> {
        self.blocks.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.blocks.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, BlockKey, DMatrix<Complex64>> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Array with the same keys and block shapes, filled with zeros.
    pub fn zeros_like(&self) -> Self {
        self.map_blocks(|_, block| DMatrix::zeros(block.nrows(), block.ncols()))
    }

    pub fn map_blocks<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&BlockKey, &DMatrix<Complex64>) -> DMatrix<Complex64>,
    {
        self.blocks.iter().map(|(key, block)| (*key, f(key, block))).collect()
    }

    pub fn try_map_blocks<E, F>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&BlockKey, &DMatrix<Complex64>) -> Result<DMatrix<Complex64>, E>,
    {
        self.blocks
            .iter()
            .map(|(key, block)| f(key, block).map(|out| (*key, out)))
            .collect()
    }

    /// Combines matching blocks of two arrays.
    pub fn zip_blocks<F>(&self, other: &Self, mut f: F) -> Self
    where
        F: FnMut(&DMatrix<Complex64>, &DMatrix<Complex64>) -> DMatrix<Complex64>,
    {
        self.assert_same_keys(other);
        self.blocks
            .iter()
            .zip(other.blocks.values())
            .map(|((key, a), b)| (*key, f(a, b)))
            .collect()
    }

    pub fn try_zip_blocks<E, F>(&self, other: &Self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&BlockKey, &DMatrix<Complex64>, &DMatrix<Complex64>) -> Result<DMatrix<Complex64>, E>,
    {
        self.assert_same_keys(other);
        self.blocks
            .iter()
            .zip(other.blocks.values())
            .map(|((key, a), b)| f(key, a, b).map(|out| (*key, out)))
            .collect()
    }

    /// Conjugate transpose of every block.
    pub fn adjoint(&self) -> Self {
        self.map_blocks(|_, block| block.adjoint())
    }

    /// Block-wise matrix product `self · other`.
    pub fn dot(&self, other: &Self) -> Self {
        self.zip_blocks(other, |a, b| a * b)
    }

    pub fn scale(&self, alpha: f64) -> Self {
        let alpha = Complex64::from(alpha);
        self.map_blocks(|_, block| block * alpha)
    }

    /// `self += alpha · other`
    pub fn add_scaled(&mut self, alpha: f64, other: &Self) {
        self.assert_same_keys(other);
        let alpha = Complex64::from(alpha);
        for (block, rhs) in self.blocks.values_mut().zip(other.blocks.values()) {
            *block += rhs * alpha;
        }
    }

    /// Square root of the summed squared Frobenius norms of all blocks.
    pub fn norm(&self) -> f64 {
        self.blocks
            .values()
            .map(|block| block.norm_squared())
            .sum::<f64>()
            .sqrt()
    }

    /// True when both arrays have the same keys and block shapes.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(other.blocks.iter())
                .all(|((ka, a), (kb, b))| ka == kb && a.shape() == b.shape())
    }

    fn assert_same_keys(&self, other: &Self) {
        assert!(
            self.blocks.keys().eq(other.blocks.keys()),
            "coefficient arrays have different block keys"
        );
    }
}

impl FromIterator<(BlockKey, DMatrix<Complex64>)> for CoefficientArray {
    fn from_iter<I: IntoIterator<Item = (BlockKey, DMatrix<Complex64>)>>(iter: I) -> Self {
        CoefficientArray {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CoefficientArray {
    type Item = (&'a BlockKey, &'a DMatrix<Complex64>);
    type IntoIter = btree_map::Iter<'a, BlockKey, DMatrix<Complex64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl Add for &CoefficientArray {
    type Output = CoefficientArray;

    fn add(self, rhs: Self) -> CoefficientArray {
        self.zip_blocks(rhs, |a, b| a + b)
    }
}

impl Sub for &CoefficientArray {
    type Output = CoefficientArray;

    fn sub(self, rhs: Self) -> CoefficientArray {
        self.zip_blocks(rhs, |a, b| a - b)
    }
}

impl Mul<f64> for &CoefficientArray {
    type Output = CoefficientArray;

    fn mul(self, rhs: f64) -> CoefficientArray {
        self.scale(rhs)
    }
}

impl<'a> Mul<&'a CoefficientArray> for f64 {
    type Output = CoefficientArray;

    fn mul(self, rhs: &'a CoefficientArray) -> CoefficientArray {
        rhs.scale(self)
    }
}

impl<'a> AddAssign<&'a CoefficientArray> for CoefficientArray {
    fn add_assign(&mut self, rhs: &'a CoefficientArray) {
        self.add_scaled(1.0, rhs);
    }
}
