//! The [`MeshBlockPack`] geometry and per-block field storage.

use torus_core::{ParameterError, ParameterInput};

/// Geometry of a pack of uniform 1-D mesh blocks with periodic global
/// topology.
///
/// The pack is opaque to the scheduler: operators receive it through
/// their owning module and the scheduler only orders the operators.
/// Block `m` covers global cells `[m*nx, (m+1)*nx)`; each block pads
/// `ng` ghost cells on both sides, filled by halo exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshBlockPack {
    /// Number of mesh blocks in this pack.
    pub nmb: usize,
    /// Interior cells per block.
    pub nx: usize,
    /// Ghost cells on each side of a block.
    pub ng: usize,
    /// Cell width (uniform).
    pub dx: f64,
}

impl MeshBlockPack {
    /// Build a pack from the `<mesh>` block of the parameter input.
    ///
    /// Keys: `nmb` (default 4), `nx` (default 16), `ng` (default 2),
    /// `x_length` (domain length, default 1.0).
    pub fn from_params(pin: &ParameterInput) -> Result<Self, ParameterError> {
        let nmb = pin.get_int_or("mesh", "nmb", 4)? as usize;
        let nx = pin.get_int_or("mesh", "nx", 16)? as usize;
        let ng = pin.get_int_or("mesh", "ng", 2)? as usize;
        let length = pin.get_real_or("mesh", "x_length", 1.0)?;
        Ok(Self {
            nmb,
            nx,
            ng,
            dx: length / (nmb * nx) as f64,
        })
    }

    /// Total cells per block including ghosts.
    pub fn ncells(&self) -> usize {
        self.nx + 2 * self.ng
    }

    /// Index of the first interior cell.
    pub fn is(&self) -> usize {
        self.ng
    }

    /// Index of the last interior cell.
    pub fn ie(&self) -> usize {
        self.ng + self.nx - 1
    }

    /// Physical coordinate of the center of interior cell `i` in block `m`.
    pub fn cell_center(&self, m: usize, i: usize) -> f64 {
        let global = m * self.nx + (i - self.ng);
        (global as f64 + 0.5) * self.dx
    }

    /// Right neighbor of block `m` under periodic topology.
    pub fn right_of(&self, m: usize) -> usize {
        (m + 1) % self.nmb
    }

    /// Left neighbor of block `m` under periodic topology.
    pub fn left_of(&self, m: usize) -> usize {
        (m + self.nmb - 1) % self.nmb
    }
}

/// A cell-centered scalar field over every block of a pack, ghosts
/// included.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockField {
    data: Vec<Vec<f64>>,
}

impl BlockField {
    /// Zero-initialized field shaped for `pack`.
    pub fn new(pack: &MeshBlockPack) -> Self {
        Self {
            data: vec![vec![0.0; pack.ncells()]; pack.nmb],
        }
    }

    /// Read a block's cells (ghosts included).
    pub fn block(&self, m: usize) -> &[f64] {
        &self.data[m]
    }

    /// Mutate a block's cells (ghosts included).
    pub fn block_mut(&mut self, m: usize) -> &mut [f64] {
        &mut self.data[m]
    }

    /// Number of blocks.
    pub fn nmb(&self) -> usize {
        self.data.len()
    }

    /// Fill interior cells from a function of the physical coordinate;
    /// ghosts stay untouched (the exchange fills them).
    pub fn fill_interior(&mut self, pack: &MeshBlockPack, f: impl Fn(f64) -> f64) {
        for m in 0..pack.nmb {
            for i in pack.is()..=pack.ie() {
                self.data[m][i] = f(pack.cell_center(m, i));
            }
        }
    }

    /// Copy every cell of `other` into `self` (register copy at stage 1).
    pub fn copy_from(&mut self, other: &BlockField) {
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            dst.copy_from_slice(src);
        }
    }

    /// Fill ghost cells by direct periodic copy from neighbor interiors.
    ///
    /// Initial-condition primer only; during stepping the halo exchange
    /// owns the ghosts.
    pub fn prime_ghosts(&mut self, pack: &MeshBlockPack) {
        let (is, ie, ng) = (pack.is(), pack.ie(), pack.ng);
        let ncells = pack.ncells();
        for m in 0..pack.nmb {
            let left = pack.left_of(m);
            let right = pack.right_of(m);
            for g in 0..ng {
                self.data[m][g] = self.data[left][ie + 1 - ng + g];
                self.data[m][ncells - ng + g] = self.data[right][is + g];
            }
        }
    }

    /// Sum of interior cells across all blocks (conservation checks).
    pub fn interior_sum(&self, pack: &MeshBlockPack) -> f64 {
        self.data
            .iter()
            .map(|b| b[pack.is()..=pack.ie()].iter().sum::<f64>())
            .sum()
    }
}

/// A face-centered field: one value per cell face, `ncells + 1` faces
/// per block. Used for fluxes and the constrained-transport face field.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceField {
    data: Vec<Vec<f64>>,
}

impl FaceField {
    /// Zero-initialized face field shaped for `pack`.
    pub fn new(pack: &MeshBlockPack) -> Self {
        Self {
            data: vec![vec![0.0; pack.ncells() + 1]; pack.nmb],
        }
    }

    /// Read a block's faces.
    pub fn block(&self, m: usize) -> &[f64] {
        &self.data[m]
    }

    /// Mutate a block's faces.
    pub fn block_mut(&mut self, m: usize) -> &mut [f64] {
        &mut self.data[m]
    }

    /// Copy every face of `other` into `self`.
    pub fn copy_from(&mut self, other: &FaceField) {
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            dst.copy_from_slice(src);
        }
    }
}
