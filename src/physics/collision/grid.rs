use super::{
    bitmatrix::{iter_ones, BitMatrix},
    broadphase::BroadPhase,
    AABB,
};

/// Upper limit of cells along one axis.
/// If the objects are spread out further than this many cells,
/// the cells are made bigger instead.
const MAX_CELLS_PER_AXIS: usize = 256;

/// A uniform grid broad phase.
///
/// Every column and every row of the grid has a bitset with one bit per object.
/// Objects whose boxes share a column and a row are candidates for a pair.
/// The grid is rebuilt on every query to cover exactly the boxes it's given,
/// so it doesn't need to know the size of the world in advance.
#[derive(Debug)]
pub struct Grid {
    cell_size: f64,
    column_bits: BitMatrix,
    row_bits: BitMatrix,
    // cell ranges each object was inserted into
    ranges: Vec<CellRange>,
    // scratch space for unions of columns and rows
    col_union: Vec<u64>,
    row_union: Vec<u64>,
}

#[derive(Clone, Copy, Debug)]
struct CellRange {
    first_col: usize,
    last_col: usize,
    first_row: usize,
    last_row: usize,
}

impl Grid {
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            column_bits: BitMatrix::default(),
            row_bits: BitMatrix::default(),
            ranges: Vec::new(),
            col_union: Vec::new(),
            row_union: Vec::new(),
        }
    }
}

impl BroadPhase for Grid {
    fn pairs(&mut self, aabbs: &[AABB], out: &mut Vec<[usize; 2]>) {
        let _span = tracy_span!("grid broad phase", "pairs");
        out.clear();
        let Some(first) = aabbs.first() else {
            return;
        };
        let bounds = aabbs.iter().fold(*first, |acc, aabb| acc.union(aabb));

        let spacing = self
            .cell_size
            .max(bounds.width() / MAX_CELLS_PER_AXIS as f64)
            .max(bounds.height() / MAX_CELLS_PER_AXIS as f64);
        let column_count = ((bounds.width() / spacing) as usize + 1).min(MAX_CELLS_PER_AXIS + 1);
        let row_count = ((bounds.height() / spacing) as usize + 1).min(MAX_CELLS_PER_AXIS + 1);
        let cell_of = |offset: f64, count: usize| ((offset / spacing) as usize).min(count - 1);

        self.column_bits.reset(column_count, aabbs.len());
        self.row_bits.reset(row_count, aabbs.len());
        self.ranges.clear();

        for (id, aabb) in aabbs.iter().enumerate() {
            let range = CellRange {
                first_col: cell_of(aabb.min.x - bounds.min.x, column_count),
                last_col: cell_of(aabb.max.x - bounds.min.x, column_count),
                first_row: cell_of(aabb.min.y - bounds.min.y, row_count),
                last_row: cell_of(aabb.max.y - bounds.min.y, row_count),
            };
            for col in range.first_col..=range.last_col {
                self.column_bits.set(col, id);
            }
            for row in range.first_row..=range.last_row {
                self.row_bits.set(row, id);
            }
            self.ranges.push(range);
        }

        for (id, (aabb, range)) in aabbs.iter().zip(&self.ranges).enumerate() {
            self.column_bits
                .union_into(range.first_col..=range.last_col, &mut self.col_union);
            self.row_bits
                .union_into(range.first_row..=range.last_row, &mut self.row_union);
            for (c, r) in self.col_union.iter_mut().zip(&self.row_union) {
                *c &= r;
            }
            // a box in the same column and row range can still be a neighbor
            // that only shares a column with one cell and a row with another,
            // so check the actual boxes at the end
            out.extend(
                iter_ones(&self.col_union)
                    .filter(|&other| other > id)
                    .filter(|&other| aabb.overlaps(&aabbs[other]))
                    .map(|other| [id, other]),
            );
        }
    }
}
