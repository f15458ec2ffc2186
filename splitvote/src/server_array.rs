use crate::*;
use std::convert::TryFrom;
use std::fmt;

/// Grid coordinates of one mix cell: row letter and column index
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub row: char,
    pub col: usize,
}

impl CellId {
    pub fn new(row: char, col: usize) -> Self {
        CellId { row, col }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Dimensions of the mix-server grid.
///
/// Rows are redundant threshold shares of the same logical mix; columns are successive
/// mix stages. A cell's role index is `row_position * cols + col`.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerArray {
    pub rows: usize,
    pub cols: usize,
    pub threshold: usize,
}

impl ServerArray {
    /// Dimension the grid for the given fault and leak tolerance
    pub fn new(n_fail: usize, n_leak: usize) -> Result<Self, Error> {
        let cols = 1 + n_leak;
        let (rows, threshold) = if n_fail > 0 {
            (2 + n_fail + n_leak, 2 + n_leak)
        } else {
            (1 + n_leak, 1 + n_leak)
        };
        if rows > 26 {
            return Err(Error::Configuration(format!(
                "{} rows needed for n_fail={} n_leak={}, at most 26 supported",
                rows, n_fail, n_leak
            )));
        }
        debug_assert!(threshold <= rows);
        Ok(ServerArray {
            rows,
            cols,
            threshold,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Row letters `a, b, c, ...`
    pub fn row_list(&self) -> Vec<char> {
        (b'a'..b'a' + self.rows as u8).map(char::from).collect()
    }

    pub fn first_row(&self) -> char {
        'a'
    }

    pub fn last_col(&self) -> usize {
        self.cols - 1
    }

    /// 0-based position of a row letter, if it is inside the grid
    pub fn row_position(&self, row: char) -> Option<usize> {
        if !row.is_ascii_lowercase() {
            return None;
        }
        let pos = (row as u8 - b'a') as usize;
        if pos < self.rows {
            Some(pos)
        } else {
            None
        }
    }

    pub fn index_of(&self, cell: CellId) -> Option<usize> {
        let pos = self.row_position(cell.row)?;
        if cell.col >= self.cols {
            return None;
        }
        Some(pos * self.cols + cell.col)
    }

    pub fn last_row(&self) -> char {
        char::from(b'a' + (self.rows - 1) as u8)
    }

    /// The cell holding a role index, if the index is inside the grid
    pub fn cell_of(&self, index: usize) -> Option<CellId> {
        if index >= self.num_cells() {
            return None;
        }
        let row = u8::try_from(index / self.cols).ok()?;
        Some(CellId::new(char::from(b'a' + row), index % self.cols))
    }

    /// All cells in role-index order
    pub fn cells(&self) -> Vec<CellId> {
        (0..self.num_cells()).filter_map(|i| self.cell_of(i)).collect()
    }

    /// The other rows of `cell`'s column
    pub fn column_peers(&self, cell: CellId) -> Vec<CellId> {
        self.row_list()
            .into_iter()
            .filter(|r| *r != cell.row)
            .map(|r| CellId::new(r, cell.col))
            .collect()
    }

    /// Shamir evaluation point of a row (`a` is 1)
    pub fn share_point(&self, row: char) -> Option<usize> {
        self.row_position(row).map(|p| p + 1)
    }

    /// The single cell that derives verifier challenges (the last role index)
    pub fn challenge_cell(&self) -> CellId {
        CellId::new(self.last_row(), self.last_col())
    }

    /// The cell that publishes permutation traces (role index 0)
    pub fn pik_cell(&self) -> CellId {
        CellId::new(self.first_row(), 0)
    }

    /// The cell that publishes the tally (first row, last column)
    pub fn tally_cell(&self) -> CellId {
        CellId::new(self.first_row(), self.last_col())
    }
}
