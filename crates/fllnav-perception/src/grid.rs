//! Free/blocked occupancy grid over the field.
//!
//! Cells are square with side `cell_size` mm; cell `(col, row)` covers
//! `[col·s, (col+1)·s) × [row·s, (row+1)·s)`.  Points on the far field edge
//! belong to the last column / row.
//!
//! # Example
//!
//! ```rust
//! use fllnav_perception::grid::{GridCell, OccupancyGrid};
//! use fllnav_types::{FieldBounds, Obstacle};
//!
//! let mut grid = OccupancyGrid::new(FieldBounds::new(1200.0, 1200.0), 50.0).unwrap();
//! assert_eq!(grid.dimensions(), (24, 24));
//!
//! grid.mark_obstacle(&Obstacle::new(500.0, 500.0, 200.0, 200.0));
//! assert!(grid.is_blocked(GridCell::new(12, 12)));
//! assert_eq!(grid.world_to_grid(525.0, 510.0), Some(GridCell::new(10, 10)));
//! ```

use fllnav_types::{FieldBounds, NavError, Obstacle, Point};

/// Integer cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub col: usize,
    pub row: usize,
}

impl GridCell {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    field: FieldBounds,
    cell_size: f64,
    cols: usize,
    rows: usize,
    blocked: Vec<bool>,
}

impl OccupancyGrid {
    /// An all-free grid of `ceil(field / cell_size)` cells per axis.
    pub fn new(field: FieldBounds, cell_size: f64) -> Result<Self, NavError> {
        field.validate()?;
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(NavError::Configuration(format!("cell size must be positive (got {cell_size})")));
        }
        let cols = (field.width / cell_size).ceil() as usize;
        let rows = (field.height / cell_size).ceil() as usize;
        Ok(Self {
            field,
            cell_size,
            cols,
            rows,
            blocked: vec![false; cols * rows],
        })
    }

    /// `(cols, rows)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    /// Row-major storage index of `cell`.
    pub fn index(&self, cell: GridCell) -> usize {
        cell.row * self.cols + cell.col
    }

    /// Cell containing `(x, y)`, or `None` when the point is off the field.
    pub fn world_to_grid(&self, x: f64, y: f64) -> Option<GridCell> {
        if !self.field.contains(x, y) {
            return None;
        }
        let col = ((x / self.cell_size).floor() as usize).min(self.cols - 1);
        let row = ((y / self.cell_size).floor() as usize).min(self.rows - 1);
        Some(GridCell::new(col, row))
    }

    /// World coordinates of the centre of `cell`.
    pub fn grid_to_world(&self, cell: GridCell) -> Point {
        Point::new(
            (cell.col as f64 + 0.5) * self.cell_size,
            (cell.row as f64 + 0.5) * self.cell_size,
        )
    }

    /// The cell at signed coordinates, if it lies on the grid.
    pub fn cell_at(&self, col: i64, row: i64) -> Option<GridCell> {
        if col < 0 || row < 0 || col as usize >= self.cols || row as usize >= self.rows {
            return None;
        }
        Some(GridCell::new(col as usize, row as usize))
    }

    pub fn is_blocked(&self, cell: GridCell) -> bool {
        self.blocked[self.index(cell)]
    }

    pub fn is_free(&self, cell: GridCell) -> bool {
        !self.is_blocked(cell)
    }

    /// Signed-coordinate check; anything off the grid counts as blocked.
    fn blocked_at(&self, col: i64, row: i64) -> bool {
        self.cell_at(col, row).is_none_or(|c| self.is_blocked(c))
    }

    /// Block every cell from the one containing `(x, y)` through the one
    /// containing `(x + w, y + h)` inclusive, clamped to the grid.  The
    /// obstacle must already be validated.
    pub fn mark_obstacle(&mut self, obstacle: &Obstacle) {
        let s = self.cell_size;
        let c0 = (obstacle.x / s).floor() as i64;
        let r0 = (obstacle.y / s).floor() as i64;
        let c1 = ((obstacle.x + obstacle.width) / s).floor() as i64;
        let r1 = ((obstacle.y + obstacle.height) / s).floor() as i64;
        self.mark_cells(c0, r0, c1, r1);
    }

    /// Block the inclusive signed cell range, clamped to the grid.
    pub fn mark_cells(&mut self, c0: i64, r0: i64, c1: i64, r1: i64) {
        let (cols, rows) = (self.cols as i64, self.rows as i64);
        if c1 < 0 || r1 < 0 || c0 >= cols || r0 >= rows {
            return;
        }
        let (c0, c1) = (c0.max(0) as usize, c1.min(cols - 1) as usize);
        let (r0, r1) = (r0.max(0) as usize, r1.min(rows - 1) as usize);
        for row in r0..=r1 {
            for col in c0..=c1 {
                let i = self.index(GridCell::new(col, row));
                self.blocked[i] = true;
            }
        }
    }

    /// Free every cell.
    pub fn clear(&mut self) {
        self.blocked.iter_mut().for_each(|b| *b = false);
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|b| **b).count()
    }

    /// Whether the straight segment between the centres of `a` and `b`
    /// crosses only free cells.
    ///
    /// Every cell the segment touches is visited (supercover traversal).
    /// When the segment passes exactly through a cell corner, both cells
    /// sharing that corner must be free, so a shortcut never clips the
    /// corner of a blocked cell.
    pub fn line_of_sight(&self, a: GridCell, b: GridCell) -> bool {
        let (mut x, mut y) = (a.col as i64, a.row as i64);
        let (x1, y1) = (b.col as i64, b.row as i64);
        let (dx, dy) = ((x1 - x).abs(), (y1 - y).abs());
        let (sx, sy) = ((x1 - x).signum(), (y1 - y).signum());

        if self.blocked_at(x, y) {
            return false;
        }
        let (mut ix, mut iy) = (0, 0);
        while ix < dx || iy < dy {
            let decision = (1 + 2 * ix) * dy - (1 + 2 * iy) * dx;
            if decision == 0 {
                if self.blocked_at(x + sx, y) || self.blocked_at(x, y + sy) {
                    return false;
                }
                x += sx;
                y += sy;
                ix += 1;
                iy += 1;
            } else if decision < 0 {
                x += sx;
                ix += 1;
            } else {
                y += sy;
                iy += 1;
            }
            if self.blocked_at(x, y) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> OccupancyGrid {
        OccupancyGrid::new(FieldBounds::new(1200.0, 1200.0), 50.0).unwrap()
    }

    #[test]
    fn rejects_bad_cell_size() {
        for s in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = OccupancyGrid::new(FieldBounds::default(), s).unwrap_err();
            assert!(matches!(err, NavError::Configuration(_)));
        }
    }

    #[test]
    fn partial_cells_round_up() {
        let g = OccupancyGrid::new(FieldBounds::new(1000.0, 130.0), 60.0).unwrap();
        assert_eq!(g.dimensions(), (17, 3));
        assert_eq!(g.world_to_grid(1000.0, 130.0), Some(GridCell::new(16, 2)));
    }

    #[test]
    fn world_grid_conversion() {
        let g = grid();
        assert_eq!(g.world_to_grid(0.0, 0.0), Some(GridCell::new(0, 0)));
        assert_eq!(g.world_to_grid(49.9, 50.0), Some(GridCell::new(0, 1)));
        assert_eq!(g.world_to_grid(1200.0, 1200.0), Some(GridCell::new(23, 23)));
        assert_eq!(g.world_to_grid(-0.1, 10.0), None);
        assert_eq!(g.world_to_grid(10.0, 1200.1), None);
        assert_eq!(g.grid_to_world(GridCell::new(2, 3)), Point::new(125.0, 175.0));
    }

    #[test]
    fn obstacle_rasterization_is_inclusive_and_clamped() {
        let mut g = grid();
        g.mark_obstacle(&Obstacle::new(500.0, 500.0, 200.0, 200.0));
        // 500..=700 covers cells 10..=14 on both axes.
        assert_eq!(g.blocked_count(), 25);
        assert!(g.is_blocked(GridCell::new(14, 10)));
        assert!(g.is_free(GridCell::new(15, 10)));

        g.clear();
        g.mark_obstacle(&Obstacle::new(-100.0, 1150.0, 160.0, 500.0));
        // Columns 0..=1, row 23 only.
        assert_eq!(g.blocked_count(), 2);

        g.clear();
        g.mark_obstacle(&Obstacle::new(2000.0, 2000.0, 10.0, 10.0));
        assert_eq!(g.blocked_count(), 0);
    }

    #[test]
    fn line_of_sight_blocked_by_wall() {
        let mut g = grid();
        g.mark_cells(10, 0, 10, 20);
        assert!(!g.line_of_sight(GridCell::new(2, 5), GridCell::new(20, 5)));
        assert!(g.line_of_sight(GridCell::new(2, 22), GridCell::new(20, 23)));
    }

    #[test]
    fn diagonal_does_not_clip_corner() {
        let mut g = grid();
        g.mark_cells(1, 0, 1, 0);
        // (0,0) -> (1,1) passes exactly through the corner shared with (1,0).
        assert!(!g.line_of_sight(GridCell::new(0, 0), GridCell::new(1, 1)));
        assert!(!g.line_of_sight(GridCell::new(1, 1), GridCell::new(0, 0)));
        g.clear();
        assert!(g.line_of_sight(GridCell::new(0, 0), GridCell::new(1, 1)));
    }
}
