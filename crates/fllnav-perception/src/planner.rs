//! A* path planning over the occupancy grid.
//!
//! The search is 4-connected with unit step cost and a Euclidean heuristic
//! in cell units.  Nodes live in an arena and refer to their predecessor by
//! index; the open set is a binary heap of arena indices that supports
//! decrease-key in place, ordered by `f` and then by insertion sequence so
//! equal-cost expansions are first-in first-out.  The raw cell path is
//! optionally shortened with line-of-sight checks before it is returned.
//!
//! # Example
//!
//! ```rust
//! use fllnav_perception::planner::{PathPlanner, PlannerConfig, path_length};
//! use fllnav_types::{FieldBounds, Obstacle, Point};
//!
//! let mut planner = PathPlanner::new(FieldBounds::default(), PlannerConfig::default()).unwrap();
//! planner.add_obstacle(Obstacle::new(500.0, 500.0, 200.0, 200.0)).unwrap();
//!
//! let path = planner.plan_path(Point::new(100.0, 100.0), Point::new(1100.0, 1100.0)).unwrap();
//! assert_eq!(path.first(), Some(&Point::new(100.0, 100.0)));
//! assert_eq!(path.last(), Some(&Point::new(1100.0, 1100.0)));
//! assert!(path_length(&path) > 1100.0 * 2f64.sqrt() - 1.0);
//! ```

use fllnav_types::{FieldBounds, NavError, Obstacle, Point};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::grid::{GridCell, OccupancyGrid};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PlannerConfig {
    /// Grid cell side (mm).
    pub cell_size: f64,
    /// Shorten raw A* paths with line-of-sight checks.
    pub smooth_paths: bool,
    /// Width (mm) of the blocked band along the field edge; 0 disables it.
    pub field_margin: f64,
    /// Obstacles present from start-up.
    pub obstacles: Vec<Obstacle>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            smooth_paths: true,
            field_margin: 0.0,
            obstacles: Vec::new(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), NavError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(NavError::Configuration(format!(
                "cell_size must be positive (got {})",
                self.cell_size
            )));
        }
        if !(self.field_margin.is_finite() && self.field_margin >= 0.0) {
            return Err(NavError::Configuration(format!(
                "field_margin must be >= 0 (got {})",
                self.field_margin
            )));
        }
        self.obstacles.iter().try_for_each(Obstacle::validate)
    }
}

/// Search counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlannerStats {
    /// Searches run since construction.
    pub searches: u64,
    /// Nodes expanded by the most recent search.
    pub last_expanded: usize,
    /// Cells on the most recent raw A* path.
    pub last_path_cells: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Search arena and open set
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SearchNode {
    cell: GridCell,
    g: f64,
    h: f64,
    f: f64,
    parent: Option<usize>,
    /// Insertion order, for FIFO tie-breaking.
    seq: u64,
    /// Position in the open heap while the node is open.
    heap_pos: Option<usize>,
    closed: bool,
}

/// Binary min-heap of arena indices keyed by `(f, seq)`.
#[derive(Default)]
struct OpenSet {
    heap: Vec<usize>,
}

impl OpenSet {
    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn less(nodes: &[SearchNode], a: usize, b: usize) -> bool {
        let (na, nb) = (&nodes[a], &nodes[b]);
        na.f.total_cmp(&nb.f).then(na.seq.cmp(&nb.seq)).is_lt()
    }

    fn swap(&mut self, nodes: &mut [SearchNode], i: usize, j: usize) {
        self.heap.swap(i, j);
        nodes[self.heap[i]].heap_pos = Some(i);
        nodes[self.heap[j]].heap_pos = Some(j);
    }

    fn sift_up(&mut self, nodes: &mut [SearchNode], mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !Self::less(nodes, self.heap[pos], self.heap[parent]) {
                break;
            }
            self.swap(nodes, pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, nodes: &mut [SearchNode], mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len() && Self::less(nodes, self.heap[left], self.heap[smallest]) {
                smallest = left;
            }
            if right < self.heap.len() && Self::less(nodes, self.heap[right], self.heap[smallest]) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(nodes, pos, smallest);
            pos = smallest;
        }
    }

    fn push(&mut self, nodes: &mut [SearchNode], idx: usize) {
        self.heap.push(idx);
        let pos = self.heap.len() - 1;
        nodes[idx].heap_pos = Some(pos);
        self.sift_up(nodes, pos);
    }

    /// Re-establish order after `nodes[idx].f` decreased.
    fn decrease_key(&mut self, nodes: &mut [SearchNode], idx: usize) {
        if let Some(pos) = nodes[idx].heap_pos {
            self.sift_up(nodes, pos);
        }
    }

    fn pop(&mut self, nodes: &mut [SearchNode]) -> Option<usize> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(nodes, 0, last);
        let top = self.heap.pop()?;
        nodes[top].heap_pos = None;
        if !self.heap.is_empty() {
            self.sift_down(nodes, 0);
        }
        Some(top)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PathPlanner
// ────────────────────────────────────────────────────────────────────────────

/// Grid planner owning the occupancy grid and the obstacle list it was
/// rasterized from.
pub struct PathPlanner {
    config: PlannerConfig,
    grid: OccupancyGrid,
    obstacles: Vec<Obstacle>,
    stats: PlannerStats,
}

impl PathPlanner {
    /// Build the grid and rasterize the edge margin and initial obstacles.
    pub fn new(field: FieldBounds, config: PlannerConfig) -> Result<Self, NavError> {
        config.validate()?;
        let grid = OccupancyGrid::new(field, config.cell_size)?;
        let obstacles = config.obstacles.clone();
        let mut planner = Self {
            config,
            grid,
            obstacles,
            stats: PlannerStats::default(),
        };
        planner.rebuild();
        let (cols, rows) = planner.grid.dimensions();
        info!(cols, rows, cell_size = planner.config.cell_size, obstacles = planner.obstacles.len(), "planner ready");
        Ok(planner)
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn stats(&self) -> PlannerStats {
        self.stats
    }

    pub fn world_to_grid(&self, x: f64, y: f64) -> Option<GridCell> {
        self.grid.world_to_grid(x, y)
    }

    pub fn grid_to_world(&self, cell: GridCell) -> Point {
        self.grid.grid_to_world(cell)
    }

    /// Re-rasterize the whole grid from the margin and the obstacle list.
    fn rebuild(&mut self) {
        self.grid.clear();
        if self.config.field_margin > 0.0 {
            let band = (self.config.field_margin / self.config.cell_size).ceil() as i64;
            let (cols, rows) = self.grid.dimensions();
            let (cols, rows) = (cols as i64, rows as i64);
            self.grid.mark_cells(0, 0, cols - 1, band - 1);
            self.grid.mark_cells(0, rows - band, cols - 1, rows - 1);
            self.grid.mark_cells(0, 0, band - 1, rows - 1);
            self.grid.mark_cells(cols - band, 0, cols - 1, rows - 1);
        }
        for obstacle in &self.obstacles {
            self.grid.mark_obstacle(obstacle);
        }
    }

    /// Block a rectangle; returns the obstacle's index.
    ///
    /// # Errors
    ///
    /// [`NavError::Configuration`] for non-finite or empty rectangles.
    pub fn set_obstacle(&mut self, x: f64, y: f64, width: f64, height: f64) -> Result<usize, NavError> {
        self.add_obstacle(Obstacle::new(x, y, width, height))
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> Result<usize, NavError> {
        obstacle.validate()?;
        self.grid.mark_obstacle(&obstacle);
        self.obstacles.push(obstacle);
        debug!(?obstacle, blocked = self.grid.blocked_count(), "obstacle added");
        Ok(self.obstacles.len() - 1)
    }

    /// Remove one obstacle and rebuild the grid from the rest.
    pub fn remove_obstacle(&mut self, index: usize) -> Result<Obstacle, NavError> {
        if index >= self.obstacles.len() {
            return Err(NavError::Configuration(format!(
                "no obstacle at index {index} ({} defined)",
                self.obstacles.len()
            )));
        }
        let removed = self.obstacles.remove(index);
        self.rebuild();
        debug!(index, ?removed, "obstacle removed");
        Ok(removed)
    }

    /// Drop every obstacle; the edge margin is kept.
    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
        self.rebuild();
        debug!("obstacles cleared");
    }

    /// Plan from `start` to `goal`.
    ///
    /// The returned points begin at `start`, end at `goal`, and pass
    /// through grid cell centres in between.
    ///
    /// # Errors
    ///
    /// [`NavError::PathNotFound`] when either endpoint is off the grid or in
    /// a blocked cell, or when the search space is exhausted.
    pub fn plan_path(&mut self, start: Point, goal: Point) -> Result<Vec<Point>, NavError> {
        self.stats.searches += 1;
        self.stats.last_expanded = 0;
        self.stats.last_path_cells = 0;

        let start_cell = self.endpoint_cell(start, "start")?;
        let goal_cell = self.endpoint_cell(goal, "goal")?;

        let cells = self.search(start_cell, goal_cell)?;
        self.stats.last_path_cells = cells.len();
        let cells = if self.config.smooth_paths {
            self.smooth(&cells)
        } else {
            cells
        };

        let mut path = Vec::with_capacity(cells.len().max(2));
        path.push(start);
        if cells.len() > 2 {
            path.extend(cells[1..cells.len() - 1].iter().map(|c| self.grid.grid_to_world(*c)));
        }
        path.push(goal);
        info!(
            waypoints = path.len(),
            expanded = self.stats.last_expanded,
            length = path_length(&path),
            "path planned"
        );
        Ok(path)
    }

    fn endpoint_cell(&self, p: Point, which: &str) -> Result<GridCell, NavError> {
        let cell = self.grid.world_to_grid(p.x, p.y).ok_or_else(|| {
            warn!(which, x = p.x, y = p.y, "endpoint outside the grid");
            NavError::PathNotFound(format!("{which} ({:.0}, {:.0}) is outside the field", p.x, p.y))
        })?;
        if self.grid.is_blocked(cell) {
            warn!(which, x = p.x, y = p.y, "endpoint blocked");
            return Err(NavError::PathNotFound(format!(
                "{which} ({:.0}, {:.0}) is inside an obstacle",
                p.x, p.y
            )));
        }
        Ok(cell)
    }

    fn search(&mut self, start: GridCell, goal: GridCell) -> Result<Vec<GridCell>, NavError> {
        let heuristic = |c: GridCell| {
            let dc = c.col as f64 - goal.col as f64;
            let dr = c.row as f64 - goal.row as f64;
            dc.hypot(dr)
        };

        let mut nodes: Vec<SearchNode> = Vec::new();
        let mut node_of: Vec<Option<usize>> = vec![None; self.grid.len()];
        let mut open = OpenSet::default();
        let mut seq = 0u64;

        let h = heuristic(start);
        nodes.push(SearchNode {
            cell: start,
            g: 0.0,
            h,
            f: h,
            parent: None,
            seq,
            heap_pos: None,
            closed: false,
        });
        node_of[self.grid.index(start)] = Some(0);
        open.push(&mut nodes, 0);

        while let Some(current) = open.pop(&mut nodes) {
            nodes[current].closed = true;
            self.stats.last_expanded += 1;
            let cell = nodes[current].cell;
            if cell == goal {
                return Ok(Self::reconstruct(&nodes, current));
            }

            let (col, row) = (cell.col as i64, cell.row as i64);
            for (dc, dr) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let Some(next) = self.grid.cell_at(col + dc, row + dr) else {
                    continue;
                };
                if self.grid.is_blocked(next) {
                    continue;
                }
                let g = nodes[current].g + 1.0;
                match node_of[self.grid.index(next)] {
                    Some(idx) if nodes[idx].closed => {}
                    Some(idx) => {
                        if g < nodes[idx].g {
                            let node = &mut nodes[idx];
                            node.g = g;
                            node.f = g + node.h;
                            node.parent = Some(current);
                            open.decrease_key(&mut nodes, idx);
                        }
                    }
                    None => {
                        seq += 1;
                        let h = heuristic(next);
                        nodes.push(SearchNode {
                            cell: next,
                            g,
                            h,
                            f: g + h,
                            parent: Some(current),
                            seq,
                            heap_pos: None,
                            closed: false,
                        });
                        let idx = nodes.len() - 1;
                        node_of[self.grid.index(next)] = Some(idx);
                        open.push(&mut nodes, idx);
                    }
                }
            }
        }

        debug_assert!(open.is_empty());
        warn!(expanded = self.stats.last_expanded, "open set exhausted");
        Err(NavError::PathNotFound(format!(
            "no route from cell ({}, {}) to cell ({}, {})",
            start.col, start.row, goal.col, goal.row
        )))
    }

    fn reconstruct(nodes: &[SearchNode], mut idx: usize) -> Vec<GridCell> {
        let mut cells = vec![nodes[idx].cell];
        while let Some(parent) = nodes[idx].parent {
            cells.push(nodes[parent].cell);
            idx = parent;
        }
        cells.reverse();
        cells
    }

    /// Greedy line-of-sight shortcutting: keep a cell only when the next
    /// one is not visible from the last kept cell.
    fn smooth(&self, cells: &[GridCell]) -> Vec<GridCell> {
        if cells.len() <= 2 {
            return cells.to_vec();
        }
        let mut out = vec![cells[0]];
        let mut anchor = cells[0];
        for i in 1..cells.len() - 1 {
            if !self.grid.line_of_sight(anchor, cells[i + 1]) {
                out.push(cells[i]);
                anchor = cells[i];
            }
        }
        out.push(cells[cells.len() - 1]);
        out
    }
}

/// Total polyline length (mm).
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> PathPlanner {
        PathPlanner::new(FieldBounds::new(1200.0, 1200.0), PlannerConfig::default()).unwrap()
    }

    fn cell_diagonal() -> f64 {
        50.0 * 2f64.sqrt()
    }

    #[test]
    fn open_grid_path_is_nearly_straight() {
        let mut p = planner();
        for (start, goal) in [
            (Point::new(100.0, 100.0), Point::new(1100.0, 1100.0)),
            (Point::new(30.0, 900.0), Point::new(1150.0, 60.0)),
            (Point::new(600.0, 10.0), Point::new(610.0, 1190.0)),
        ] {
            let path = p.plan_path(start, goal).unwrap();
            let straight = start.distance_to(goal);
            assert!(path_length(&path) - straight <= cell_diagonal(), "{path:?}");
        }
    }

    #[test]
    fn raw_path_is_four_connected() {
        let config = PlannerConfig {
            smooth_paths: false,
            ..PlannerConfig::default()
        };
        let mut p = PathPlanner::new(FieldBounds::default(), config).unwrap();
        let path = p.plan_path(Point::new(25.0, 25.0), Point::new(225.0, 125.0)).unwrap();
        // 4 steps east + 2 steps north = 7 cells; interior points are centres.
        assert_eq!(path.len(), 7);
        assert_eq!(p.stats().last_path_cells, 7);
        for w in path.windows(2) {
            assert!((w[0].distance_to(w[1]) - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn blocked_goal_fails() {
        let mut p = planner();
        p.set_obstacle(1000.0, 1000.0, 100.0, 100.0).unwrap();
        let err = p.plan_path(Point::new(100.0, 100.0), Point::new(1050.0, 1050.0)).unwrap_err();
        assert!(matches!(err, NavError::PathNotFound(_)));
        let err = p.plan_path(Point::new(1050.0, 1050.0), Point::new(100.0, 100.0)).unwrap_err();
        assert!(matches!(err, NavError::PathNotFound(_)));
    }

    #[test]
    fn out_of_bounds_endpoint_fails() {
        let mut p = planner();
        let err = p.plan_path(Point::new(-10.0, 100.0), Point::new(500.0, 500.0)).unwrap_err();
        assert!(matches!(err, NavError::PathNotFound(_)));
    }

    #[test]
    fn path_avoids_obstacle_rectangle() {
        let mut p = planner();
        let obstacle = Obstacle::new(500.0, 500.0, 200.0, 200.0);
        p.add_obstacle(obstacle).unwrap();
        let path = p.plan_path(Point::new(100.0, 100.0), Point::new(1100.0, 1100.0)).unwrap();
        for point in &path {
            assert!(!obstacle.contains(point.x, point.y), "{point:?} inside obstacle");
        }
        // Every leg stays visible on the grid.
        for w in path.windows(2) {
            let a = p.world_to_grid(w[0].x, w[0].y).unwrap();
            let b = p.world_to_grid(w[1].x, w[1].y).unwrap();
            assert!(p.grid().line_of_sight(a, b));
        }
    }

    #[test]
    fn enclosed_goal_exhausts_search() {
        let mut p = planner();
        // Ring of obstacles around the cell containing (600, 600).
        p.set_obstacle(500.0, 500.0, 200.0, 10.0).unwrap();
        p.set_obstacle(500.0, 690.0, 200.0, 10.0).unwrap();
        p.set_obstacle(500.0, 500.0, 10.0, 200.0).unwrap();
        p.set_obstacle(690.0, 500.0, 10.0, 200.0).unwrap();
        let err = p.plan_path(Point::new(100.0, 100.0), Point::new(600.0, 600.0)).unwrap_err();
        assert!(matches!(err, NavError::PathNotFound(_)));
        assert!(p.stats().last_expanded > 100);
    }

    #[test]
    fn clear_restores_blocked_straight_path() {
        let mut p = planner();
        // Wall across the whole field.
        p.set_obstacle(0.0, 580.0, 1200.0, 40.0).unwrap();
        assert!(p.plan_path(Point::new(600.0, 100.0), Point::new(600.0, 1100.0)).is_err());
        p.clear_obstacles();
        let path = p.plan_path(Point::new(600.0, 100.0), Point::new(600.0, 1100.0)).unwrap();
        assert_eq!(path.len(), 2);
        assert!(p.obstacles().is_empty());
    }

    #[test]
    fn remove_obstacle_rebuilds_grid() {
        let mut p = planner();
        let wall = p.set_obstacle(0.0, 580.0, 1200.0, 40.0).unwrap();
        p.set_obstacle(100.0, 100.0, 50.0, 50.0).unwrap();
        p.remove_obstacle(wall).unwrap();
        assert_eq!(p.obstacles().len(), 1);
        assert!(p.plan_path(Point::new(600.0, 100.0), Point::new(600.0, 1100.0)).is_ok());
        assert!(matches!(p.remove_obstacle(5), Err(NavError::Configuration(_))));
    }

    #[test]
    fn malformed_obstacle_is_rejected() {
        let mut p = planner();
        assert!(matches!(
            p.set_obstacle(0.0, 0.0, -1.0, 10.0),
            Err(NavError::Configuration(_))
        ));
        assert!(matches!(
            p.set_obstacle(f64::NAN, 0.0, 1.0, 10.0),
            Err(NavError::Configuration(_))
        ));
        assert!(p.obstacles().is_empty());
    }

    #[test]
    fn field_margin_blocks_edges() {
        let config = PlannerConfig {
            field_margin: 60.0,
            ..PlannerConfig::default()
        };
        let mut p = PathPlanner::new(FieldBounds::default(), config).unwrap();
        assert!(p.grid().is_blocked(GridCell::new(1, 12)));
        assert!(p.grid().is_free(GridCell::new(2, 12)));
        assert!(p.plan_path(Point::new(20.0, 600.0), Point::new(600.0, 600.0)).is_err());
        p.clear_obstacles();
        assert!(p.grid().is_blocked(GridCell::new(23, 23)));
    }

    #[test]
    fn heap_decrease_key_keeps_order() {
        let mut nodes: Vec<SearchNode> = (0..5)
            .map(|i| SearchNode {
                cell: GridCell::new(i, 0),
                g: 0.0,
                h: 0.0,
                f: 10.0 - i as f64,
                parent: None,
                seq: i as u64,
                heap_pos: None,
                closed: false,
            })
            .collect();
        let mut open = OpenSet::default();
        for i in 0..5 {
            open.push(&mut nodes, i);
        }
        nodes[0].f = 1.0;
        open.decrease_key(&mut nodes, 0);
        assert_eq!(open.pop(&mut nodes), Some(0));
        assert_eq!(open.pop(&mut nodes), Some(4));
        // Equal f: lower insertion sequence first.
        nodes[1].f = nodes[3].f;
        open.decrease_key(&mut nodes, 1);
        assert_eq!(open.pop(&mut nodes), Some(1));
        assert_eq!(open.pop(&mut nodes), Some(3));
        assert_eq!(open.pop(&mut nodes), Some(2));
        assert_eq!(open.pop(&mut nodes), None);
    }

    #[test]
    fn stats_count_searches() {
        let mut p = planner();
        p.plan_path(Point::new(100.0, 100.0), Point::new(200.0, 100.0)).unwrap();
        let _ = p.plan_path(Point::new(-1.0, 0.0), Point::new(200.0, 100.0));
        assert_eq!(p.stats().searches, 2);
        assert_eq!(p.stats().last_expanded, 0);
    }
}
