//! Board: settled puyo grid, placement legality, merge, group matching and gravity.

use crate::piece::Piece;

/// Board width in cells.
pub const WIDTH: usize = 6;
/// Board height in cells.
pub const HEIGHT: usize = 12;
/// Smallest connected same-colour group that clears.
pub const MATCH_THRESHOLD: usize = 4;

const NEIGHBOURS_4: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Puyo colours. Palettes of size N use the first N entries of [`PuyoColor::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PuyoColor {
    Red,
    Green,
    Blue,
    Yellow,
}

impl PuyoColor {
    pub const ALL: [Self; 4] = [Self::Red, Self::Green, Self::Blue, Self::Yellow];

    /// Colour index 0..4 for theme.puyo_color().
    pub fn index(self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
            Self::Yellow => 3,
        }
    }
}

/// Single cell: either empty or a settled puyo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Puyo(PuyoColor),
}

impl Cell {
    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::Empty
    }
}

/// Result of writing a locked piece into the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Placed,
    /// A cell sat above row 0; nothing was written.
    ToppedOut,
}

/// One connected same-colour group found by [`Board::find_groups`].
pub type Group = Vec<(usize, usize)>;

/// Settled cells. y=0 is top; `rows[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    rows: [[Cell; WIDTH]; HEIGHT],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        self.rows.get(y).and_then(|row| row.get(x)).copied()
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if let Some(slot) = self.rows.get_mut(y).and_then(|row| row.get_mut(x)) {
            *slot = cell;
        }
    }

    /// True if (x, y) is inside the board and empty.
    #[inline]
    pub fn is_free(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        matches!(self.get(x as usize, y as usize), Some(Cell::Empty))
    }

    /// True iff both target coordinates are inside the board and unoccupied.
    pub fn can_place(&self, a: (i32, i32), b: (i32, i32)) -> bool {
        self.is_free(a.0, a.1) && self.is_free(b.0, b.1)
    }

    /// Write both puyos of `piece` at their current coordinates.
    /// The caller guarantees the target cells are free; if either cell is above
    /// the top row nothing is written.
    pub fn merge(&mut self, piece: &Piece) -> Merge {
        if piece.pivot.y < 0 || piece.second.y < 0 {
            return Merge::ToppedOut;
        }
        for puyo in [piece.pivot, piece.second] {
            self.set(puyo.x as usize, puyo.y as usize, Cell::Puyo(puyo.color));
        }
        Merge::Placed
    }

    /// Flood-fill every same-colour 4-connected component (row-major scan) and
    /// return those with at least [`MATCH_THRESHOLD`] cells.
    pub fn find_groups(&self) -> Vec<Group> {
        let mut visited = [[false; WIDTH]; HEIGHT];
        let mut groups = Vec::new();

        for start_y in 0..HEIGHT {
            for start_x in 0..WIDTH {
                let color = match self.rows[start_y][start_x] {
                    Cell::Puyo(c) if !visited[start_y][start_x] => c,
                    _ => continue,
                };
                visited[start_y][start_x] = true;
                let mut stack = vec![(start_x, start_y)];
                let mut group = Vec::new();

                while let Some((x, y)) = stack.pop() {
                    group.push((x, y));
                    for (dx, dy) in NEIGHBOURS_4 {
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= WIDTH as i32 || ny >= HEIGHT as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as usize, ny as usize);
                        if !visited[ny][nx] && self.rows[ny][nx] == Cell::Puyo(color) {
                            visited[ny][nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }

                if group.len() >= MATCH_THRESHOLD {
                    groups.push(group);
                }
            }
        }
        groups
    }

    /// Empty every listed cell. Returns how many were occupied.
    pub fn remove(&mut self, cells: &[(usize, usize)]) -> usize {
        let mut removed = 0;
        for &(x, y) in cells {
            if matches!(self.get(x, y), Some(Cell::Puyo(_))) {
                self.set(x, y, Cell::Empty);
                removed += 1;
            }
        }
        removed
    }

    /// Compact each column downward, keeping top-to-bottom order. Returns true if anything moved.
    pub fn apply_gravity(&mut self) -> bool {
        let mut moved = false;
        for x in 0..WIDTH {
            for y in (0..HEIGHT).rev() {
                if !self.rows[y][x].is_empty() {
                    continue;
                }
                // Nearest occupied cell above the hole.
                if let Some(k) = (0..y).rev().find(|&k| !self.rows[k][x].is_empty()) {
                    self.rows[y][x] = self.rows[k][x];
                    self.rows[k][x] = Cell::Empty;
                    moved = true;
                }
            }
        }
        moved
    }

    pub fn occupied(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .count()
    }

    pub fn rows(&self) -> &[[Cell; WIDTH]; HEIGHT] {
        &self.rows
    }

    /// Build a board from text rows (top first, bottom-aligned): `.` empty, `R` `G` `B` `Y` puyos.
    #[cfg(test)]
    pub fn from_rows(rows: &[&str]) -> Self {
        let mut board = Self::new();
        let offset = HEIGHT - rows.len();
        for (i, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let cell = match ch {
                    'R' => Cell::Puyo(PuyoColor::Red),
                    'G' => Cell::Puyo(PuyoColor::Green),
                    'B' => Cell::Puyo(PuyoColor::Blue),
                    'Y' => Cell::Puyo(PuyoColor::Yellow),
                    _ => Cell::Empty,
                };
                board.set(x, offset + i, cell);
            }
        }
        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{Orientation, Puyo};
    use proptest::prelude::*;

    const R: Cell = Cell::Puyo(PuyoColor::Red);
    const G: Cell = Cell::Puyo(PuyoColor::Green);

    fn vertical_piece(x: i32, y: i32) -> Piece {
        Piece {
            pivot: Puyo { x, y, color: PuyoColor::Red },
            second: Puyo { x, y: y + 1, color: PuyoColor::Blue },
            orientation: Orientation::Down,
        }
    }

    proptest! {
        #[test]
        fn can_place_matches_bounds_and_occupancy(
            ax in -3i32..9, ay in -3i32..15, bx in -3i32..9, by in -3i32..15,
            filled in proptest::collection::vec((0usize..WIDTH, 0usize..HEIGHT), 0..20),
        ) {
            let mut board = Board::new();
            for &(x, y) in &filled {
                board.set(x, y, R);
            }
            let free = |x: i32, y: i32| {
                (0..WIDTH as i32).contains(&x)
                    && (0..HEIGHT as i32).contains(&y)
                    && !filled.contains(&(x as usize, y as usize))
            };
            prop_assert_eq!(board.can_place((ax, ay), (bx, by)), free(ax, ay) && free(bx, by));
        }

        #[test]
        fn gravity_preserves_column_order(column in proptest::collection::vec(0u8..3, HEIGHT)) {
            let mut board = Board::new();
            for (y, v) in column.iter().enumerate() {
                let cell = match v { 0 => Cell::Empty, 1 => R, _ => G };
                board.set(0, y, cell);
            }
            let before: Vec<Cell> = (0..HEIGHT).filter_map(|y| board.get(0, y)).filter(|c| !c.is_empty()).collect();
            board.apply_gravity();
            let after: Vec<Cell> = (0..HEIGHT).filter_map(|y| board.get(0, y)).collect();
            let empties = HEIGHT - before.len();
            prop_assert!(after[..empties].iter().all(|c| c.is_empty()));
            prop_assert_eq!(&after[empties..], &before[..]);
        }
    }

    #[test]
    fn can_place_rejects_out_of_bounds_and_occupied() {
        let mut board = Board::new();
        assert!(board.can_place((0, 0), (5, 11)));
        assert!(!board.can_place((-1, 0), (0, 0)));
        assert!(!board.can_place((0, 0), (6, 0)));
        assert!(!board.can_place((0, -1), (0, 0)));
        assert!(!board.can_place((0, 11), (0, 12)));
        board.set(3, 4, R);
        assert!(!board.can_place((3, 4), (3, 5)));
        assert!(board.can_place((3, 5), (3, 6)));
    }

    #[test]
    fn group_of_four_clears() {
        let board = Board::from_rows(&["RR....", "RR...."]);
        let groups = board.find_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 4);
    }

    #[test]
    fn group_of_three_does_not_clear() {
        let board = Board::from_rows(&["R.....", "RR...."]);
        assert!(board.find_groups().is_empty());
    }

    #[test]
    fn disjoint_pairs_do_not_clear() {
        let board = Board::from_rows(&["RR.RR."]);
        assert!(board.find_groups().is_empty());
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let board = Board::from_rows(&["R.R...", ".R.R.."]);
        assert!(board.find_groups().is_empty());
    }

    #[test]
    fn separate_groups_are_reported_separately() {
        let board = Board::from_rows(&["RRRRGG", "BBBBGG"]);
        let mut sizes: Vec<usize> = board.find_groups().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![4, 4, 4]);
    }

    #[test]
    fn gravity_compacts_column() {
        // [A, empty, B, empty, empty] top to bottom in the last five rows.
        let mut board = Board::from_rows(&["R.....", "......", "G.....", "......", "......"]);
        assert!(board.apply_gravity());
        assert_eq!(board.get(0, HEIGHT - 5), Some(Cell::Empty));
        assert_eq!(board.get(0, HEIGHT - 4), Some(Cell::Empty));
        assert_eq!(board.get(0, HEIGHT - 3), Some(Cell::Empty));
        assert_eq!(board.get(0, HEIGHT - 2), Some(R));
        assert_eq!(board.get(0, HEIGHT - 1), Some(G));
        assert!(!board.apply_gravity());
    }

    #[test]
    fn merge_writes_both_cells() {
        let mut board = Board::new();
        assert_eq!(board.merge(&vertical_piece(2, 10)), Merge::Placed);
        assert_eq!(board.get(2, 10), Some(R));
        assert_eq!(board.get(2, 11), Some(Cell::Puyo(PuyoColor::Blue)));
    }

    #[test]
    fn merge_above_top_writes_nothing() {
        let mut board = Board::from_rows(&["..R..."]);
        let before = board.clone();
        assert_eq!(board.merge(&vertical_piece(2, -1)), Merge::ToppedOut);
        assert_eq!(board, before);
    }

    #[test]
    fn remove_counts_only_occupied() {
        let mut board = Board::from_rows(&["RR...."]);
        assert_eq!(board.remove(&[(0, HEIGHT - 1), (1, HEIGHT - 1), (2, HEIGHT - 1)]), 2);
        assert_eq!(board.occupied(), 0);
    }
}
