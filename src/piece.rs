//! Falling pair: orientation table, movement helpers, and the piece generator with its lookahead queue.

use crate::board::PuyoColor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::VecDeque;

/// Pivot spawn column.
pub const SPAWN_X: i32 = 2;
/// Pivot spawn row.
pub const SPAWN_Y: i32 = 0;
/// Number of pregenerated pieces shown in the preview.
pub const LOOKAHEAD: usize = 2;
pub const MIN_PALETTE: usize = 2;
pub const MAX_PALETTE: usize = PuyoColor::ALL.len();

/// Offset of the second puyo from the pivot, indexed by orientation.
const OFFSETS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Where the second puyo sits relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Up,
    Right,
    Down,
    Left,
}

impl Orientation {
    pub fn index(self) -> usize {
        match self {
            Self::Up => 0,
            Self::Right => 1,
            Self::Down => 2,
            Self::Left => 3,
        }
    }

    pub fn from_index(i: usize) -> Self {
        match i % 4 {
            0 => Self::Up,
            1 => Self::Right,
            2 => Self::Down,
            _ => Self::Left,
        }
    }

    /// Clockwise step.
    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    #[inline]
    pub fn offset(self) -> (i32, i32) {
        OFFSETS[self.index()]
    }
}

/// One puyo of the active pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Puyo {
    pub x: i32,
    pub y: i32,
    pub color: PuyoColor,
}

impl Puyo {
    #[inline]
    pub fn pos(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

/// Active pair: pivot plus second puyo at `pivot + orientation.offset()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub pivot: Puyo,
    pub second: Puyo,
    pub orientation: Orientation,
}

impl Piece {
    /// Fresh piece at the spawn point, second directly below the pivot.
    pub fn spawn(pivot_color: PuyoColor, second_color: PuyoColor) -> Self {
        let orientation = Orientation::Down;
        let (dx, dy) = orientation.offset();
        Self {
            pivot: Puyo { x: SPAWN_X, y: SPAWN_Y, color: pivot_color },
            second: Puyo { x: SPAWN_X + dx, y: SPAWN_Y + dy, color: second_color },
            orientation,
        }
    }

    /// Copy moved by (dx, dy).
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        let mut p = *self;
        p.pivot.x += dx;
        p.pivot.y += dy;
        p.second.x += dx;
        p.second.y += dy;
        p
    }

    /// Copy with the next orientation; pivot stays put.
    pub fn rotated(&self) -> Self {
        let mut p = *self;
        p.orientation = self.orientation.next();
        let (dx, dy) = p.orientation.offset();
        p.second.x = p.pivot.x + dx;
        p.second.y = p.pivot.y + dy;
        p
    }

    pub fn positions(&self) -> [(i32, i32); 2] {
        [self.pivot.pos(), self.second.pos()]
    }

    pub fn colors(&self) -> (PuyoColor, PuyoColor) {
        (self.pivot.color, self.second.color)
    }
}

/// Random piece source plus a fixed-length lookahead queue.
#[derive(Debug, Clone)]
pub struct Generator {
    rng: StdRng,
    palette_size: usize,
    queue: VecDeque<Piece>,
}

impl Generator {
    pub fn new(palette_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        let mut g = Self {
            rng,
            palette_size: clamp_palette(palette_size),
            queue: VecDeque::with_capacity(LOOKAHEAD + 1),
        };
        g.refill();
        g
    }

    fn refill(&mut self) {
        while self.queue.len() < LOOKAHEAD {
            let piece = self.spawn();
            self.queue.push_back(piece);
        }
    }

    fn random_color(&mut self) -> PuyoColor {
        PuyoColor::ALL[..self.palette_size]
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(PuyoColor::Red)
    }

    /// New piece with independently chosen colours from the current palette.
    pub fn spawn(&mut self) -> Piece {
        let pivot = self.random_color();
        let second = self.random_color();
        Piece::spawn(pivot, second)
    }

    /// Take the front of the queue and append a fresh piece.
    pub fn next(&mut self) -> Piece {
        let piece = match self.queue.pop_front() {
            Some(p) => p,
            None => self.spawn(),
        };
        self.refill();
        piece
    }

    /// Drop the queue and pregenerate a new one.
    pub fn reset_queue(&mut self) {
        self.queue.clear();
        self.refill();
    }

    pub fn queue(&self) -> impl Iterator<Item = &Piece> {
        self.queue.iter()
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    /// Affects pieces generated from now on; already queued pieces keep their colours.
    pub fn set_palette_size(&mut self, size: usize) {
        self.palette_size = clamp_palette(size);
    }
}

pub fn clamp_palette(size: usize) -> usize {
    size.clamp(MIN_PALETTE, MAX_PALETTE)
}
