//! Game state: board, active pair, lookahead, chain resolution, score and game over.

use crate::GameConfig;
use crate::board::{Board, Cell, HEIGHT, Merge, PuyoColor, WIDTH};
use crate::piece::{Generator, Piece};
use tracing::{debug, info};

pub const MIN_TICK_MS: u64 = 50;
pub const MAX_TICK_MS: u64 = 5000;

/// Engine phase. Input and gravity are only accepted while `Falling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Falling,
    /// Marked groups are waiting to be removed; one pass per [`GameState::advance_resolution`].
    Resolving,
    GameOver,
}

/// Outcome of a downward step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Moved,
    /// The pair could not move down and was merged into the board.
    Locked,
    Ignored,
}

/// Notifications for an external score sink. Drained by the host with [`GameState::take_events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEvent {
    ScoreChanged(u32),
    GameOver { score: u32, max_chain: u32 },
}

/// Settled cells with the active pair overlaid, plus cells marked for clearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub cells: [[Cell; WIDTH]; HEIGHT],
    pub clearing: Vec<(usize, usize)>,
}

impl BoardView {
    pub fn is_clearing(&self, x: usize, y: usize) -> bool {
        self.clearing.contains(&(x, y))
    }
}

/// The whole engine state. Only mutated through the command methods below.
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    piece: Option<Piece>,
    generator: Generator,
    phase: Phase,
    /// Cells marked in the current resolution pass.
    clearing: Vec<(usize, usize)>,
    score: u32,
    /// Passes in the current (or last) chain.
    chain: u32,
    max_chain: u32,
    pieces_placed: u32,
    tick_interval_ms: u64,
    /// When false, chains resolve to fixpoint inside the lock.
    animate: bool,
    events: Vec<ScoreEvent>,
}

impl GameState {
    pub fn new(config: &GameConfig) -> Self {
        let mut generator = Generator::new(config.palette_size, config.seed);
        let piece = Some(generator.next());
        Self {
            board: Board::new(),
            piece,
            generator,
            phase: Phase::Falling,
            clearing: Vec::new(),
            score: 0,
            chain: 0,
            max_chain: 0,
            pieces_placed: 0,
            tick_interval_ms: config.tick_ms.clamp(MIN_TICK_MS, MAX_TICK_MS),
            animate: config.animate,
            events: Vec::new(),
        }
    }

    #[inline]
    fn accepts_input(&self) -> bool {
        self.phase == Phase::Falling
    }

    fn try_replace(&mut self, candidate: Piece) -> bool {
        let [a, b] = candidate.positions();
        if self.board.can_place(a, b) {
            self.piece = Some(candidate);
            true
        } else {
            false
        }
    }

    fn shift(&mut self, dx: i32) -> bool {
        if !self.accepts_input() {
            return false;
        }
        match self.piece {
            Some(piece) => self.try_replace(piece.translated(dx, 0)),
            None => false,
        }
    }

    pub fn move_left(&mut self) -> bool {
        self.shift(-1)
    }

    pub fn move_right(&mut self) -> bool {
        self.shift(1)
    }

    /// Advance orientation clockwise around the pivot if the new second cell is free.
    pub fn rotate(&mut self) -> bool {
        if !self.accepts_input() {
            return false;
        }
        match self.piece {
            Some(piece) => self.try_replace(piece.rotated()),
            None => false,
        }
    }

    /// Move the pair down one row, or lock it when blocked. Also the gravity tick.
    pub fn soft_drop(&mut self) -> Step {
        if !self.accepts_input() {
            return Step::Ignored;
        }
        let Some(piece) = self.piece else {
            return Step::Ignored;
        };
        if self.try_replace(piece.translated(0, 1)) {
            Step::Moved
        } else {
            self.lock_piece(piece);
            Step::Locked
        }
    }

    fn lock_piece(&mut self, piece: Piece) {
        self.piece = None;
        if self.board.merge(&piece) == Merge::ToppedOut {
            self.top_out();
            return;
        }
        self.pieces_placed += 1;
        debug!(
            pivot = ?piece.pivot.pos(),
            second = ?piece.second.pos(),
            occupied = self.board.occupied(),
            "piece locked"
        );

        // A horizontal pair can land on uneven ground; settle it before matching.
        self.board.apply_gravity();
        self.chain = 0;

        if self.mark_groups() {
            self.phase = Phase::Resolving;
            if !self.animate {
                self.resolve_to_fixpoint();
            }
        } else {
            self.spawn_next();
        }
    }

    /// Mark every qualifying group for removal. Returns true if anything was marked.
    fn mark_groups(&mut self) -> bool {
        self.clearing = self.board.find_groups().into_iter().flatten().collect();
        !self.clearing.is_empty()
    }

    /// Run one resolution pass: remove marked cells, apply gravity, score, and mark the
    /// next groups. Returns true while more passes remain.
    pub fn advance_resolution(&mut self) -> bool {
        if self.phase != Phase::Resolving {
            return false;
        }
        let removed = self.board.remove(&self.clearing);
        self.clearing.clear();
        self.board.apply_gravity();

        self.score += removed as u32;
        self.chain += 1;
        self.max_chain = self.max_chain.max(self.chain);
        self.events.push(ScoreEvent::ScoreChanged(self.score));
        info!(chain = self.chain, removed, score = self.score, "cleared");

        if self.mark_groups() {
            return true;
        }
        self.phase = Phase::Falling;
        self.spawn_next();
        false
    }

    pub fn resolve_to_fixpoint(&mut self) {
        while self.advance_resolution() {}
    }

    fn overlaps_board(&self, piece: &Piece) -> bool {
        piece.positions().iter().any(|&(x, y)| {
            x >= 0
                && y >= 0
                && matches!(self.board.get(x as usize, y as usize), Some(Cell::Puyo(_)))
        })
    }

    /// Bring in the next piece. A blocked spawn is lifted above the top so the next
    /// drop locks it out.
    fn spawn_next(&mut self) {
        let mut piece = self.generator.next();
        while self.overlaps_board(&piece) {
            piece = piece.translated(0, -1);
        }
        if piece.pivot.y < 0 || piece.second.y < 0 {
            debug!(pivot_y = piece.pivot.y, "spawn blocked");
        }
        self.piece = Some(piece);
    }

    fn top_out(&mut self) {
        self.phase = Phase::GameOver;
        self.clearing.clear();
        self.events.push(ScoreEvent::GameOver {
            score: self.score,
            max_chain: self.max_chain,
        });
        info!(score = self.score, max_chain = self.max_chain, "game over");
    }

    /// Reinitialise board, score, flags, active piece and lookahead. Settings are kept.
    pub fn restart(&mut self) {
        self.board = Board::new();
        self.generator.reset_queue();
        self.piece = Some(self.generator.next());
        self.phase = Phase::Falling;
        self.clearing.clear();
        self.score = 0;
        self.chain = 0;
        self.max_chain = 0;
        self.pieces_placed = 0;
        self.events.push(ScoreEvent::ScoreChanged(0));
        info!(palette = self.generator.palette_size(), "restart");
    }

    /// Set how many colours new pieces draw from (clamped to 2..=4).
    pub fn set_palette(&mut self, size: usize) -> usize {
        self.generator.set_palette_size(size);
        let size = self.generator.palette_size();
        info!(size, "palette changed");
        size
    }

    /// Set the gravity interval (clamped). The host resets its timer on change.
    pub fn set_tick_interval_ms(&mut self, ms: u64) -> u64 {
        self.tick_interval_ms = ms.clamp(MIN_TICK_MS, MAX_TICK_MS);
        info!(ms = self.tick_interval_ms, "tick interval changed");
        self.tick_interval_ms
    }

    pub fn board_view(&self) -> BoardView {
        let mut cells = *self.board.rows();
        if let Some(piece) = self.piece {
            for puyo in [piece.pivot, piece.second] {
                if (0..WIDTH as i32).contains(&puyo.x) && (0..HEIGHT as i32).contains(&puyo.y) {
                    cells[puyo.y as usize][puyo.x as usize] = Cell::Puyo(puyo.color);
                }
            }
        }
        BoardView {
            cells,
            clearing: self.clearing.clone(),
        }
    }

    pub fn next_preview(&self) -> Vec<(PuyoColor, PuyoColor)> {
        self.generator.queue().map(Piece::colors).collect()
    }

    pub fn take_events(&mut self) -> Vec<ScoreEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    pub fn is_resolving(&self) -> bool {
        self.phase == Phase::Resolving
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn piece(&self) -> Option<&Piece> {
        self.piece.as_ref()
    }

    #[cfg(test)]
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn chain(&self) -> u32 {
        self.chain
    }

    pub fn max_chain(&self) -> u32 {
        self.max_chain
    }

    pub fn pieces_placed(&self) -> u32 {
        self.pieces_placed
    }

    pub fn palette_size(&self) -> usize {
        self.generator.palette_size()
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn animates(&self) -> bool {
        self.animate
    }

    /// Replace the board and active piece (test setup).
    #[cfg(test)]
    fn with_setup(config: &GameConfig, board: Board, piece: Option<Piece>) -> Self {
        let mut state = Self::new(config);
        state.board = board;
        match piece {
            Some(p) => state.piece = Some(p),
            None => state.spawn_next(),
        }
        state
    }
}
