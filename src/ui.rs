//! Layout and drawing: settings menu, board, next preview, stats, pause and game over overlays.

use crate::app::{MenuState, MenuTab, Screen};
use crate::board::{Cell, HEIGHT, WIDTH};
use crate::game::{BoardView, GameState};
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Terminal columns per board cell (keeps puyos roughly square).
const CELL_WIDTH: u16 = 2;
const CELL_HEIGHT: u16 = 1;
const SIDEBAR_WIDTH: u16 = 24;
const PUYO_SYMBOL: &str = "██";
const EMPTY_SYMBOL: &str = " ·";

/// Things the host knows that the engine does not.
#[derive(Debug, Clone, Copy)]
pub struct Hud {
    pub paused: bool,
    pub best: u32,
    /// The finished game beat the previous best.
    pub new_record: bool,
    /// Fade length for clearing cells; 0 disables the effect.
    pub clear_fade_ms: u32,
}

/// Board size including border.
fn board_outer_size() -> (u16, u16) {
    (WIDTH as u16 * CELL_WIDTH + 2, HEIGHT as u16 * CELL_HEIGHT + 2)
}

/// Board (with border) and sidebar rects, centred in `area`.
fn game_layout(area: Rect) -> (Rect, Rect) {
    let (bw, bh) = board_outer_size();
    let total_w = bw + SIDEBAR_WIDTH;
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(bh.max(17)),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(bw), Constraint::Length(SIDEBAR_WIDTH)])
        .split(vert[1]);
    let board = Rect {
        height: bh.min(inner[0].height),
        ..inner[0]
    };
    (board, inner[1])
}

/// Inner board rect (no border).
fn board_inner_rect(area: Rect) -> Rect {
    let (outer, _) = game_layout(area);
    Rect {
        x: outer.x + 1,
        y: outer.y + 1,
        width: outer.width.saturating_sub(2),
        height: outer.height.saturating_sub(2),
    }
}

/// Buffer positions covered by the clearing cells.
fn clearing_buffer_positions(board_rect: Rect, clearing: &[(usize, usize)]) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for &(cx, cy) in clearing {
        let x0 = board_rect.x + cx as u16 * CELL_WIDTH;
        let y0 = board_rect.y + cy as u16 * CELL_HEIGHT;
        for bx in x0..(x0 + CELL_WIDTH).min(board_rect.x + board_rect.width) {
            for by in y0..(y0 + CELL_HEIGHT).min(board_rect.y + board_rect.height) {
                set.insert((bx, by));
            }
        }
    }
    set
}

/// Create (once per pass) and process the fade of clearing cells to the background.
fn apply_clear_effect(
    frame: &mut Frame,
    view: &BoardView,
    theme: &Theme,
    area: Rect,
    fade_ms: u32,
    effect: &mut Option<Effect>,
    process_time: &mut Option<Instant>,
    now: Instant,
) {
    let board_rect = board_inner_rect(area);
    let delta = process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    *process_time = Some(now);

    if effect.is_none() {
        let clearing_set = clearing_buffer_positions(board_rect, &view.clearing);
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            clearing_set.contains(&(pos.x, pos.y))
        }));
        let fade = fx::fade_to(theme.bg, theme.bg, (fade_ms, Interpolation::Linear))
            .with_filter(filter)
            .with_area(board_rect);
        *effect = Some(fade);
    }

    if let Some(effect) = effect {
        frame.render_effect(effect, board_rect, TfxDuration::from_millis(delta_ms));
    }
}

/// Draw the current screen.
pub fn draw(
    frame: &mut Frame,
    screen: Screen,
    state: &GameState,
    theme: &Theme,
    hud: Hud,
    menu_state: &MenuState,
    clear_effect: &mut Option<Effect>,
    clear_effect_time: &mut Option<Instant>,
    now: Instant,
) {
    let area = frame.area();
    match screen {
        Screen::Menu => draw_menu(frame, theme, menu_state, area),
        Screen::Playing => {
            let view = state.board_view();
            draw_game(frame, state, &view, theme, hud, area);
            if hud.paused {
                draw_pause_overlay(frame, theme, area);
            } else if !view.clearing.is_empty() && hud.clear_fade_ms > 0 {
                apply_clear_effect(
                    frame,
                    &view,
                    theme,
                    area,
                    hud.clear_fade_ms,
                    clear_effect,
                    clear_effect_time,
                    now,
                );
            }
        }
        Screen::GameOver => {
            let view = state.board_view();
            draw_game(frame, state, &view, theme, hud, area);
            draw_game_over(frame, state, theme, hud, area);
        }
    }
}

fn popup_rect(area: Rect, w: u16, h: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

fn bold(style: Style) -> Style {
    style.add_modifier(Modifier::BOLD)
}

fn draw_menu(frame: &mut Frame, theme: &Theme, menu_state: &MenuState, area: Rect) {
    let popup = popup_rect(area, 40, 17);
    let highlight = bold(Style::default().fg(Color::Black).bg(theme.title));
    let normal = Style::default().fg(theme.main_fg);
    let tab_style = |tab: MenuTab| {
        if menu_state.current_tab == tab {
            highlight
        } else {
            normal
        }
    };

    let mut colour_spans = vec![Span::styled(
        format!(" {} ", menu_state.palette_size),
        tab_style(MenuTab::Colors),
    )];
    colour_spans.push(Span::from("  "));
    for i in 0..menu_state.palette_size {
        let c = theme.puyo_color(i as u8);
        colour_spans.push(Span::styled(PUYO_SYMBOL, Style::default().fg(c)));
    }

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(" Puyo tui ", bold(Style::default().fg(theme.puyo_color(0))))),
        Line::from(""),
        Line::from(Span::styled(" ─ COLOURS ─ ", Style::default().fg(theme.div_line))),
        Line::from(colour_spans),
        Line::from(""),
        Line::from(Span::styled(" ─ DROP INTERVAL ─ ", Style::default().fg(theme.div_line))),
        Line::from(Span::styled(
            format!(" {} ms ", menu_state.tick_ms),
            tab_style(MenuTab::Speed),
        )),
        Line::from(""),
        Line::from(Span::styled(" [ START ] ", tab_style(MenuTab::Start))),
        Line::from(""),
        Line::from(vec![
            Span::styled(" ↕ ", Style::default().fg(theme.puyo_color(2))),
            Span::from("SELECT   "),
            Span::styled(" ↔ ", Style::default().fg(theme.puyo_color(2))),
            Span::from("CHANGE   "),
            Span::styled(" ENTER ", Style::default().fg(theme.puyo_color(2))),
            Span::from("PLAY"),
        ]),
        Line::from(""),
        Line::from(Span::styled(" [Q] QUIT ", Style::default().fg(theme.puyo_color(0)))),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = popup_rect(area, 28, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P — Resume    Q — Quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, state: &GameState, theme: &Theme, hud: Hud, area: Rect) {
    let popup = popup_rect(area, 28, 10);
    let fg = Style::default().fg(theme.main_fg);
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Game Over ",
            Style::default().fg(Color::White).bg(Color::Red),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" Score: {} ", state.score()), fg)),
        Line::from(Span::styled(format!(" Best: {} ", hud.best), fg)),
        Line::from(Span::styled(format!(" Max chain: {} ", state.max_chain()), fg)),
    ];
    if hud.new_record {
        lines.push(Line::from(Span::styled(
            " New record! ",
            bold(Style::default().fg(Color::Yellow)),
        )));
    }
    lines.push(Line::from(Span::styled(" R — Restart    Q — Quit ", fg)));
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
                .title(Span::styled(" Puyo tui ", theme.title)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_game(
    frame: &mut Frame,
    state: &GameState,
    view: &BoardView,
    theme: &Theme,
    hud: Hud,
    area: Rect,
) {
    let (board_area, sidebar_area) = game_layout(area);
    draw_board(frame, view, theme, board_area);
    draw_sidebar(frame, state, theme, hud, sidebar_area);
}

fn cell_style(cell: Cell, clearing: bool, theme: &Theme) -> (&'static str, Style) {
    match cell {
        Cell::Puyo(_) if clearing => (PUYO_SYMBOL, Style::default().fg(theme.flash).bg(theme.bg)),
        Cell::Puyo(c) => (
            PUYO_SYMBOL,
            Style::default().fg(theme.puyo_color(c.index())).bg(theme.bg),
        ),
        Cell::Empty => (EMPTY_SYMBOL, Style::default().fg(theme.div_line).bg(theme.bg)),
    }
}

fn draw_board(frame: &mut Frame, view: &BoardView, theme: &Theme, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let buf = frame.buffer_mut();
    for (y, row) in view.cells.iter().enumerate() {
        for (x, &cell) in row.iter().enumerate() {
            let rx = inner.x + x as u16 * CELL_WIDTH;
            let ry = inner.y + y as u16 * CELL_HEIGHT;
            if rx + CELL_WIDTH > inner.x + inner.width || ry >= inner.y + inner.height {
                continue;
            }
            let (symbol, style) = cell_style(cell, view.is_clearing(x, y), theme);
            buf.set_string(rx, ry, symbol, style);
        }
    }
}

fn draw_sidebar(frame: &mut Frame, state: &GameState, theme: &Theme, hud: Hud, area: Rect) {
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Next
            Constraint::Length(7), // Stats
            Constraint::Length(4), // Settings
        ])
        .split(area);

    // --- Next ---
    let next_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled("Next", title_style));
    let next_inner = next_block.inner(chunks[0]);
    next_block.render(chunks[0], frame.buffer_mut());
    for (i, (pivot, second)) in state.next_preview().into_iter().enumerate() {
        let x = next_inner.x + 1 + i as u16 * (CELL_WIDTH + 2);
        for (dy, color) in [(0u16, pivot), (1, second)] {
            let y = next_inner.y + dy;
            if x + CELL_WIDTH <= next_inner.x + next_inner.width && y < next_inner.y + next_inner.height {
                let style = Style::default().fg(theme.puyo_color(color.index()));
                frame.buffer_mut().set_string(x, y, PUYO_SYMBOL, style);
            }
        }
    }

    // --- Stats ---
    let stats_block = Block::default().borders(Borders::ALL).border_style(border_style);
    let stats_inner = stats_block.inner(chunks[1]);
    stats_block.render(chunks[1], frame.buffer_mut());
    let stat = |label: &'static str, value: String| {
        Line::from(vec![Span::styled(label, title_style), Span::styled(value, fg_style)])
    };
    let stats_lines = vec![
        stat("Score: ", state.score().to_string()),
        stat("Best: ", hud.best.max(state.score()).to_string()),
        stat("Chain: ", state.chain().to_string()),
        stat("Max chain: ", state.max_chain().to_string()),
        stat("Pieces: ", state.pieces_placed().to_string()),
    ];
    Paragraph::new(Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Settings ---
    let settings_block = Block::default().borders(Borders::ALL).border_style(border_style);
    let settings_inner = settings_block.inner(chunks[2]);
    settings_block.render(chunks[2], frame.buffer_mut());
    let mut colours = vec![Span::styled("Colours: ", title_style)];
    for i in 0..state.palette_size() {
        colours.push(Span::styled(
            "█",
            Style::default().fg(theme.puyo_color(i as u8)),
        ));
    }
    let settings_lines = vec![
        Line::from(colours),
        stat("Drop: ", format!("{} ms", state.tick_interval_ms())),
    ];
    Paragraph::new(Text::from(settings_lines)).render(settings_inner, frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GameConfig;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    fn config() -> GameConfig {
        GameConfig {
            palette_size: 3,
            tick_ms: 400,
            clear_delay_ms: 300,
            animate: true,
            seed: Some(3),
        }
    }

    fn render(screen: Screen, state: &GameState, hud: Hud) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let menu = MenuState::new(state.palette_size(), state.tick_interval_ms());
        let mut effect = None;
        let mut effect_time = None;
        terminal
            .draw(|f| {
                draw(
                    f,
                    screen,
                    state,
                    &Theme::default(),
                    hud,
                    &menu,
                    &mut effect,
                    &mut effect_time,
                    Instant::now(),
                );
            })
            .unwrap();
        buffer_text(&terminal)
    }

    const HUD: Hud = Hud { paused: false, best: 77, new_record: false, clear_fade_ms: 300 };

    #[test]
    fn playing_screen_shows_stats_and_settings() {
        let state = GameState::new(&config());
        let text = render(Screen::Playing, &state, HUD);
        assert!(text.contains("Score: 0"));
        assert!(text.contains("Best: 77"));
        assert!(text.contains("Drop: 400 ms"));
        assert!(text.contains("Next"));
    }

    #[test]
    fn pause_and_game_over_overlays() {
        let state = GameState::new(&config());
        let paused = Hud { paused: true, ..HUD };
        assert!(render(Screen::Playing, &state, paused).contains("Paused"));
        let over = render(Screen::GameOver, &state, HUD);
        assert!(over.contains("Game Over"));
        assert!(!over.contains("New record!"));
        let record = Hud { new_record: true, ..HUD };
        assert!(render(Screen::GameOver, &state, record).contains("New record!"));
    }

    #[test]
    fn menu_shows_settings() {
        let state = GameState::new(&config());
        let text = render(Screen::Menu, &state, HUD);
        assert!(text.contains("400 ms"));
        assert!(text.contains("START"));
    }

    #[test]
    fn clearing_positions_scale_with_cell_width() {
        let rect = Rect::new(10, 5, 12, 12);
        let set = clearing_buffer_positions(rect, &[(1, 2)]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&(12, 7)));
        assert!(set.contains(&(13, 7)));
    }
}
