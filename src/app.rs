//! App: terminal init, main loop, gravity timer, resolution pacing and key handling.
//!
//! Timer ticks and key commands are applied from this one loop, so the engine
//! never sees two mutations interleave.

use crate::game::{GameState, MAX_TICK_MS, MIN_TICK_MS, ScoreEvent, Step};
use crate::input::{Action, key_to_action};
use crate::persistence::ScoreSink;
use crate::piece::{MAX_PALETTE, MIN_PALETTE};
use crate::theme::Theme;
use crate::ui::{self, Hud};
use crate::{Args, GameConfig};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::time::{Duration, Instant};
use tachyonfx::Effect;
use tracing::{debug, info};

/// Step for +/- and the menu speed selector.
const TICK_STEP_MS: u64 = 50;
/// Upper bound on one loop iteration (≈60 FPS).
const FRAME_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuTab {
    Colors,
    Speed,
    Start,
}

impl MenuTab {
    fn next(self) -> Self {
        match self {
            Self::Colors => Self::Speed,
            Self::Speed => Self::Start,
            Self::Start => Self::Colors,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Colors => Self::Start,
            Self::Speed => Self::Colors,
            Self::Start => Self::Speed,
        }
    }
}

/// Settings picked on the menu before a game starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuState {
    pub current_tab: MenuTab,
    pub palette_size: usize,
    pub tick_ms: u64,
}

impl MenuState {
    pub fn new(palette_size: usize, tick_ms: u64) -> Self {
        Self {
            current_tab: MenuTab::Start,
            palette_size,
            tick_ms,
        }
    }

    /// Left (-1) / right (+1) on the selected row.
    fn change(&mut self, delta: i64) {
        match self.current_tab {
            MenuTab::Colors => {
                let size = self.palette_size as i64 + delta;
                self.palette_size = size.clamp(MIN_PALETTE as i64, MAX_PALETTE as i64) as usize;
            }
            MenuTab::Speed => {
                let ms = self.tick_ms as i64 + delta * TICK_STEP_MS as i64;
                self.tick_ms = ms.clamp(MIN_TICK_MS as i64, MAX_TICK_MS as i64) as u64;
            }
            MenuTab::Start => {}
        }
    }
}

pub struct App {
    theme: Theme,
    state: GameState,
    screen: Screen,
    paused: bool,
    last_tick: Instant,
    /// When the current resolution pass was marked.
    last_pass: Instant,
    clear_delay: Duration,
    best: u32,
    /// Set when the last game over beat the previous best.
    new_record: bool,
    sink: Box<dyn ScoreSink>,
    clear_effect: Option<Effect>,
    clear_effect_process_time: Option<Instant>,
    menu_state: MenuState,
}

impl App {
    pub fn new(args: &Args, config: &GameConfig, theme: Theme, sink: Box<dyn ScoreSink>, best: u32) -> Self {
        let state = GameState::new(config);
        let menu_state = MenuState::new(state.palette_size(), state.tick_interval_ms());
        let screen = if args.no_menu {
            Screen::Playing
        } else {
            Screen::Menu
        };
        let now = Instant::now();
        Self {
            theme,
            state,
            screen,
            paused: false,
            last_tick: now,
            last_pass: now,
            clear_delay: Duration::from_millis(config.clear_delay_ms),
            best,
            new_record: false,
            sink,
            clear_effect: None,
            clear_effect_process_time: None,
            menu_state,
        }
    }

    fn reset_timers(&mut self) {
        let now = Instant::now();
        self.last_tick = now;
        self.last_pass = now;
        self.clear_effect = None;
        self.clear_effect_process_time = None;
    }

    fn start_game(&mut self) {
        self.state.set_palette(self.menu_state.palette_size);
        self.state.set_tick_interval_ms(self.menu_state.tick_ms);
        self.restart();
    }

    fn restart(&mut self) {
        self.state.restart();
        self.new_record = false;
        self.screen = Screen::Playing;
        self.paused = false;
        self.reset_timers();
    }

    /// A lock that starts a chain begins the first clearing pause.
    fn after_drop(&mut self, step: Step) {
        if step == Step::Locked && self.state.is_resolving() {
            self.last_pass = Instant::now();
            self.clear_effect = None;
            self.clear_effect_process_time = None;
        }
    }

    fn change_speed(&mut self, delta_ms: i64) {
        let ms = (self.state.tick_interval_ms() as i64 + delta_ms).max(0) as u64;
        let ms = self.state.set_tick_interval_ms(ms);
        self.menu_state.tick_ms = ms;
        // Timer is reconfigured from now.
        self.last_tick = Instant::now();
    }

    /// Apply one key action. Returns true when the app should exit.
    fn handle_action(&mut self, action: Action) -> bool {
        if action == Action::Quit {
            return true;
        }
        match self.screen {
            Screen::Menu => match action {
                Action::Rotate => self.menu_state.current_tab = self.menu_state.current_tab.prev(),
                Action::SoftDrop => self.menu_state.current_tab = self.menu_state.current_tab.next(),
                Action::MoveLeft => self.menu_state.change(-1),
                Action::MoveRight => self.menu_state.change(1),
                Action::Palette(n) => self.menu_state.palette_size = n,
                Action::Confirm => {
                    if self.menu_state.current_tab == MenuTab::Start {
                        self.start_game();
                    } else {
                        self.menu_state.current_tab = MenuTab::Start;
                    }
                }
                _ => {}
            },
            Screen::Playing if self.paused => {
                if action == Action::Pause {
                    self.paused = false;
                    self.last_tick = Instant::now();
                }
            }
            Screen::Playing => match action {
                Action::Pause => self.paused = true,
                Action::MoveLeft => {
                    self.state.move_left();
                }
                Action::MoveRight => {
                    self.state.move_right();
                }
                Action::Rotate => {
                    self.state.rotate();
                }
                Action::SoftDrop => {
                    let step = self.state.soft_drop();
                    self.after_drop(step);
                }
                Action::Restart => self.restart(),
                Action::Faster => self.change_speed(-(TICK_STEP_MS as i64)),
                Action::Slower => self.change_speed(TICK_STEP_MS as i64),
                Action::Palette(n) => {
                    self.menu_state.palette_size = self.state.set_palette(n);
                }
                _ => {}
            },
            Screen::GameOver => {
                if matches!(action, Action::Restart | Action::Confirm) {
                    self.restart();
                }
            }
        }
        false
    }

    /// Gravity tick or the next resolution pass, whichever is due.
    fn advance(&mut self, now: Instant) {
        if self.screen != Screen::Playing || self.paused || self.state.is_game_over() {
            return;
        }
        if self.state.is_resolving() {
            if now.duration_since(self.last_pass) >= self.clear_delay {
                self.state.advance_resolution();
                self.last_pass = now;
                self.clear_effect = None;
                self.clear_effect_process_time = None;
                if !self.state.is_resolving() {
                    // Fresh piece gets a full interval before its first fall.
                    self.last_tick = now;
                }
            }
            return;
        }
        let interval = Duration::from_millis(self.state.tick_interval_ms());
        if now.duration_since(self.last_tick) >= interval {
            self.last_tick = now;
            let step = self.state.soft_drop();
            self.after_drop(step);
        }
    }

    /// Hand engine events to the sink and track the best score.
    fn forward_events(&mut self) {
        for event in self.state.take_events() {
            if let ScoreEvent::GameOver { score, .. } = event {
                info!(score, best = self.best, "game finished");
                self.new_record = score > self.best;
                self.best = self.best.max(score);
                self.screen = Screen::GameOver;
            }
            self.sink.notify(event);
        }
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;
        terminal.hide_cursor()?;

        let result = self.run_loop(&mut terminal);

        // Restore
        let _ = terminal.show_cursor();
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            let hud = Hud {
                paused: self.paused,
                best: self.best,
                new_record: self.new_record,
                clear_fade_ms: if self.state.animates() {
                    self.clear_delay.as_millis().min(u32::MAX as u128) as u32
                } else {
                    0
                },
            };
            terminal.draw(|f| {
                ui::draw(
                    f,
                    self.screen,
                    &self.state,
                    &self.theme,
                    hud,
                    &self.menu_state,
                    &mut self.clear_effect,
                    &mut self.clear_effect_process_time,
                    now,
                );
            })?;

            let timeout = Duration::from_millis(FRAME_MS).saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    let action = key_to_action(key);
                    debug!(?action, "key");
                    if self.handle_action(action) {
                        return Ok(());
                    }
                    self.forward_events();
                }
            }

            self.advance(Instant::now());
            self.forward_events();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::NullSink;
    use clap::Parser;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct RecordingSink(Rc<RefCell<Vec<ScoreEvent>>>);

    impl ScoreSink for RecordingSink {
        fn notify(&self, event: ScoreEvent) {
            self.0.borrow_mut().push(event);
        }
    }

    fn app_with(sink: Box<dyn ScoreSink>, no_menu: bool) -> App {
        let mut argv = vec!["puyotui", "--seed", "5"];
        if no_menu {
            argv.push("--no-menu");
        }
        let args = Args::parse_from(argv);
        let config = GameConfig::from(&args);
        App::new(&args, &config, Theme::default(), sink, 0)
    }

    #[test]
    fn menu_applies_settings_on_start() {
        let mut app = app_with(Box::new(NullSink), false);
        assert_eq!(app.screen, Screen::Menu);
        app.handle_action(Action::SoftDrop); // Start -> Colors
        app.handle_action(Action::MoveLeft);
        app.handle_action(Action::SoftDrop); // Colors -> Speed
        app.handle_action(Action::MoveLeft);
        app.handle_action(Action::Confirm); // jump to Start
        app.handle_action(Action::Confirm);
        assert_eq!(app.screen, Screen::Playing);
        assert_eq!(app.state.palette_size(), 3);
        assert_eq!(app.state.tick_interval_ms(), 450);
    }

    #[test]
    fn speed_keys_adjust_interval() {
        let mut app = app_with(Box::new(NullSink), true);
        app.handle_action(Action::Faster);
        assert_eq!(app.state.tick_interval_ms(), 450);
        app.handle_action(Action::Slower);
        app.handle_action(Action::Slower);
        assert_eq!(app.state.tick_interval_ms(), 550);
    }

    #[test]
    fn pause_blocks_commands() {
        let mut app = app_with(Box::new(NullSink), true);
        let before = app.state.piece().copied();
        app.handle_action(Action::Pause);
        app.handle_action(Action::MoveLeft);
        app.handle_action(Action::SoftDrop);
        assert_eq!(app.state.piece().copied(), before);
        app.handle_action(Action::Pause);
        app.handle_action(Action::MoveLeft);
        assert_ne!(app.state.piece().copied(), before);
    }

    #[test]
    fn quit_exits_from_any_screen() {
        let mut app = app_with(Box::new(NullSink), false);
        assert!(app.handle_action(Action::Quit));
    }

    /// Stack the spawn column until the game tops out.
    fn play_until_game_over(app: &mut App) {
        for _ in 0..2000 {
            if app.screen == Screen::GameOver {
                break;
            }
            app.handle_action(Action::SoftDrop);
            app.state.resolve_to_fixpoint();
            app.forward_events();
        }
        assert_eq!(app.screen, Screen::GameOver);
    }

    #[test]
    fn game_over_reaches_sink_and_screen() {
        let sink = RecordingSink::default();
        let mut app = app_with(Box::new(sink.clone()), true);
        play_until_game_over(&mut app);
        assert!(matches!(
            sink.0.borrow().last(),
            Some(ScoreEvent::GameOver { .. })
        ));
        let final_score = app.state.score();
        assert_eq!(app.best, final_score);
        assert_eq!(app.new_record, final_score > 0);

        app.handle_action(Action::Restart);
        assert_eq!(app.screen, Screen::Playing);
        assert_eq!(app.state.score(), 0);
        assert_eq!(app.best, final_score);
        assert!(!app.new_record);
    }

    #[test]
    fn lower_score_keeps_previous_best() {
        let mut app = app_with(Box::new(NullSink), true);
        app.best = u32::MAX;
        play_until_game_over(&mut app);
        assert_eq!(app.best, u32::MAX);
        assert!(!app.new_record);
    }
}
