//! Key bindings: arrows plus vim-style letters.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Action from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveLeft,
    MoveRight,
    Rotate,
    SoftDrop,
    Restart,
    Pause,
    Faster,
    Slower,
    Palette(usize),
    Confirm,
    Quit,
    None,
}

/// Map key event to game action. Rotate is on both Up and Space.
pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent { code, modifiers, .. } = key;
    if modifiers == KeyModifiers::CONTROL && code == KeyCode::Char('c') {
        return Action::Quit;
    }
    let no_mod = modifiers.is_empty() || modifiers == KeyModifiers::SHIFT;
    if !no_mod {
        return Action::None;
    }
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('p') => Action::Pause,
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Restart,
        KeyCode::Left | KeyCode::Char('h') => Action::MoveLeft,
        KeyCode::Right | KeyCode::Char('l') => Action::MoveRight,
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('x') | KeyCode::Char(' ') => {
            Action::Rotate
        }
        KeyCode::Down | KeyCode::Char('j') => Action::SoftDrop,
        KeyCode::Char('+') | KeyCode::Char('=') => Action::Faster,
        KeyCode::Char('-') => Action::Slower,
        KeyCode::Char(c @ '2'..='4') => Action::Palette(c as usize - '0' as usize),
        KeyCode::Enter => Action::Confirm,
        _ => Action::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_and_vim_keys_agree() {
        assert_eq!(key_to_action(key(KeyCode::Left)), Action::MoveLeft);
        assert_eq!(key_to_action(key(KeyCode::Char('h'))), Action::MoveLeft);
        assert_eq!(key_to_action(key(KeyCode::Right)), Action::MoveRight);
        assert_eq!(key_to_action(key(KeyCode::Char('l'))), Action::MoveRight);
        assert_eq!(key_to_action(key(KeyCode::Down)), Action::SoftDrop);
        assert_eq!(key_to_action(key(KeyCode::Char('j'))), Action::SoftDrop);
    }

    #[test]
    fn rotate_on_up_and_space() {
        assert_eq!(key_to_action(key(KeyCode::Up)), Action::Rotate);
        assert_eq!(key_to_action(key(KeyCode::Char(' '))), Action::Rotate);
    }

    #[test]
    fn palette_digits() {
        assert_eq!(key_to_action(key(KeyCode::Char('2'))), Action::Palette(2));
        assert_eq!(key_to_action(key(KeyCode::Char('4'))), Action::Palette(4));
        assert_eq!(key_to_action(key(KeyCode::Char('5'))), Action::None);
    }

    #[test]
    fn control_chords_are_ignored() {
        let ev = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert_eq!(key_to_action(ev), Action::None);
        let ev = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_to_action(ev), Action::Quit);
    }
}
