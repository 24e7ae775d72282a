use std::time::Duration;
use tracing::trace;

use crate::domain::{AppConfig, Message, PharmError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Wait up to one poll interval for input. `None` still lets the model tick.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, PharmError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    Self::handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    fn handle_key(key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(Message::MoveLeft),
            (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(Message::MoveRight),
            (KeyCode::Char('n'), _) | (KeyCode::PageDown, _) => Some(Message::NextPage),
            (KeyCode::Char('p'), _) | (KeyCode::PageUp, _) => Some(Message::PrevPage),
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char(c @ '1'..='9'), _) => c.to_digit(10).map(|d| Message::Jump(d as usize)),
            (KeyCode::Tab, _) => Some(Message::NextTab),
            (KeyCode::BackTab, _) => Some(Message::PrevTab),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('d'), _) | (KeyCode::Delete, _) => Some(Message::Delete),
            (KeyCode::Char('e'), _) => Some(Message::EditField),
            (KeyCode::Char('c'), _) => Some(Message::Create),
            (KeyCode::Char('i'), _) => Some(Message::UploadImage),
            (KeyCode::Char('f'), _) => Some(Message::UploadPdf),
            (KeyCode::Char('b'), _) => Some(Message::CreateBackup),
            (KeyCode::Char('B'), _) => Some(Message::DownloadBackup),
            (KeyCode::Char('L'), _) => Some(Message::Login),
            (KeyCode::Char('O'), _) => Some(Message::Logout),
            (KeyCode::Char('t'), _) => Some(Message::ToggleLanguage),
            (KeyCode::Char('r'), _) => Some(Message::Refresh),
            (KeyCode::Char('y'), _) => Some(Message::CopyCell),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode) -> Option<Message> {
        Controller::handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn vim_and_arrow_keys_agree() {
        assert_eq!(map(KeyCode::Char('j')), map(KeyCode::Down));
        assert_eq!(map(KeyCode::Char('l')), Some(Message::MoveRight));
        assert_eq!(map(KeyCode::PageDown), Some(Message::NextPage));
    }

    #[test]
    fn digits_jump() {
        assert_eq!(map(KeyCode::Char('3')), Some(Message::Jump(3)));
        assert_eq!(map(KeyCode::Char('0')), None);
    }

    #[test]
    fn admin_keys() {
        assert_eq!(map(KeyCode::Char('t')), Some(Message::ToggleLanguage));
        assert_eq!(map(KeyCode::Char('L')), Some(Message::Login));
        assert_eq!(map(KeyCode::Char('B')), Some(Message::DownloadBackup));
        assert_eq!(
            Controller::handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Message::Quit)
        );
    }
}
