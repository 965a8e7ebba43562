use std::time::Duration;
use tracing::trace;

use crate::domain::{AVConfig, AVError, Message};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, AVError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Up | KeyCode::Char('k') => Some(Message::MoveUp),
            KeyCode::Down | KeyCode::Char('j') => Some(Message::MoveDown),
            KeyCode::Left | KeyCode::Char('h') => Some(Message::MoveLeft),
            KeyCode::Right | KeyCode::Char('l') => Some(Message::MoveRight),
            KeyCode::PageUp => Some(Message::MovePageUp),
            KeyCode::PageDown => Some(Message::MovePageDown),
            KeyCode::Home | KeyCode::Char('g') => Some(Message::MoveBeginning),
            KeyCode::End | KeyCode::Char('G') => Some(Message::MoveEnd),
            KeyCode::Enter => Some(Message::Enter),
            KeyCode::Esc => Some(Message::Exit),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Char('f') => Some(Message::FilterMenu),
            KeyCode::Char('x') => Some(Message::ClearColumnFilter),
            KeyCode::Char('X') => Some(Message::ClearAllFilters),
            KeyCode::Char('/') => Some(Message::Search),
            KeyCode::Char('o') => Some(Message::Open),
            KeyCode::Char('r') => Some(Message::Reload),
            KeyCode::Char('w') => Some(Message::Export),
            KeyCode::Char('c') => Some(Message::CopyCell),
            KeyCode::Char('C') => Some(Message::CopyRow),
            KeyCode::Char('v') => Some(Message::HideColumn),
            KeyCode::Char('V') => Some(Message::ShowAllColumns),
            KeyCode::Char('i') => Some(Message::ToggleIndex),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
