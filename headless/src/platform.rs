use tracing::debug;

/// Host window services the simulation may ask for.
pub trait Platform {
    fn hide_cursor(&mut self);

    fn show_cursor(&mut self);

    fn is_cursor_locked(&self) -> bool;
}

/// No window; only remembers what was asked for.
#[derive(Debug, Default)]
pub struct Headless {
    cursor_locked: bool,
}

impl Platform for Headless {
    fn hide_cursor(&mut self) {
        debug!("Cursor locked");
        self.cursor_locked = true;
    }

    fn show_cursor(&mut self) {
        debug!("Cursor released");
        self.cursor_locked = false;
    }

    fn is_cursor_locked(&self) -> bool { self.cursor_locked }
}
