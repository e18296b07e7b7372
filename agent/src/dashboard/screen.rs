//! Dashboard navigation

/// Entries on the top-level menu, in display order
pub const MENU: [&str; 2] = ["units", "scripts"];

/// Dashboard screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    TopLevel,
    Units,
    /// Properties of the unit at this index of the watch list
    UnitInfo(usize),
    Scripts,
}

/// A navigation command decoded from a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Down,
    Up,
    Select,
    /// Select by 1-based position
    Jump(usize),
    Back,
    AddUnit(String),
    /// Leave the dashboard from any screen
    Quit,
}

/// What the dashboard loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Quit,
    AddUnit(String),
}

/// Current screen plus cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    screen: Screen,
    cursor: usize,
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            screen: Screen::TopLevel,
            cursor: 0,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Apply a command; `num_units` bounds the cursor on the units screen
    pub fn apply(&mut self, command: Command, num_units: usize) -> Effect {
        let (screen, cursor, effect) = match (self.screen, command) {
            // Top level
            (Screen::TopLevel, Command::Down) => (Screen::TopLevel, step_down(self.cursor, MENU.len()), Effect::None),
            (Screen::TopLevel, Command::Up) => (Screen::TopLevel, self.cursor.saturating_sub(1), Effect::None),
            (Screen::TopLevel, Command::Select) => (menu_screen(self.cursor), 0, Effect::None),
            (Screen::TopLevel, Command::Jump(n)) if n <= MENU.len() => (menu_screen(n - 1), 0, Effect::None),
            (Screen::TopLevel, Command::Back) => (Screen::TopLevel, self.cursor, Effect::Quit),

            // Units
            (Screen::Units, Command::Down) => (Screen::Units, step_down(self.cursor, num_units), Effect::None),
            (Screen::Units, Command::Up) => (Screen::Units, self.cursor.saturating_sub(1), Effect::None),
            (Screen::Units, Command::Select) if self.cursor < num_units => {
                (Screen::UnitInfo(self.cursor), self.cursor, Effect::None)
            }
            (Screen::Units, Command::Jump(n)) if n <= num_units => (Screen::UnitInfo(n - 1), n - 1, Effect::None),
            (Screen::Units, Command::AddUnit(name)) => (Screen::Units, self.cursor, Effect::AddUnit(name)),
            (Screen::Units, Command::Back) => (Screen::TopLevel, 0, Effect::None),

            // Details
            (Screen::UnitInfo(index), Command::Back) => (Screen::Units, index, Effect::None),
            (Screen::Scripts, Command::Back) => (Screen::TopLevel, 1, Effect::None),

            (screen, Command::Quit) => (screen, self.cursor, Effect::Quit),

            // Anything else leaves the view unchanged
            (screen, _) => (screen, self.cursor, Effect::None),
        };

        self.screen = screen;
        self.cursor = cursor;
        effect
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

fn step_down(cursor: usize, len: usize) -> usize {
    if cursor + 1 < len {
        cursor + 1
    } else {
        cursor
    }
}

fn menu_screen(index: usize) -> Screen {
    match index {
        0 => Screen::Units,
        _ => Screen::Scripts,
    }
}
