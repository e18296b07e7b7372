use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};
use serde_json::Value;

use crate::dashboard::app::App;
use crate::dashboard::screen::{Screen, MENU};
use crate::monitor::unit::{DesiredMode, Unit};
use crate::scripts::script::{Script, ScriptStatus};
use crate::utils::format_elapsed;

const NAME_WIDTH: usize = 40;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header
            Constraint::Min(5),    // Screen body
            Constraint::Length(1), // Key help
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    let help = match app.nav.screen() {
        Screen::TopLevel => {
            draw_menu(f, app, chunks[1]);
            "j/k move, enter or number select, q quit"
        }
        Screen::Units => {
            draw_units(f, app, chunks[1]);
            if app.unit_entry.is_some() {
                "enter add, esc cancel"
            } else {
                "j/k move, enter or number for details, / watch another unit, q back"
            }
        }
        Screen::UnitInfo(index) => {
            draw_unit_info(f, app.units.units.get(index), chunks[1]);
            "q back"
        }
        Screen::Scripts => {
            draw_scripts(f, app, chunks[1]);
            "q back"
        }
    };

    let help = Paragraph::new(Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))));
    f.render_widget(help, chunks[2]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let mut text = vec![Line::from(vec![
        Span::styled(
            "spirit-box ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.device.label()),
    ])];

    if let Some(state) = app.bootstrap {
        text.push(Line::from(vec![
            Span::styled("network bootstrap: ", Style::default().fg(Color::DarkGray)),
            Span::raw(format!("{:?}", state)),
        ]));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_menu(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = MENU
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let item = ListItem::new(format!("{}{}. {}", marker(i == app.nav.cursor()), i + 1, option));
            if i == app.nav.cursor() {
                item.style(selected())
            } else {
                item
            }
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    f.render_widget(List::new(items).block(block), area);
}

fn draw_units(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = &app.units;
    let (summary, color) = if snapshot.all_ready {
        ("All units are ready.", Color::Green)
    } else {
        ("waiting...", Color::Red)
    };

    let mut items = vec![
        ListItem::new(Line::from(vec![
            Span::raw(format!(
                "Watching {} units ({}): ",
                snapshot.units.len(),
                format_elapsed(app.elapsed)
            )),
            Span::styled(summary, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ])),
        ListItem::new(""),
    ];

    for (i, unit) in snapshot.units.iter().enumerate() {
        let (label, color) = readiness(unit);
        let line = Line::from(vec![
            Span::raw(format!(
                "{}{:<width$} {:>9} {:>10} {:>7} ",
                marker(i == app.nav.cursor()),
                format!("{}:", unit.name()),
                unit.load_state(),
                unit.active_state(),
                unit.sub_state(),
                width = NAME_WIDTH,
            )),
            Span::styled(
                format!("{:>9}", label),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(" {}", unit.description())),
        ]);

        let item = ListItem::new(line);
        items.push(if i == app.nav.cursor() { item.style(selected()) } else { item });
    }

    if let Some(entry) = &app.unit_entry {
        items.push(ListItem::new(""));
        items.push(ListItem::new(Line::from(vec![
            Span::styled("Add unit: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}_", entry)),
        ])));
    }

    let block = Block::default()
        .title(" Units ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    f.render_widget(List::new(items).block(block), area);
}

fn draw_unit_info(f: &mut Frame, unit: Option<&Unit>, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let Some(unit) = unit else {
        f.render_widget(Paragraph::new("Unit is no longer watched").block(block), area);
        return;
    };

    let (label, color) = readiness(unit);
    let block = block.title(Line::from(vec![
        Span::raw(format!(" {} ", unit.name())),
        Span::styled(format!("{} ", label), Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ]));

    let mut keys: Vec<&String> = unit.properties().keys().collect();
    keys.sort();
    let lines: Vec<Line> = keys
        .into_iter()
        .map(|key| {
            let value = match &unit.properties()[key] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Line::from(vec![
                Span::styled(format!("{}: ", key), Style::default().fg(Color::Cyan)),
                Span::raw(value),
            ])
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}

fn draw_scripts(f: &mut Frame, app: &App, area: Rect) {
    let run = &app.scripts;
    let (state, color) = if run.finished {
        ("finished", Color::Green)
    } else if run.current.is_some() {
        ("running", Color::Yellow)
    } else {
        ("not started", Color::Reset)
    };

    let mut lines = vec![
        Line::from(vec![
            Span::raw(format!("{} scripts in {} groups: ", run.num_scripts(), run.groups.len())),
            Span::styled(state, Style::default().fg(color)),
        ]),
        Line::from(""),
    ];

    for group in &run.groups {
        lines.push(Line::from(Span::styled(
            format!("priority {}", group.priority),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for script in &group.scripts {
            let (label, style) = script_status(script);
            lines.push(Line::from(vec![
                Span::raw(format!("   {:<width$} ", script.name(), width = NAME_WIDTH)),
                Span::styled(label, style),
            ]));
            if let Some(error) = &script.error {
                lines.push(Line::from(Span::styled(
                    format!("      {}", error),
                    Style::default().fg(Color::Red),
                )));
            }
        }
    }

    let block = Block::default()
        .title(" Scripts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn marker(selected: bool) -> &'static str {
    if selected {
        "-> "
    } else {
        "   "
    }
}

fn selected() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn readiness(unit: &Unit) -> (&'static str, Color) {
    if unit.desired_mode() == DesiredMode::WatchOnly {
        ("WATCHING", Color::Green)
    } else if unit.is_ready() {
        ("READY", Color::Green)
    } else {
        ("NOT READY", Color::Red)
    }
}

fn script_status(script: &Script) -> (String, Style) {
    let took = match (script.started_at, script.finished_at) {
        (Some(start), Some(end)) => (end - start)
            .to_std()
            .map(|d| format!(" ({})", format_elapsed(d)))
            .unwrap_or_default(),
        _ => String::new(),
    };

    let style = match script.status {
        ScriptStatus::Pending if script.interpreter.is_none() && script.started_at.is_none() => {
            Style::default().fg(Color::DarkGray)
        }
        ScriptStatus::Pending => Style::default(),
        ScriptStatus::Running => Style::default().fg(Color::Yellow),
        ScriptStatus::Succeeded => Style::default().fg(Color::Green),
        ScriptStatus::Failed => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    };
    (format!("{:?}{}", script.status, took).to_lowercase(), style)
}
