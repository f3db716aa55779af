use crate::app::{format_clock, format_progress, App, Focus, StatusKind};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use typify_core::{GameSnapshot, GameState, GameSummary, VisibleLine, MUSICAL_NOTE};

const ACCENT: Color = Color::Green;

/// Render one frame.
pub fn draw(frame: &mut Frame, app: &App, snapshot: &GameSnapshot) {
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(5),
        Constraint::Length(2),
    ])
    .areas(frame.area());

    draw_header(frame, header, snapshot);

    match snapshot.state {
        GameState::Countdown | GameState::Active | GameState::Paused => {
            draw_lyrics(frame, body, snapshot);
        }
        GameState::Ended => draw_summary(frame, body, snapshot.summary.as_ref()),
        GameState::Idle | GameState::Searching | GameState::TrackSelected => {
            draw_browser(frame, body, app, snapshot);
        }
    }

    draw_footer(frame, footer, app, snapshot.state);
}

fn draw_header(frame: &mut Frame, area: Rect, snapshot: &GameSnapshot) {
    let bold = Style::new().add_modifier(Modifier::BOLD);
    let title = snapshot
        .track
        .as_ref()
        .map_or_else(|| "No track selected".to_string(), ToString::to_string);

    let mut spans = vec![
        Span::styled(title, bold),
        Span::raw("  "),
        Span::styled(
            format!("[{}]", snapshot.state),
            Style::new().fg(Color::Yellow),
        ),
    ];
    if snapshot.state.is_running() || snapshot.state == GameState::Ended {
        spans.extend([
            Span::raw("  "),
            Span::raw(format_clock(snapshot.elapsed_ms)),
            Span::raw("  "),
            Span::raw(format_progress(snapshot)),
            Span::raw("  score "),
            Span::styled(snapshot.score.to_string(), bold.fg(ACCENT)),
        ]);
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::bordered().title(" typify ")),
        area,
    );
}

fn draw_lyrics(frame: &mut Frame, area: Rect, snapshot: &GameSnapshot) {
    let mut lines = Vec::new();
    for visible in &snapshot.visible_lines {
        if visible.is_current {
            lines.push(Line::from(Span::styled(
                visible.text.clone(),
                Style::new().add_modifier(Modifier::ITALIC),
            )));
            lines.push(typed_line(visible, &snapshot.per_char_correct));
        } else {
            let style = Style::new().add_modifier(Modifier::DIM);
            lines.push(Line::from(Span::styled(display_text(visible), style)));
        }
        lines.push(Line::default());
    }

    if snapshot.state == GameState::Paused {
        lines.push(Line::from(Span::styled(
            "PAUSED - Esc to resume",
            Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines)
            .centered()
            .wrap(Wrap { trim: false })
            .block(Block::bordered()),
        area,
    );
}

fn display_text(line: &VisibleLine) -> String {
    if line.is_marker && line.text.trim().is_empty() {
        MUSICAL_NOTE.to_string()
    } else {
        line.text.clone()
    }
}

/// The expected text of the current line, coloured by what has been typed.
fn typed_line(line: &VisibleLine, per_char_correct: &[bool]) -> Line<'static> {
    if line.is_marker {
        return Line::from(Span::styled(
            format!("{MUSICAL_NOTE} any key to skip {MUSICAL_NOTE}"),
            Style::new().fg(Color::Magenta),
        ));
    }

    let bold = Style::new().add_modifier(Modifier::BOLD);
    let spans: Vec<Span<'static>> = line
        .expected
        .chars()
        .enumerate()
        .map(|(index, expected)| {
            let style = match per_char_correct.get(index) {
                Some(true) => bold.fg(ACCENT),
                Some(false) => bold.fg(Color::Red).add_modifier(Modifier::UNDERLINED),
                None if index == per_char_correct.len() => {
                    bold.add_modifier(Modifier::UNDERLINED)
                }
                None => Style::new().add_modifier(Modifier::DIM),
            };
            let shown = if expected == ' ' && per_char_correct.get(index) == Some(&false) {
                '·'
            } else {
                expected
            };
            Span::styled(shown.to_string(), style)
        })
        .collect();
    Line::from(spans)
}

fn draw_summary(frame: &mut Frame, area: Rect, summary: Option<&GameSummary>) {
    let bold = Style::new().add_modifier(Modifier::BOLD);
    let lines = summary.map_or_else(
        || vec![Line::from("Game over")],
        |summary| {
            vec![
                Line::from(Span::styled("Game over", bold.fg(ACCENT))),
                Line::default(),
                Line::from(format!("Score: {}", summary.score)),
                Line::from(format!(
                    "Accuracy: {:.1}% over {} lines",
                    summary.accuracy_percent, summary.total_lines
                )),
                Line::from(format!(
                    "Keystrokes: {}/{} correct ({:.1}%)",
                    summary.chars_correct,
                    summary.chars_typed,
                    summary.char_accuracy_percent()
                )),
            ]
        },
    );

    frame.render_widget(
        Paragraph::new(lines).centered().block(Block::bordered()),
        area,
    );
}

fn draw_browser(frame: &mut Frame, area: Rect, app: &App, snapshot: &GameSnapshot) {
    let [input, results] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(area);

    let focused = Style::new().fg(ACCENT);
    let input_block = Block::bordered().title(" Search ");
    let input_block = if app.focus == Focus::Query {
        input_block.border_style(focused)
    } else {
        input_block
    };
    let query = if snapshot.state == GameState::Searching {
        format!("{} (searching...)", app.query)
    } else {
        app.query.clone()
    };
    frame.render_widget(Paragraph::new(query).block(input_block), input);

    let items: Vec<ListItem> = app
        .results
        .iter()
        .map(|track| {
            let selected = snapshot.track.as_ref().is_some_and(|t| t.id == track.id);
            let marker = if selected { "* " } else { "  " };
            let album = track
                .album
                .as_deref()
                .map(|album| format!("  ({album})"))
                .unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::raw(marker),
                Span::raw(track.to_string()),
                Span::styled(album, Style::new().add_modifier(Modifier::DIM)),
            ]))
        })
        .collect();

    let list_block = Block::bordered().title(" Tracks ");
    let list_block = if app.focus == Focus::Results {
        list_block.border_style(focused)
    } else {
        list_block
    };
    let list = List::new(items)
        .block(list_block)
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default().with_selected(
        (app.focus == Focus::Results && !app.results.is_empty()).then_some(app.selected),
    );
    frame.render_stateful_widget(list, results, &mut state);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App, state: GameState) {
    let hints = match state {
        GameState::Countdown | GameState::Active | GameState::Paused => {
            "type the lyrics | Esc pause | Ctrl+S restart | Ctrl+R reset | Ctrl+Q quit"
        }
        GameState::Ended => "Ctrl+S replay | Enter new game | Ctrl+Q quit",
        GameState::Idle | GameState::Searching | GameState::TrackSelected => {
            "Enter search | Ctrl+R recent | Ctrl+S start | Esc clear | Ctrl+L sign out | Ctrl+Q quit"
        }
    };

    let status = app.status.as_ref().map_or_else(Line::default, |(kind, message)| {
        let color = match kind {
            StatusKind::Info => Color::Cyan,
            StatusKind::Warning => Color::Yellow,
            StatusKind::Error => Color::Red,
        };
        Line::from(Span::styled(message.clone(), Style::new().fg(color)))
    });

    frame.render_widget(
        Paragraph::new(vec![
            status,
            Line::from(Span::styled(hints, Style::new().add_modifier(Modifier::DIM))),
        ]),
        area,
    );
}
