use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

use crate::model::{Modus, Model, RecordView, View};
use crate::table::TableViewData;

const SELECTED: Style = Style::new().fg(Color::Black).bg(Color::Cyan);

/// Render the whole screen from the model.
pub fn draw(model: &Model, frame: &mut Frame) {
    let [tabs, body, status, cmdline] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_tabs(model, frame, tabs);
    match model.view() {
        View::Home => draw_home(model, frame, body),
        View::Resource(_) => match (model.record_view(), model.modus(), model.previous_modus()) {
            (Some(record), Modus::RECORD, _) | (Some(record), _, Modus::RECORD) => {
                draw_record(record, model, frame, body)
            }
            _ => draw_table(&model.table_view(), model, frame, body),
        },
        View::Settings => match model.record_view() {
            Some(record) => draw_record(record, model, frame, body),
            None => draw_placeholder("Loading settings...", frame, body),
        },
    }
    draw_status(model, frame, status);
    draw_cmdline(model, frame, cmdline);

    if let Some(message) = model.popup_message() {
        draw_popup(message, frame, body);
    }
}

fn draw_tabs(model: &Model, frame: &mut Frame, area: Rect) {
    let user = match model.username() {
        Some(name) => format!(" {name} "),
        None => " guest ".to_string(),
    };
    let lang = format!(" {} ", model.language().code().to_uppercase());
    let right_width = (user.chars().count() + lang.len()) as u16;
    let [left, right] =
        Layout::horizontal([Constraint::Min(10), Constraint::Length(right_width)]).areas(area);

    let titles: Vec<Line> = View::tabs()
        .iter()
        .enumerate()
        .map(|(i, v)| match v {
            View::Resource(_) => Line::from(format!("{i} {}", v.label())),
            _ => Line::from(v.label()),
        })
        .collect();
    let tabs = Tabs::new(titles)
        .select(model.view().position())
        .highlight_style(Style::new().add_modifier(Modifier::BOLD).fg(Color::Cyan))
        .divider("|");
    frame.render_widget(tabs, left);

    let badge = Line::from(vec![
        Span::styled(lang, Style::new().fg(Color::Black).bg(Color::Yellow)),
        if model.is_authenticated() {
            Span::styled(user, Style::new().fg(Color::Black).bg(Color::Green))
        } else {
            Span::styled(user, Style::new().fg(Color::DarkGray))
        },
    ]);
    frame.render_widget(Paragraph::new(badge), right);
}

fn draw_home(model: &Model, frame: &mut Frame, area: Rect) {
    let stats_height = if model.stats().is_some() { 4 } else { 0 };
    let [hero, stats] =
        Layout::vertical([Constraint::Min(5), Constraint::Length(stats_height)]).areas(area);

    let carousel = model.carousel();
    let mut lines = Vec::new();
    if let Some(slide) = carousel.current() {
        lines.push(Line::from(slide.title.clone().bold()));
        lines.push(Line::from(slide.subtitle.clone().cyan()));
        lines.push(Line::default());
        lines.push(Line::from(slide.description.clone()));
    }
    lines.push(Line::default());
    let dots: Vec<Span> = (0..carousel.len())
        .map(|i| {
            if i == carousel.index() {
                Span::styled("● ", Style::new().fg(Color::Cyan))
            } else {
                Span::styled("○ ", Style::new().fg(Color::DarkGray))
            }
        })
        .collect();
    lines.push(Line::from(dots));

    let block = Block::bordered()
        .title(Line::from(" Home ".bold()).centered())
        .title_bottom(
            Line::from(vec![
                " Slide ".into(),
                "<h/l>".blue().bold(),
                " Browse ".into(),
                "<Tab>".blue().bold(),
                " Help ".into(),
                "<?> ".blue().bold(),
            ])
            .centered(),
        )
        .border_set(border::THICK);
    let [inner] = Layout::vertical([Constraint::Length(lines.len() as u16)])
        .flex(Flex::Center)
        .areas(block.inner(hero));
    frame.render_widget(block, hero);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .centered()
            .wrap(Wrap { trim: true }),
        inner,
    );

    if let Some(record) = model.stats() {
        let spans: Vec<Span> = record
            .keys()
            .into_iter()
            .flat_map(|key| {
                let value = record.text(&key).unwrap_or_default();
                [
                    Span::styled(format!(" {key}: "), Style::new().fg(Color::DarkGray)),
                    Span::styled(value, Style::new().bold()),
                ]
            })
            .collect();
        frame.render_widget(
            Paragraph::new(Line::from(spans))
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title(" Statistics ")),
            stats,
        );
    }
}

fn column_widths(view: &TableViewData, max_width: usize) -> Vec<Constraint> {
    (0..view.headers.len())
        .map(|i| {
            let header = view.headers[i].chars().count();
            let widest = view
                .rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(Line::width)
                .max()
                .unwrap_or(0);
            Constraint::Max(header.max(widest).min(max_width) as u16)
        })
        .collect()
}

fn pagination(view: &TableViewData) -> Line<'static> {
    if view.pages.is_empty() {
        return Line::default();
    }
    let mut spans = vec![Span::raw("‹ ")];
    for page in &view.pages {
        if *page == view.current_page {
            spans.push(Span::styled(format!("[{page}]"), SELECTED));
        } else {
            spans.push(Span::raw(format!(" {page} ")));
        }
    }
    spans.push(Span::raw(" ›"));
    Line::from(spans)
}

fn draw_table(view: &TableViewData, model: &Model, frame: &mut Frame, area: Rect) {
    let block = Block::bordered()
        .title(Line::from(format!(" {} ", model.view().label()).bold()))
        .title(Line::from(format!(" {} ", view.summary)).right_aligned())
        .title_bottom(pagination(view).centered());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [search, body] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(inner);
    let search_line = if view.query.is_empty() {
        Line::from(vec!["/ ".blue(), view.placeholder.clone().dark_gray()])
    } else {
        Line::from(vec!["/ ".blue(), view.query.clone().into()])
    };
    frame.render_widget(Paragraph::new(search_line), search);

    if view.loading && view.rows.is_empty() {
        draw_placeholder("Loading...", frame, body);
        return;
    }

    let header = Row::new(view.headers.iter().map(|h| Cell::from(h.clone())))
        .style(Style::new().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));
    let widths = column_widths(view, model.config().max_column_width);
    if let Some(message) = &view.empty_message {
        let [header_area, rest] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(body);
        let table = Table::new(Vec::<Row>::new(), widths)
            .header(header)
            .column_spacing(2);
        frame.render_widget(table, header_area);
        draw_placeholder(message, frame, rest);
        return;
    }

    let rows = view
        .rows
        .iter()
        .map(|cells| Row::new(cells.iter().map(|c| Cell::from(c.clone()))));
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(2)
        .row_highlight_style(SELECTED);
    let mut state = TableState::default().with_selected(Some(view.selected));
    frame.render_stateful_widget(table, body, &mut state);
}

fn draw_record(record: &RecordView, model: &Model, frame: &mut Frame, area: Rect) {
    let fields = record.fields();
    let key_width = fields
        .iter()
        .map(|(k, _)| k.chars().count())
        .max()
        .unwrap_or(4) as u16;
    let rows = fields.into_iter().map(|(k, v)| {
        Row::new(vec![
            Cell::from(k.dark_gray()),
            Cell::from(Text::from(v)),
        ])
    });
    let table = Table::new(rows, [Constraint::Length(key_width), Constraint::Fill(1)])
        .column_spacing(2)
        .row_highlight_style(SELECTED)
        .block(
            Block::bordered()
                .title(Line::from(format!(" {} ", record.title).bold()))
                .title_bottom(
                    Line::from(vec![
                        " Edit ".into(),
                        "<e>".blue().bold(),
                        " Upload ".into(),
                        "<i/f>".blue().bold(),
                        " Back ".into(),
                        "<Esc> ".blue().bold(),
                    ])
                    .centered(),
                ),
        );
    let mut state = TableState::default().with_selected(Some(record.curser_row));
    frame.render_stateful_widget(table, area, &mut state);
    if model.busy() {
        let [_, corner] =
            Layout::horizontal([Constraint::Min(0), Constraint::Length(12)]).areas(area);
        frame.render_widget(Paragraph::new(" saving... ".yellow()), corner);
    }
}

fn draw_placeholder(message: &str, frame: &mut Frame, area: Rect) {
    let [center] = Layout::vertical([Constraint::Length(1)])
        .flex(Flex::Center)
        .areas(area);
    frame.render_widget(
        Paragraph::new(message.to_string().dark_gray()).centered(),
        center,
    );
}

fn draw_status(model: &Model, frame: &mut Frame, area: Rect) {
    let spinner = if model.busy() { "⟳ " } else { "" };
    let line = Line::from(vec![
        spinner.yellow(),
        model.status_message().to_string().into(),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::new().bg(Color::DarkGray).fg(Color::White)),
        area,
    );
}

fn draw_cmdline(model: &Model, frame: &mut Frame, area: Rect) {
    let Some(mode) = model.cmd_mode() else {
        frame.render_widget(Paragraph::new(" ? for help".dark_gray()), area);
        return;
    };
    let input = model.cmd_input();
    let prompt = mode.prompt();
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            prompt.bold(),
            input.display(mode.masked()).into(),
        ])),
        area,
    );
    let x = area.x + (prompt.chars().count() + input.curser_pos) as u16;
    frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
}

fn draw_popup(message: &str, frame: &mut Frame, area: Rect) {
    let height = (message.lines().count() as u16 + 2).min(area.height);
    let [vertical] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Percentage(70)])
        .flex(Flex::Center)
        .areas(vertical);
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(message.to_string())
            .wrap(Wrap { trim: false })
            .block(
                Block::bordered()
                    .border_set(border::THICK)
                    .title_bottom(Line::from(" <Esc> ".blue().bold()).centered()),
            ),
        popup,
    );
}
