use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, Wrap,
    },
};

use crate::model::{MenuView, Model, UIData};

pub const CMDLINE_HEIGH: usize = 2; // Filter bar plus status line
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

#[derive(Debug, Default)]
pub struct AssetUI {}

impl AssetUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [main_area, filter_area, status_area] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        if uidata.table.is_empty() {
            self.draw_empty(frame, main_area, uidata);
        } else {
            self.draw_table(frame, main_area, uidata);
        }
        self.draw_filter_bar(frame, filter_area, uidata);
        self.draw_status_line(frame, status_area, uidata);

        if let Some(menu) = &uidata.menu {
            self.draw_menu(frame, main_area, menu);
        }
        if uidata.show_popup {
            self.draw_popup(frame, main_area, &uidata.popup_message);
        }
    }

    fn draw_empty(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        let message = uidata.empty_message.as_deref().unwrap_or("");
        let [center] = Layout::vertical([Constraint::Length(1)])
            .flex(Flex::Center)
            .areas(area);
        frame.render_widget(
            Paragraph::new(message.dark_gray()).centered(),
            center,
        );
    }

    fn draw_table(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        let [index_area, table_area, scroll_area] = Layout::horizontal([
            Constraint::Length(uidata.layout.index_width as u16),
            Constraint::Fill(1),
            Constraint::Length(SCROLLBAR_WIDTH as u16),
        ])
        .areas(area);

        if uidata.layout.index_width > 0 {
            let rows = uidata
                .index
                .data
                .iter()
                .map(|i| Row::new([Cell::from(Line::from(i.as_str()).right_aligned())]));
            let index = Table::new(rows, [Constraint::Length(uidata.index.width as u16)])
                .header(Row::new([""]))
                .style(Style::new().fg(Color::DarkGray));
            frame.render_widget(index, index_area);
        }

        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16))
            .collect::<Vec<Constraint>>();
        let header = Row::new(uidata.table.iter().map(|c| Cell::from(c.name.as_str())))
            .bold()
            .underlined();
        let nrows = uidata.table.iter().map(|c| c.data.len()).max().unwrap_or(0);
        let rows = (0..nrows).map(|ridx| {
            let cells = uidata.table.iter().enumerate().map(|(cidx, column)| {
                let value = column.data.get(ridx).map(String::as_str).unwrap_or("");
                let cell = Cell::from(value);
                if ridx == uidata.selected_row && cidx == uidata.selected_column {
                    cell.style(Style::new().add_modifier(Modifier::REVERSED))
                } else {
                    cell
                }
            });
            let row = Row::new(cells);
            if ridx == uidata.selected_row {
                row.style(Style::new().bg(Color::Rgb(40, 40, 60)))
            } else {
                row
            }
        });
        frame.render_widget(
            Table::new(rows, widths).header(header).column_spacing(1),
            table_area,
        );

        if nrows == 0
            && let Some(message) = &uidata.empty_message
        {
            let [_, center] = Layout::vertical([Constraint::Length(2), Constraint::Length(1)])
                .areas(table_area);
            frame.render_widget(Paragraph::new(message.as_str().dark_gray()), center);
        }

        let mut scroll_state =
            ScrollbarState::new(uidata.nrows).position(uidata.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scroll_area,
            &mut scroll_state,
        );
    }

    fn draw_filter_bar(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        let mut spans: Vec<Span> = Vec::new();
        if uidata.filters.is_empty() && uidata.search.is_none() {
            spans.push("No filters".dark_gray());
        }
        for (column, value) in &uidata.filters {
            spans.push(format!("{column}=").into());
            spans.push(value.as_str().yellow().bold());
            spans.push("  ".into());
        }
        if let Some(search) = &uidata.search {
            spans.push("/".cyan());
            spans.push(search.as_str().cyan().bold());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_status_line(&self, frame: &mut Frame, area: Rect, uidata: &UIData) {
        if uidata.active_cmdinput {
            let prompt = uidata.cmd_mode.map(|m| m.prompt()).unwrap_or("");
            let line = Line::from(vec![prompt.bold(), uidata.cmdinput.input.as_str().into()]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + uidata.cmdinput.cursor) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let position = if uidata.nrows > 0 {
            format!(
                " {} {}/{} ({} total) ",
                uidata.name,
                uidata.abs_selected_row + 1,
                uidata.nrows,
                uidata.total_rows
            )
        } else {
            format!(" {} 0/0 ({} total) ", uidata.name, uidata.total_rows)
        };
        let [message_area, position_area] = Layout::horizontal([
            Constraint::Fill(1),
            Constraint::Length(position.chars().count() as u16),
        ])
        .areas(area);
        frame.render_widget(Paragraph::new(uidata.status_message.as_str()), message_area);
        frame.render_widget(Paragraph::new(position.reversed()), position_area);
    }

    fn draw_menu(&self, frame: &mut Frame, area: Rect, menu: &MenuView) {
        let area = centered_rect(area, 50, 70);
        let items = menu.entries.iter().enumerate().map(|(idx, entry)| {
            if Some(idx) == menu.active {
                ListItem::new(format!("* {entry}")).yellow()
            } else {
                ListItem::new(format!("  {entry}"))
            }
        });
        let list = List::new(items)
            .block(Block::bordered().title(menu.title.as_str()))
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
        let mut state = ListState::default().with_selected(Some(menu.selected));
        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_popup(&self, frame: &mut Frame, area: Rect, message: &str) {
        let area = centered_rect(area, 60, 80);
        let popup = Paragraph::new(message)
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(" Help ").title_bottom(" Esc to close "));
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(area);
    area
}
