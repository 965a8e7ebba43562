use arboard::Clipboard;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::dataset::Dataset;
use crate::domain::{AVConfig, AVError, CMDMode, HELP_TEXT, Message};
use crate::inputter::{InputResult, Inputter};
use crate::inventory::{Inventory, Phase};
use crate::loader::{Loader, Source};
use crate::tokenizer::format_line;
use crate::ui::{CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, SCROLLBAR_WIDTH, TABLE_HEADER_HEIGHT};

const CLEAR_FILTER_ENTRY: &str = "(all)";

#[derive(Debug, PartialEq)]
pub enum Status {
    EMPTY,
    READY,
    LOADING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    POPUP,
    CMDINPUT,
    FILTERMENU,
}

struct Column {
    name: String,
    max_width: usize,
    render_width: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

struct TableView {
    rows: Arc<Vec<usize>>, // Visible rows as indices into the dataset records
    visible_columns: Vec<usize>, // Idx into Model.columns of the columns on screen
    visible_width: usize,
    curser_row: usize,
    curser_column: usize,
    offset_row: usize,
    offset_column: usize,
    data: Vec<ColumnView>,
    show_index: bool,
    index: ColumnView,
    heigh: usize,
    width: usize,
}

impl TableView {
    fn empty() -> Self {
        TableView {
            rows: Arc::new(Vec::new()),
            visible_columns: Vec::new(),
            visible_width: 0,
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            data: Vec::new(),
            show_index: false,
            index: ColumnView::default(),
            heigh: 0,
            width: 0,
        }
    }

    fn build_index(&mut self, total_rows: usize) {
        let rbegin = std::cmp::min(self.offset_row, self.rows.len());
        let rend = std::cmp::min(rbegin + self.heigh, self.rows.len());

        let data = self.rows[rbegin..rend]
            .iter()
            .map(|idx| (idx + 1).to_string())
            .collect::<Vec<String>>();
        let width = std::cmp::max(3, total_rows.to_string().len());
        self.index = ColumnView {
            name: "".to_string(),
            width,
            data,
        }
    }
}

struct RecordView {
    header_data: Vec<String>,
    header_width: usize,
    header_view: ColumnView,
    row_data: Vec<String>,
    row_width: usize,
    row_view: ColumnView,
    record_idx: usize, // Index in TableView.rows[XXX]
    curser_row: usize,
    curser_offset: usize,
    height: usize,
    width: usize,
}

impl RecordView {
    fn empty() -> Self {
        RecordView {
            header_data: Vec::new(),
            header_width: 0,
            header_view: ColumnView::default(),
            row_data: Vec::new(),
            row_width: 0,
            row_view: ColumnView::default(),
            record_idx: 0,
            curser_row: 0,
            curser_offset: 0,
            height: 0,
            width: 0,
        }
    }
}

#[derive(Default)]
struct FilterMenu {
    column: String,
    entries: Vec<String>, // First entry clears the filter, the rest come from the column index
    active: Option<String>,
    curser: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MenuView {
    pub title: String,
    pub entries: Vec<String>,
    pub active: Option<usize>,
    pub selected: usize,
}

pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub index: ColumnView,
    pub nrows: usize, // Total number of rows in this view
    pub total_rows: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub show_popup: bool,
    pub popup_message: String,
    pub menu: Option<MenuView>,
    pub empty_message: Option<String>,
    pub filters: Vec<(String, String)>,
    pub search: Option<String>,
    pub layout: UILayout,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            index: ColumnView::default(),
            nrows: 0,
            total_rows: 0,
            selected_row: 0,
            selected_column: 0,
            abs_selected_row: 0,
            show_popup: false,
            popup_message: String::new(),
            menu: None,
            empty_message: None,
            filters: Vec::new(),
            search: None,
            layout: UILayout::default(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
    pub index_width: usize,
    pub index_height: usize,
    pub statusline_width: usize,
    pub statusline_height: usize,
}

impl UILayout {
    fn from_model(model: &Model, ui_width: usize, ui_height: usize) -> Self {
        let mut index_width = 0;
        if model.table.show_index {
            // Index column plus one spacer
            index_width = model.table.index.width + 1;
        }
        UILayout::from_values(index_width, ui_width, ui_height)
    }

    pub fn from_values(index_width: usize, ui_width: usize, ui_height: usize) -> Self {
        let cmdline_heigth = CMDLINE_HEIGH;
        let cmdline_width = ui_width;

        let table_width = ui_width.saturating_sub(SCROLLBAR_WIDTH + index_width);
        let table_height = ui_height.saturating_sub(cmdline_heigth + TABLE_HEADER_HEIGHT);
        let index_height = table_height;

        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width,
            table_height,
            index_width,
            index_height,
            statusline_width: cmdline_width,
            statusline_height: cmdline_heigth,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: AVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    inventory: Inventory,
    loader: Loader,
    source: Option<Source>,
    columns: Vec<Column>,
    table: TableView,
    record_view: RecordView,
    filter_menu: FilterMenu,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
}

impl Model {
    pub fn init(config: &AVConfig, ui_width: usize, ui_height: usize) -> Self {
        let clipboard = match Clipboard::new() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Clipboard not available: {e}");
                None
            }
        };
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            inventory: Inventory::default(),
            loader: Loader::default(),
            source: None,
            columns: Vec::new(),
            table: TableView::empty(),
            record_view: RecordView::empty(),
            filter_menu: FilterMenu::default(),
            uilayout: UILayout::from_values(0, ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Press o to open a file or URL, ? for help".to_string(),
        };
        model.update_table_data();
        model
    }

    // ------------------------- Loading ------------------------------------ //

    /// Start loading `input` (a path or URL) in the background. The current
    /// dataset is dropped right away.
    pub fn load(&mut self, input: &str) {
        let result = Source::parse(input).and_then(|source| {
            self.loader.start(source.clone())?;
            Ok(source)
        });
        match result {
            Ok(source) => {
                info!("Loading {source} ...");
                self.set_status_message(format!("Loading {source} ..."));
                self.source = Some(source);
                self.status = Status::LOADING;
                self.reset_view();
            }
            Err(e) => {
                warn!("Can not load {input}: {e}");
                self.set_status_message(format!("Can not load {input}: {e}"));
            }
        }
    }

    fn reload(&mut self) {
        match &self.source {
            Some(source) => {
                let input = source.to_string();
                self.load(&input);
            }
            None => self.set_status_message("Nothing to reload"),
        }
    }

    fn poll_loader(&mut self) {
        if let Some((source, result)) = self.loader.poll() {
            match result {
                Ok(dataset) => self.apply_dataset(dataset),
                Err(e) => {
                    error!("Loading {source} failed: {e}");
                    self.status = Status::EMPTY;
                    self.reset_view();
                    self.set_status_message(format!("No data uploaded: {e}"));
                }
            }
        }
    }

    /// Show `dataset`, replacing anything shown before.
    pub fn apply_dataset(&mut self, dataset: Dataset) {
        let message = format!(
            "Loaded {} records from {}",
            dataset.len(),
            if dataset.name().is_empty() { "input" } else { dataset.name() }
        );
        self.inventory.load(dataset);
        self.status = Status::READY;
        self.reset_view();
        self.set_status_message(message);
    }

    fn reset_view(&mut self) {
        if self.status != Status::READY {
            self.inventory.unload();
        }
        self.modus = Modus::TABLE;
        self.previous_modus = Modus::TABLE;
        let show_index = self.table.show_index;
        self.table = TableView::empty();
        self.table.show_index = show_index;
        self.table.rows = self.inventory.rows();
        self.rebuild_columns();
        self.update_table_data();
        if self.table.show_index {
            // The index width follows the number of records
            self.uilayout = UILayout::from_model(self, self.uilayout.width, self.uilayout.height);
            self.update_table_data();
        }
    }

    // Column widths are measured over the whole dataset so they do not jump
    // while filtering. Each column is measured in its own rayon task.
    fn rebuild_columns(&mut self) {
        let start_time = Instant::now();
        let names = self.inventory.visible_columns();
        self.columns = match self.inventory.dataset() {
            Some(dataset) => names
                .into_par_iter()
                .map(|name| Self::measure_column(dataset, name))
                .collect(),
            None => Vec::new(),
        };
        debug!(
            "Measured {} columns in {}ms",
            self.columns.len(),
            start_time.elapsed().as_millis()
        );
    }

    fn measure_column(dataset: &Dataset, name: String) -> Column {
        let max_width = dataset
            .records()
            .iter()
            .map(|r| r.get(&name).chars().count())
            .max()
            .unwrap_or(0);
        Column {
            max_width: std::cmp::max(max_width, name.chars().count()),
            name,
            render_width: 0, // Will be set later
        }
    }

    // Called whenever filters or search changed the visible rows.
    fn refresh_rows(&mut self) {
        self.table.rows = self.inventory.rows();
        self.table.curser_row = 0;
        self.table.offset_row = 0;
        self.update_table_data();
    }

    // ------------------------- UI data ------------------------------------ //

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    fn update_uidata_for_table(&mut self) {
        let table = &self.table;
        let name = self
            .inventory
            .dataset()
            .map(|d| d.name().to_string())
            .unwrap_or_default();
        let empty_message = match (self.inventory.phase(), &self.status) {
            (Phase::Empty, Status::LOADING) => Some("Loading ...".to_string()),
            (Phase::Empty, _) => Some("No data uploaded".to_string()),
            _ if self.inventory.dataset().is_some_and(Dataset::is_empty) => {
                if name.is_empty() {
                    Some("No data available".to_string())
                } else {
                    Some(format!("No records in {name}"))
                }
            }
            _ if table.rows.is_empty() => Some("No records match the current filters".to_string()),
            _ => None,
        };

        self.uidata = UIData {
            name: match self.inventory.phase() {
                Phase::Filtered => format!("F[{name}]"),
                _ => name,
            },
            table: table.data.clone(),
            index: table.index.clone(),
            nrows: table.rows.len(),
            total_rows: self.inventory.dataset().map(Dataset::len).unwrap_or(0),
            selected_row: table.curser_row,
            selected_column: table.curser_column,
            abs_selected_row: table.offset_row + table.curser_row,
            show_popup: false,
            popup_message: String::new(),
            menu: None,
            empty_message,
            filters: self
                .inventory
                .selection()
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
            search: self.inventory.search().map(str::to_string),
            layout: self.uilayout.clone(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
        }
    }

    fn update_uidata_for_record(&mut self) {
        self.update_uidata_for_table();
        let record = &self.record_view;
        let uidata = &mut self.uidata;
        uidata.name = format!("R[{}]", uidata.name);
        uidata.table = vec![record.header_view.clone(), record.row_view.clone()];
        uidata.selected_row = record.curser_row;
        uidata.selected_column = 1;
        // In the record view, show which record we are looking at instead of line in record view.
        uidata.abs_selected_row = record.record_idx;
        uidata.index = ColumnView::default();
        uidata.layout = UILayout::from_values(0, self.uilayout.width, self.uilayout.height);
    }

    fn update_uidata_for_menu(&mut self) {
        self.update_uidata_for_table();
        let menu = &self.filter_menu;
        let active = menu
            .active
            .as_ref()
            .and_then(|a| menu.entries.iter().skip(1).position(|e| e == a))
            .map(|p| p + 1);
        self.uidata.menu = Some(MenuView {
            title: format!(" Filter {} ", menu.column),
            entries: menu.entries.clone(),
            active,
            selected: menu.curser,
        });
    }

    fn update_table_data(&mut self) {
        let table = &mut self.table;
        table.width = self.uilayout.table_width;
        table.heigh = self.uilayout.table_height;
        table.visible_columns.clear();
        table.data.clear();

        let dataset = match self.inventory.dataset() {
            Some(dataset) if !self.columns.is_empty() => dataset,
            _ => {
                table.index = ColumnView::default();
                self.update_uidata_for_table();
                return;
            }
        };

        let rbegin = std::cmp::min(table.offset_row, table.rows.len());
        let rend = std::cmp::min(rbegin + table.heigh, table.rows.len());
        table.offset_column = std::cmp::min(table.offset_column, self.columns.len() - 1);

        trace!(
            "Table: I:{}, Cr {}, Cc {}, Or {}, Oc {}, Rb {}, Re {}, tw: {}, th:{}",
            table.show_index,
            table.curser_row,
            table.curser_column,
            table.offset_row,
            table.offset_column,
            rbegin,
            rend,
            table.width,
            table.heigh,
        );

        // Calculate current render width for each column
        for column in self.columns.iter_mut() {
            column.render_width = std::cmp::min(
                column.max_width + COLUMN_WIDTH_MARGIN,
                self.config.max_column_width,
            );
        }

        // Create a list of columns that fit in the table
        let mut visible_width = 0;
        for (cidx, column) in self.columns[table.offset_column..].iter_mut().enumerate() {
            if visible_width + (column.render_width + 1) <= table.width {
                table.visible_columns.push(cidx + table.offset_column);
                visible_width += column.render_width + 1;
            } else {
                // Add the last partial visible column
                if visible_width < table.width {
                    let remaining_width = table.width - visible_width;
                    table.visible_columns.push(cidx + table.offset_column);
                    visible_width += remaining_width;
                    column.render_width = remaining_width;
                }
                break;
            }
        }
        // Store how wide the table would be in its full rendering to know the most right column is only partially rendered
        table.visible_width = visible_width;
        table.curser_column = std::cmp::min(
            table.curser_column,
            table.visible_columns.len().saturating_sub(1),
        );

        table.data = Vec::with_capacity(table.visible_columns.len());
        for &idx in table.visible_columns.iter() {
            let column = &self.columns[idx];
            let col_data = table.rows[rbegin..rend]
                .iter()
                .map(|&ridx| {
                    dataset
                        .record(ridx)
                        .map(|r| r.get(&column.name).to_string())
                        .unwrap_or_default()
                })
                .collect();
            table.data.push(ColumnView {
                name: Self::get_visible_name(&column.name, column.render_width),
                width: column.render_width,
                data: col_data,
            });
        }

        table.build_index(dataset.len());
        self.update_uidata_for_table();
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return "".to_string();
        }
        if name.chars().count() > width {
            let mut reduced_name = name.chars().take(width - 3).collect::<String>();
            reduced_name.push_str("...");
            reduced_name
        } else {
            name.to_string()
        }
    }

    fn current_column(&self) -> Option<&Column> {
        self.table
            .visible_columns
            .get(self.table.curser_column)
            .and_then(|&idx| self.columns.get(idx))
    }

    fn current_record_idx(&self) -> Option<usize> {
        self.table
            .rows
            .get(self.table.offset_row + self.table.curser_row)
            .copied()
    }

    // ------------------------- Message handling ---------------------------- //

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_model(self, width, height);
        self.table.heigh = self.uilayout.table_height;
        if self.table.curser_row >= self.table.heigh {
            let abs = self.table.offset_row + self.table.curser_row;
            self.select_row(abs);
        }
        match self.modus {
            Modus::TABLE => self.update_table_data(),
            Modus::RECORD => {
                self.record_view.height = self.uilayout.table_height;
                self.record_view.width = self.uilayout.width.saturating_sub(SCROLLBAR_WIDTH);
                self.update_record_data();
            }
            Modus::FILTERMENU => {
                self.update_table_data();
                self.update_uidata_for_menu();
            }
            Modus::POPUP | Modus::CMDINPUT => {
                let show_popup = self.uidata.show_popup;
                let popup_message = std::mem::take(&mut self.uidata.popup_message);
                self.update_table_data();
                self.uidata.show_popup = show_popup;
                self.uidata.popup_message = popup_message;
            }
        }
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), AVError> {
        self.poll_loader();

        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection_down(1),
                    Message::MoveUp => self.move_table_selection_up(1),
                    Message::MoveLeft => self.move_table_selection_left(),
                    Message::MoveRight => self.move_table_selection_right(),
                    Message::MovePageUp => {
                        self.move_table_selection_up(self.uilayout.table_height.max(1))
                    }
                    Message::MovePageDown => {
                        self.move_table_selection_down(self.uilayout.table_height.max(1))
                    }
                    Message::MoveBeginning => self.select_row(0),
                    Message::MoveEnd => self.select_row(self.table.rows.len().saturating_sub(1)),
                    Message::Enter => self.enter(),
                    Message::Help => self.show_help(),
                    Message::FilterMenu => self.open_filter_menu(),
                    Message::ClearColumnFilter => self.clear_column_filter(),
                    Message::ClearAllFilters => {
                        self.inventory.clear_all_filters();
                        self.refresh_rows();
                        self.set_status_message("Cleared all filters");
                    }
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::Open => self.enter_cmd_mode(CMDMode::Open),
                    Message::Export => self.enter_cmd_mode(CMDMode::Export),
                    Message::Reload => self.reload(),
                    Message::CopyCell => self.copy_table_cell(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::HideColumn => self.hide_current_column(),
                    Message::ShowAllColumns => self.show_all_columns(),
                    Message::ToggleIndex => self.toggle_table_index(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::RECORD => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_record_selection_down(1),
                    Message::MoveUp => self.move_record_selection_up(1),
                    Message::MoveLeft => self.previous_record(),
                    Message::MoveRight => self.next_record(),
                    Message::MovePageUp => self.move_record_selection_up(10),
                    Message::MovePageDown => self.move_record_selection_down(10),
                    Message::CopyCell => self.copy_record_cell(),
                    Message::Help => self.show_help(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit => self.exit(),
                    _ => (),
                },
                Modus::FILTERMENU => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_menu_selection(1),
                    Message::MoveUp => self.move_menu_selection(-1),
                    Message::MovePageDown => self.move_menu_selection(10),
                    Message::MovePageUp => self.move_menu_selection(-10),
                    Message::Enter => self.enter(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit => self.exit(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Enter | Message::Help => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    } else if let Message::Resize(width, height) = msg {
                        self.ui_resize(width, height)
                    }
                }
            }
        }

        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn enter(&mut self) {
        match self.modus {
            Modus::TABLE => {
                if self.current_record_idx().is_some() {
                    let record_idx = self.table.offset_row + self.table.curser_row;
                    self.build_record_view(record_idx);
                    self.previous_modus = Modus::TABLE;
                    self.modus = Modus::RECORD;
                }
            }
            Modus::FILTERMENU => {
                let menu = std::mem::take(&mut self.filter_menu);
                let value = &menu.entries[menu.curser];
                if menu.curser == 0 {
                    self.inventory.clear_filter(&menu.column);
                } else {
                    self.inventory.toggle_filter(&menu.column, value);
                }
                let message = match self.inventory.selection().get(&menu.column) {
                    Some(active) => format!("Filter {} = {}", menu.column, active),
                    None => format!("Cleared filter on {}", menu.column),
                };
                self.previous_modus = Modus::FILTERMENU;
                self.modus = Modus::TABLE;
                self.refresh_rows();
                self.set_status_message(message);
            }
            Modus::RECORD | Modus::POPUP | Modus::CMDINPUT => {}
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE | Modus::CMDINPUT => {}
            Modus::RECORD | Modus::FILTERMENU => {
                self.previous_modus = self.modus;
                self.modus = Modus::TABLE;
                self.update_table_data();
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.uidata.show_popup = false;
            }
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
    }

    fn open_filter_menu(&mut self) {
        let Some(column) = self.current_column().map(|c| c.name.clone()) else {
            return;
        };
        let mut entries = vec![CLEAR_FILTER_ENTRY.to_string()];
        entries.extend(self.inventory.index().values(&column).iter().cloned());
        let active = self.inventory.selection().get(&column).map(str::to_string);
        let curser = active
            .as_ref()
            .and_then(|a| entries.iter().skip(1).position(|e| e == a))
            .map(|p| p + 1)
            .unwrap_or(0);
        trace!("Filter menu for {column} with {} values", entries.len() - 1);

        self.filter_menu = FilterMenu {
            column,
            entries,
            active,
            curser,
        };
        self.previous_modus = self.modus;
        self.modus = Modus::FILTERMENU;
        self.update_uidata_for_menu();
    }

    fn move_menu_selection(&mut self, step: isize) {
        let menu = &mut self.filter_menu;
        let last = menu.entries.len().saturating_sub(1);
        menu.curser = menu.curser.saturating_add_signed(step).min(last);
        self.update_uidata_for_menu();
    }

    fn clear_column_filter(&mut self) {
        if let Some(column) = self.current_column().map(|c| c.name.clone()) {
            self.inventory.clear_filter(&column);
            self.refresh_rows();
            self.set_status_message(format!("Cleared filter on {column}"));
        }
    }

    fn hide_current_column(&mut self) {
        let Some(column) = self.current_column().map(|c| c.name.clone()) else {
            return;
        };
        if self.inventory.hide_column(&column) {
            self.rebuild_columns();
            self.update_table_data();
            self.set_status_message(format!("Hid column {column}"));
        } else {
            self.set_status_message("Can not hide the last column");
        }
    }

    fn show_all_columns(&mut self) {
        self.inventory.show_all_columns();
        self.rebuild_columns();
        self.update_table_data();
    }

    fn raw_input(&mut self, key: ratatui::crossterm::event::KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.uidata.cmdinput = self.last_input.clone();
            self.uidata.cmd_mode = self.cmd_mode;
            self.uidata.active_cmdinput = self.active_cmdinput;
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        if mode == CMDMode::Open && self.loader.is_busy() {
            self.set_status_message(AVError::LoadInProgress.to_string());
            return;
        }
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);

        self.active_cmdinput = true;
        self.input.clear();
        match mode {
            CMDMode::Search => self.input.set(self.inventory.search().unwrap_or("")),
            CMDMode::Open => {
                if let Some(source) = &self.source {
                    self.input.set(&source.to_string());
                }
            }
            CMDMode::Export => {}
        }
        self.last_input = self.input.get();

        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_cmdinput = self.active_cmdinput;
        self.uidata.cmd_mode = self.cmd_mode;
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let cmd_input = self.last_input.input.clone();
        let mode = self.cmd_mode.take();
        if self.last_input.canceled {
            self.update_table_data();
            return;
        }
        match mode {
            Some(CMDMode::Search) => self.search(&cmd_input),
            Some(CMDMode::Open) => self.load(&cmd_input),
            Some(CMDMode::Export) => self.export(&cmd_input),
            None => info!("Cmd mode is none!"),
        }
        self.update_table_data();
    }

    fn search(&mut self, term: &str) {
        trace!("Starting search for {} ...", term);
        self.inventory.set_search(Some(term.to_string()));
        self.refresh_rows();
        let message = match self.inventory.search() {
            Some(term) => format!("Found {} records matching \"{term}\"", self.table.rows.len()),
            None => "Search cleared".to_string(),
        };
        self.set_status_message(message);
    }

    fn export(&mut self, target: &str) {
        let result = self.write_visible_rows(target);
        match result {
            Ok(written) => {
                info!("Exported {written} records to {target}");
                self.set_status_message(format!("Exported {written} records to {target}"));
            }
            Err(e) => {
                error!("Export to {target} failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    fn write_visible_rows(&self, target: &str) -> Result<usize, AVError> {
        let dataset = self.inventory.dataset().ok_or(AVError::EmptyInput)?;
        let path = shellexpand::full(target.trim())
            .map_err(|e| AVError::LoadingFailed(e.to_string()))?;
        if path.is_empty() {
            return Err(AVError::LoadingFailed("no file name given".into()));
        }
        let mut writer = BufWriter::new(File::create(path.into_owned())?);
        let columns = self.inventory.visible_columns();
        dataset.write_csv(&mut writer, &self.table.rows, &columns)
    }

    fn select_row(&mut self, row: usize) {
        let table = &mut self.table;
        trace!("Select row {}", row);
        let row = std::cmp::min(row, table.rows.len().saturating_sub(1));
        let height = table.heigh.max(1);

        if row < table.offset_row {
            table.offset_row = row;
        } else if row >= table.offset_row + height {
            table.offset_row = row + 1 - height;
        }
        table.curser_row = row - table.offset_row;
        self.update_table_data();
    }

    fn toggle_table_index(&mut self) {
        self.table.show_index = !self.table.show_index;
        self.table.build_index(self.inventory.dataset().map(Dataset::len).unwrap_or(0));

        // Update ui layout and the underlying data
        self.uilayout = UILayout::from_model(self, self.uilayout.width, self.uilayout.height);
        self.update_table_data();
    }

    fn set_clipboard(&mut self, content: String) {
        match self.clipboard.as_mut() {
            Some(clipboard) => match clipboard.set_text(content) {
                Ok(_) => self.set_status_message("Copied to clipboard"),
                Err(e) => {
                    warn!("Error copying to clipboard: {:?}", e);
                    self.set_status_message("Copy failed");
                }
            },
            None => self.set_status_message("No clipboard available"),
        }
    }

    fn copy_table_cell(&mut self) {
        let cell = match (self.current_record_idx(), self.current_column()) {
            (Some(ridx), Some(column)) => self
                .inventory
                .dataset()
                .and_then(|d| d.record(ridx))
                .map(|r| r.get(&column.name).to_string()),
            _ => None,
        };
        if let Some(cell) = cell {
            trace!("Cell content: {}", cell);
            self.set_clipboard(cell);
        }
    }

    fn copy_table_row(&mut self) {
        let row = self
            .current_record_idx()
            .and_then(|ridx| self.inventory.dataset().and_then(|d| d.record(ridx)))
            .map(|record| format_line(self.columns.iter().map(|c| record.get(&c.name))));
        if let Some(row) = row {
            self.set_clipboard(row);
        }
    }

    fn move_table_selection_up(&mut self, size: usize) {
        let abs = self.table.offset_row + self.table.curser_row;
        self.select_row(abs.saturating_sub(size));
    }

    fn move_table_selection_down(&mut self, size: usize) {
        let abs = self.table.offset_row + self.table.curser_row;
        self.select_row(abs + size);
    }

    fn move_table_selection_left(&mut self) {
        let table = &mut self.table;
        if table.curser_column > 0 {
            table.curser_column = table.curser_column.saturating_sub(1);
        } else if table.offset_column > 0 {
            table.offset_column = table.offset_column.saturating_sub(1);
        }
        self.update_table_data();
    }

    fn move_table_selection_right(&mut self) {
        let table = &mut self.table;
        let ncolumns = self.columns.len();
        if ncolumns == 0 {
            return;
        }

        if table.curser_column + table.offset_column < (ncolumns - 1) {
            // Somewhere before the last column
            if table.curser_column + 1 < table.visible_columns.len() {
                table.curser_column += 1;
            } else {
                // At the end of the screen
                table.offset_column += 1;
            }
            self.update_table_data();
        } else if table.visible_width > table.width && table.offset_column < (ncolumns - 1) {
            // At the last visible column (which could be wider then the screen)
            table.offset_column += 1;
            self.update_table_data();
        }
    }

    // ------------------------- Record view -------------------------------- //

    fn build_record_view(&mut self, record_idx: usize) {
        trace!("Building record view ...");
        let record = &mut self.record_view;
        record.header_data = self
            .columns
            .iter()
            .map(|c| {
                c.name
                    .chars()
                    .take(self.config.max_column_width)
                    .collect::<String>()
            })
            .collect::<Vec<String>>();

        record.curser_offset = 0;
        record.curser_row = 0;
        record.record_idx = record_idx;
        record.height = self.uilayout.table_height;
        record.width = self.uilayout.width.saturating_sub(SCROLLBAR_WIDTH);
        record.header_width = record
            .header_data
            .iter()
            .map(|h| h.chars().count())
            .max()
            .unwrap_or(0);

        self.update_record_data();
    }

    fn update_record_data(&mut self) {
        let record = &mut self.record_view;
        let ridx = self.table.rows.get(record.record_idx).copied();
        let source = ridx.and_then(|r| self.inventory.dataset().and_then(|d| d.record(r)));

        record.row_data = match source {
            Some(r) => self.columns.iter().map(|c| r.get(&c.name).to_string()).collect(),
            None => Vec::new(),
        };
        record.row_width = record
            .width
            .saturating_sub(record.header_width + 1);

        let rbegin = std::cmp::min(record.curser_offset, record.row_data.len());
        let rend = std::cmp::min(rbegin + record.height, record.row_data.len());

        trace!(
            "Record: rIdx {}, rb {}, re {}, rows {}",
            record.record_idx,
            rbegin,
            rend,
            record.row_data.len()
        );
        record.header_view = ColumnView {
            name: "Headers".to_string(),
            data: record.header_data[rbegin..rend].to_vec(),
            width: record.header_width,
        };
        record.row_view = ColumnView {
            name: "Values".to_string(),
            data: record.row_data[rbegin..rend].to_vec(),
            width: record.row_width,
        };

        self.update_uidata_for_record();
    }

    fn copy_record_cell(&mut self) {
        let record = &self.record_view;
        if let Some(cell) = record
            .row_data
            .get(record.curser_offset + record.curser_row)
            .cloned()
        {
            trace!("Cell content: {}", cell);
            self.set_clipboard(cell);
        }
    }

    fn move_record_selection_up(&mut self, size: usize) {
        let record = &mut self.record_view;
        if record.curser_row > 0 {
            record.curser_row = record.curser_row.saturating_sub(size);
        } else if record.curser_offset > 0 {
            record.curser_offset = record.curser_offset.saturating_sub(size);
        }
        self.update_record_data();
    }

    fn move_record_selection_down(&mut self, size: usize) {
        let record = &mut self.record_view;
        let nfields = record.row_data.len();
        let height = record.height.max(1);
        let abs = std::cmp::min(
            record.curser_offset + record.curser_row + size,
            nfields.saturating_sub(1),
        );
        if abs >= record.curser_offset + height {
            record.curser_offset = abs + 1 - height;
        }
        record.curser_row = abs - record.curser_offset;
        self.update_record_data();
    }

    fn previous_record(&mut self) {
        let record = &mut self.record_view;
        record.record_idx = record.record_idx.saturating_sub(1);
        self.update_record_data();
    }

    fn next_record(&mut self) {
        let record = &mut self.record_view;
        if record.record_idx + 1 < self.table.rows.len() {
            record.record_idx += 1;
        }
        self.update_record_data();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::time::Duration;

    const ASSETS: &str = "Asset ID,Type,Status\n\
                          A1,Pump,Active\n\
                          A2,Valve,Down\n\
                          A3,Pump,Down\n\
                          A4,Compressor,Active\n";

    fn model() -> Model {
        let mut model = Model::init(&AVConfig::default(), 80, 24);
        model.apply_dataset(Dataset::parse(ASSETS).unwrap().with_name("assets.csv"));
        model
    }

    fn send(model: &mut Model, message: Message) {
        model.update(Some(message)).unwrap();
    }

    fn type_line(model: &mut Model, text: &str) {
        for c in text.chars() {
            send(model, Message::RawKey(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
        send(model, Message::RawKey(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)));
    }

    fn first_column(model: &Model) -> Vec<String> {
        model.get_uidata().table[0].data.clone()
    }

    #[test]
    fn starts_empty_with_no_data_message() {
        let model = Model::init(&AVConfig::default(), 80, 24);
        assert_eq!(model.status, Status::EMPTY);
        let uidata = model.get_uidata();
        assert!(uidata.table.is_empty());
        assert_eq!(uidata.empty_message.as_deref(), Some("No data uploaded"));
    }

    #[test]
    fn shows_loaded_dataset() {
        let model = model();
        let uidata = model.get_uidata();
        assert_eq!(model.status, Status::READY);
        assert_eq!(uidata.name, "assets.csv");
        assert_eq!(uidata.nrows, 4);
        assert_eq!(uidata.table.len(), 3);
        assert_eq!(uidata.table[0].name, "Asset ID");
        assert_eq!(first_column(&model), ["A1", "A2", "A3", "A4"]);
        assert!(uidata.empty_message.is_none());
    }

    #[test]
    fn filter_menu_sets_and_toggles_a_filter() {
        let mut model = model();
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::FilterMenu);

        let menu = model.get_uidata().menu.clone().unwrap();
        assert_eq!(menu.entries, ["(all)", "Active", "Down"]);
        assert_eq!(menu.selected, 0);
        assert_eq!(menu.active, None);

        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter);
        assert_eq!(first_column(&model), ["A1", "A4"]);
        assert_eq!(model.get_uidata().filters, [("Status".to_string(), "Active".to_string())]);
        assert!(model.get_uidata().name.starts_with("F["));

        // Picking the active value again clears the filter.
        send(&mut model, Message::FilterMenu);
        let menu = model.get_uidata().menu.clone().unwrap();
        assert_eq!(menu.selected, 1);
        assert_eq!(menu.active, Some(1));
        send(&mut model, Message::Enter);
        assert_eq!(first_column(&model), ["A1", "A2", "A3", "A4"]);
        assert!(model.get_uidata().filters.is_empty());
    }

    #[test]
    fn filters_combine_and_clear_all_restores_order() {
        let mut model = model();
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::FilterMenu);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter); // Type = Pump
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::FilterMenu);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter); // Status = Down
        assert_eq!(first_column(&model), ["A3"]);

        send(&mut model, Message::ClearAllFilters);
        assert_eq!(first_column(&model), ["A1", "A2", "A3", "A4"]);
    }

    #[test]
    fn menu_clear_entry_removes_column_filter() {
        let mut model = model();
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::FilterMenu);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter);
        assert_eq!(model.get_uidata().nrows, 1);
        send(&mut model, Message::FilterMenu);
        send(&mut model, Message::MovePageUp);
        send(&mut model, Message::Enter);
        assert_eq!(model.get_uidata().nrows, 4);
    }

    #[test]
    fn search_narrows_and_empty_search_clears() {
        let mut model = model();
        send(&mut model, Message::Search);
        assert!(model.raw_keyevents());
        type_line(&mut model, "pump");
        assert!(!model.raw_keyevents());
        assert_eq!(first_column(&model), ["A1", "A3"]);
        assert_eq!(model.get_uidata().search.as_deref(), Some("pump"));

        send(&mut model, Message::Search);
        send(
            &mut model,
            Message::RawKey(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)),
        );
        type_line(&mut model, "");
        assert_eq!(model.get_uidata().nrows, 4);
        assert!(model.get_uidata().search.is_none());
    }

    #[test]
    fn empty_result_is_shown_as_empty_table() {
        let mut model = model();
        send(&mut model, Message::Search);
        type_line(&mut model, "nothing like this");
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 0);
        assert!(uidata.table.iter().all(|c| c.data.is_empty()));
        assert!(uidata.empty_message.is_some());
    }

    #[test]
    fn cursor_moves_and_clamps() {
        let mut model = model();
        send(&mut model, Message::MoveUp);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        send(&mut model, Message::MoveEnd);
        assert_eq!(model.get_uidata().abs_selected_row, 3);
        send(&mut model, Message::MovePageDown);
        assert_eq!(model.get_uidata().abs_selected_row, 3);
        send(&mut model, Message::MoveBeginning);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        for _ in 0..10 {
            send(&mut model, Message::MoveRight);
        }
        assert_eq!(model.get_uidata().selected_column, 2);
    }

    #[test]
    fn small_terminal_scrolls_rows() {
        let mut model = Model::init(&AVConfig::default(), 80, 5);
        model.apply_dataset(Dataset::parse(ASSETS).unwrap());
        assert_eq!(first_column(&model), ["A1", "A2"]);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::MoveDown);
        assert_eq!(first_column(&model), ["A2", "A3"]);
        assert_eq!(model.get_uidata().selected_row, 1);
    }

    #[test]
    fn record_view_steps_through_visible_rows() {
        let mut model = model();
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter);
        let uidata = model.get_uidata();
        assert_eq!(uidata.table[0].data, ["Asset ID", "Type", "Status"]);
        assert_eq!(uidata.table[1].data, ["A2", "Valve", "Down"]);
        send(&mut model, Message::MoveRight);
        assert_eq!(model.get_uidata().table[1].data[0], "A3");
        send(&mut model, Message::Exit);
        assert_eq!(model.get_uidata().table.len(), 3);
    }

    #[test]
    fn hiding_columns_changes_table_and_export() {
        let mut model = model();
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::HideColumn);
        let names: Vec<String> = model.get_uidata().table.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, ["Asset ID", "Status"]);

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        send(&mut model, Message::Export);
        type_line(&mut model, &target.to_string_lossy());
        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, "\"Asset ID\",Status\nA1,Active\nA2,Down\nA3,Down\nA4,Active\n");

        send(&mut model, Message::ShowAllColumns);
        assert_eq!(model.get_uidata().table.len(), 3);
    }

    #[test]
    fn help_popup_opens_and_closes() {
        let mut model = model();
        send(&mut model, Message::Help);
        assert!(model.get_uidata().show_popup);
        send(&mut model, Message::Exit);
        assert!(!model.get_uidata().show_popup);
        send(&mut model, Message::MoveDown);
        assert_eq!(model.get_uidata().abs_selected_row, 1);
    }

    #[test]
    fn long_names_are_shortened() {
        assert_eq!(Model::get_visible_name("Recommended Action", 8), "Recom...");
        assert_eq!(Model::get_visible_name("Zustandsüberwachung", 6), "Zus...");
        assert_eq!(Model::get_visible_name("ID", 2), "");
        assert_eq!(Model::get_visible_name("Status", 10), "Status");
    }

    fn wait_until_loaded(model: &mut Model) {
        for _ in 0..500 {
            model.update(None).unwrap();
            if model.status != Status::LOADING {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("load did not finish");
    }

    #[test]
    fn loads_file_in_background_and_resets_filters() {
        let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/assets.csv");
        let mut model = model();
        send(&mut model, Message::FilterMenu);
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::Enter);
        assert_eq!(model.get_uidata().nrows, 1);

        model.load(fixture);
        assert_eq!(model.status, Status::LOADING);
        assert_eq!(model.get_uidata().empty_message.as_deref(), Some("Loading ..."));
        model.enter_cmd_mode(CMDMode::Open);
        assert!(!model.raw_keyevents());

        wait_until_loaded(&mut model);
        assert_eq!(model.status, Status::READY);
        assert_eq!(model.get_uidata().nrows, 12);
        assert!(model.get_uidata().filters.is_empty());
    }

    #[test]
    fn failed_load_falls_back_to_empty_state() {
        let mut model = model();
        model.load("/no/such/inventory.csv");
        wait_until_loaded(&mut model);
        assert_eq!(model.status, Status::EMPTY);
        let uidata = model.get_uidata();
        assert_eq!(uidata.empty_message.as_deref(), Some("No data uploaded"));
        assert!(uidata.status_message.starts_with("No data uploaded"));
    }

    #[test]
    fn header_only_file_is_not_reported_as_filtered_out() {
        let mut model = Model::init(&AVConfig::default(), 80, 24);
        model.apply_dataset(Dataset::parse("Asset ID,Status\n").unwrap().with_name("empty.csv"));
        let uidata = model.get_uidata();
        assert!(uidata.filters.is_empty());
        assert_eq!(uidata.empty_message.as_deref(), Some("No records in empty.csv"));
        assert_eq!(uidata.table.len(), 2);
    }

    #[test]
    fn index_space_follows_the_new_dataset() {
        let mut model = Model::init(&AVConfig::default(), 80, 24);
        model.apply_dataset(Dataset::parse("Asset ID\nA1\n").unwrap());
        send(&mut model, Message::ToggleIndex);
        assert_eq!(model.get_uidata().layout.index_width, 4);

        let mut text = String::from("Asset ID\n");
        for i in 0..12_000 {
            text.push_str(&format!("A{i}\n"));
        }
        model.apply_dataset(Dataset::parse(&text).unwrap());
        let uidata = model.get_uidata();
        assert_eq!(uidata.index.width, 5);
        assert_eq!(uidata.layout.index_width, uidata.index.width + 1);
        assert_eq!(uidata.layout.table_width, 80 - SCROLLBAR_WIDTH - 6);
    }
}
