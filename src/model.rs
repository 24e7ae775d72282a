use std::path::PathBuf;
use std::sync::mpsc::{Receiver, channel};
use std::time::Instant;

use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use serde_json::{Map, Value};
use tracing::{debug, error, info, trace};

use crate::api::{ApiClient, ApiError, Resource, UploadKind};
use crate::carousel::{Carousel, HERO_PAGE};
use crate::columns::{columns_for, is_media_field};
use crate::domain::{AppConfig, CMDMode, HELP_TEXT, Message, PharmError, Record};
use crate::fetch::{Fetcher, Intent, Payload};
use crate::inputter::{InputResult, Inputter};
use crate::locale::Language;
use crate::session::{Session, TokenStore};
use crate::table::{DataTable, Row, TableOptions, TableViewData};

const LOGIN: &str = "login";

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    LOADING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modus {
    HOME,
    TABLE,
    RECORD,
    SETTINGS,
    POPUP,
    CMDINPUT,
}

/// Top level screens, in tab order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    Home,
    Resource(Resource),
    Settings,
}

impl View {
    pub fn tabs() -> Vec<View> {
        let mut tabs = vec![View::Home];
        tabs.extend(Resource::all().iter().map(|r| View::Resource(*r)));
        tabs.push(View::Settings);
        tabs
    }

    pub fn label(&self) -> &'static str {
        match self {
            View::Home => "Home",
            View::Resource(r) => r.label(),
            View::Settings => "Settings",
        }
    }

    pub fn position(&self) -> usize {
        View::tabs().iter().position(|v| v == self).unwrap_or(0)
    }
}

/// Attribute list of one entity, the terminal form of an edit page.
pub struct RecordView {
    pub resource: Option<Resource>,
    pub record: Record,
    pub title: String,
    pub curser_row: usize,
}

impl RecordView {
    fn new(resource: Option<Resource>, record: Record, lang: Language) -> Self {
        let title = Self::title_for(resource, &record, lang);
        RecordView {
            resource,
            record,
            title,
            curser_row: 0,
        }
    }

    fn title_for(resource: Option<Resource>, record: &Record, lang: Language) -> String {
        let name = ["name", "title", "site_name"]
            .iter()
            .map(|base| record.localized(base, lang))
            .find(|v| !v.is_empty())
            .or_else(|| record.text("company_name"))
            .unwrap_or_default();
        match (resource, record.identifier()) {
            (Some(r), Some(id)) => format!("{} {}", r.edit_route(id), name),
            _ => format!("Settings {name}"),
        }
    }

    pub fn fields(&self) -> Vec<(String, String)> {
        self.record
            .keys()
            .into_iter()
            .map(|k| {
                let v = self.record.text(&k).unwrap_or_default();
                (k, v)
            })
            .collect()
    }

    pub fn selected_key(&self) -> Option<String> {
        self.record.keys().into_iter().nth(self.curser_row)
    }

    fn move_down(&mut self, size: usize) {
        let last = self.record.keys().len().saturating_sub(1);
        self.curser_row = std::cmp::min(self.curser_row + size, last);
    }

    fn move_up(&mut self, size: usize) {
        self.curser_row = self.curser_row.saturating_sub(size);
    }
}

struct UploadTarget {
    resource: Option<Resource>,
    id: i64,
    field: String,
}

/// Turn typed text back into a JSON value shaped like the current one.
pub fn parse_field_value(current: Option<&Value>, input: &str) -> Value {
    match current {
        Some(Value::Bool(_)) => match input.trim() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => Value::String(input.to_string()),
        },
        Some(Value::Number(_)) => serde_json::from_str::<Value>(input.trim())
            .ok()
            .filter(Value::is_number)
            .unwrap_or_else(|| Value::String(input.to_string())),
        Some(Value::Object(_)) | Some(Value::Array(_)) => serde_json::from_str(input)
            .unwrap_or_else(|_| Value::String(input.to_string())),
        Some(Value::Null) | None if input.is_empty() => Value::Null,
        _ => Value::String(input.to_string()),
    }
}

pub struct Model {
    config: AppConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    view: View,
    language: Language,
    client: ApiClient,
    token_store: Option<TokenStore>,
    fetcher: Fetcher,
    table: DataTable<Record>,
    delete_requests: Receiver<i64>,
    record_view: Option<RecordView>,
    carousel: Carousel,
    sections: Vec<Record>,
    stats: Option<Record>,
    settings: Option<Record>,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    pending_delete: Option<i64>,
    query_before_search: String,
    pending_user: Option<String>,
    editing_field: Option<String>,
    upload_target: Option<UploadTarget>,
    popup_message: Option<String>,
    status_message: String,
}

impl Model {
    pub fn init(config: &AppConfig) -> Result<Self, PharmError> {
        let token_store = config
            .token_file
            .as_deref()
            .map(TokenStore::new)
            .transpose()?;
        let session = match &token_store {
            Some(store) => store.load().unwrap_or_else(|e| {
                error!("Cannot read token file: {e}");
                None
            }),
            None => None,
        };
        let client = ApiClient::new(&config.api_url, session)?;
        let (table, delete_requests) =
            Self::build_table(Resource::Products, &config.api_url, config.language, config.page_size);

        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::HOME,
            previous_modus: Modus::HOME,
            view: View::Home,
            language: config.language,
            client,
            token_store,
            fetcher: Fetcher::new(),
            table,
            delete_requests,
            record_view: None,
            carousel: Carousel::with_fallback(
                config.language,
                config.autoplay_interval,
                Instant::now(),
            ),
            sections: Vec::new(),
            stats: None,
            settings: None,
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            pending_delete: None,
            query_before_search: String::new(),
            pending_user: None,
            editing_field: None,
            upload_target: None,
            popup_message: None,
            status_message: "Started pharmtv!".to_string(),
        };
        model.open_view(View::Home)?;
        if model.is_authenticated() {
            model.spawn("auth", Intent::Read, |api| api.current_user().map(Payload::User))?;
        }
        Ok(model)
    }

    fn build_table(
        resource: Resource,
        base: &str,
        lang: Language,
        page_size: usize,
    ) -> (DataTable<Record>, Receiver<i64>) {
        let (tx, rx) = channel();
        let options = TableOptions::default()
            .page_size(page_size)
            .search_placeholder(format!("Search {}...", resource.label().to_lowercase()));
        let mut table = DataTable::new(columns_for(resource, base, lang), options);
        if resource.editable() {
            table = table.edit_url(move |id| resource.edit_route(id));
        }
        if resource.deletable() {
            table = table.on_delete(move |id| {
                // The model drains these on its next update.
                let _ = tx.send(id);
            });
        }
        (table, rx)
    }

    // -------------------- Accessors for the ui ---------------------- //

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn modus(&self) -> Modus {
        self.modus
    }

    pub fn previous_modus(&self) -> Modus {
        self.previous_modus
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn table_view(&self) -> TableViewData {
        self.table.view()
    }

    pub fn record_view(&self) -> Option<&RecordView> {
        self.record_view.as_ref()
    }

    pub fn carousel(&self) -> &Carousel {
        &self.carousel
    }

    pub fn stats(&self) -> Option<&Record> {
        self.stats.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.client.session().map(|s| s.username().unwrap_or("admin"))
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().is_some()
    }

    pub fn popup_message(&self) -> Option<&str> {
        self.popup_message.as_deref()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn cmd_mode(&self) -> Option<CMDMode> {
        self.cmd_mode
    }

    pub fn cmd_input(&self) -> &InputResult {
        &self.last_input
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn busy(&self) -> bool {
        self.fetcher.busy()
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        trace!("Status: {}", self.status_message);
    }

    fn show_popup(&mut self, message: impl Into<String>) {
        if self.modus != Modus::POPUP {
            self.previous_modus = self.modus;
        }
        self.modus = Modus::POPUP;
        self.popup_message = Some(message.into());
    }

    // -------------------- Update loop ---------------------- //

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PharmError> {
        self.process_fetches()?;
        self.process_delete_requests()?;
        self.carousel.tick(Instant::now());

        if let Some(msg) = message {
            match (msg, self.modus) {
                (Message::Quit, m) if m != Modus::CMDINPUT => self.quit(),
                (Message::RawKey(key), Modus::CMDINPUT) => self.raw_input(key)?,
                (_, Modus::CMDINPUT) => (),
                (Message::Resize(width, height), _) => {
                    trace!("UI was resized! w:{width}, h:{height}");
                }
                (Message::Exit, Modus::POPUP) | (Message::Enter, Modus::POPUP) => self.exit()?,
                (_, Modus::POPUP) => (),
                (msg, _) => self.handle(msg)?,
            }
        }
        Ok(())
    }

    fn handle(&mut self, msg: Message) -> Result<(), PharmError> {
        match msg {
            Message::Help => self.show_popup(HELP_TEXT),
            Message::NextTab => {
                let tabs = View::tabs();
                let next = tabs[(self.view.position() + 1) % tabs.len()];
                self.open_view(next)?;
            }
            Message::PrevTab => {
                let tabs = View::tabs();
                let prev = tabs[(self.view.position() + tabs.len() - 1) % tabs.len()];
                self.open_view(prev)?;
            }
            Message::Jump(n) if self.modus == Modus::HOME => {
                self.carousel.select(n.saturating_sub(1))
            }
            Message::Jump(n) => {
                if let Some(r) = n.checked_sub(1).and_then(|i| Resource::all().get(i)) {
                    self.open_view(View::Resource(*r))?;
                }
            }
            Message::ToggleLanguage => self.toggle_language(),
            Message::Login => self.enter_cmd_mode(CMDMode::LoginUser, ""),
            Message::Logout => self.logout(),
            Message::CreateBackup => self.spawn("backup", Intent::Write, |api| {
                api.create_backup().map(Payload::BackupCreated)
            })?,
            Message::DownloadBackup => {
                let dir = self.config.download_dir.clone();
                self.spawn("backup download", Intent::Write, move |api| {
                    api.download_backup(&dir).map(Payload::BackupSaved)
                })?;
            }
            Message::Refresh => self.refresh()?,
            Message::Exit => self.exit()?,
            Message::Enter => self.enter()?,
            msg => match self.modus {
                Modus::HOME => match msg {
                    Message::MoveLeft | Message::PrevPage => self.carousel.prev(),
                    Message::MoveRight | Message::NextPage => self.carousel.next(),
                    _ => (),
                },
                Modus::TABLE => self.handle_table(msg)?,
                Modus::RECORD | Modus::SETTINGS => self.handle_record(msg)?,
                Modus::POPUP | Modus::CMDINPUT => (),
            },
        }
        Ok(())
    }

    fn handle_table(&mut self, msg: Message) -> Result<(), PharmError> {
        match msg {
            Message::MoveDown => self.table.select_next(),
            Message::MoveUp => self.table.select_prev(),
            Message::MoveLeft | Message::PrevPage => self.table.prev_page(),
            Message::MoveRight | Message::NextPage => self.table.next_page(),
            Message::FirstPage => self.table.goto_page(1),
            Message::LastPage => self.table.goto_page(self.table.page_count()),
            Message::Search => {
                self.query_before_search = self.table.query().to_string();
                let query = self.query_before_search.clone();
                self.enter_cmd_mode(CMDMode::Search, &query);
            }
            Message::Delete => {
                if let Some(id) = self.table.selected_row().map(Row::id) {
                    self.confirm_delete(id);
                }
            }
            Message::Create => self.start_create(),
            Message::UploadImage => self.start_upload(CMDMode::UploadImage),
            Message::UploadPdf => self.start_upload(CMDMode::UploadPdf),
            Message::CopyCell => {
                let text = self.table.selected_row().map(|row| {
                    match row.text("image").filter(|p| !p.is_empty()) {
                        Some(path) => self.client.media_url(&path),
                        None => self
                            .table
                            .edit_target(Row::id(row))
                            .unwrap_or_else(|| Row::id(row).to_string()),
                    }
                });
                if let Some(text) = text {
                    self.copy_to_clipboard(text);
                }
            }
            _ => (),
        }
        Ok(())
    }

    fn handle_record(&mut self, msg: Message) -> Result<(), PharmError> {
        let Some(record) = self.record_view.as_mut() else {
            return Ok(());
        };
        match msg {
            Message::MoveDown => record.move_down(1),
            Message::MoveUp => record.move_up(1),
            Message::NextPage => record.move_down(10),
            Message::PrevPage => record.move_up(10),
            Message::MoveLeft | Message::MoveRight => (),
            Message::EditField => self.start_edit_field(),
            Message::Delete => {
                let target = record
                    .resource
                    .filter(|r| r.deletable())
                    .and(record.record.identifier());
                match target {
                    Some(id) => self.confirm_delete(id),
                    None => self.set_status_message("This entry cannot be deleted"),
                }
            }
            Message::UploadImage => self.start_upload(CMDMode::UploadImage),
            Message::UploadPdf => self.start_upload(CMDMode::UploadPdf),
            Message::CopyCell => {
                let text = record.selected_key().map(|key| {
                    let value = record.record.text(&key).unwrap_or_default();
                    if is_media_field(&key) {
                        self.client.media_url(&value)
                    } else {
                        value
                    }
                });
                if let Some(text) = text {
                    self.copy_to_clipboard(text);
                }
            }
            _ => (),
        }
        Ok(())
    }

    // -------------------- Views ---------------------- //

    /// Switch screens. Requests started for the previous screen are abandoned.
    pub fn open_view(&mut self, view: View) -> Result<(), PharmError> {
        debug!("Opening view {:?}", view);
        self.fetcher.cancel_all();
        self.status = Status::READY;
        self.record_view = None;
        self.view = view;
        match view {
            View::Home => {
                self.modus = Modus::HOME;
                self.load_home()?;
            }
            View::Resource(resource) => {
                let (table, rx) = Self::build_table(
                    resource,
                    &self.config.api_url,
                    self.language,
                    self.config.page_size,
                );
                self.table = table;
                self.delete_requests = rx;
                self.modus = Modus::TABLE;
                self.load_resource(resource)?;
            }
            View::Settings => {
                self.modus = Modus::SETTINGS;
                if let Some(settings) = self.settings.clone() {
                    self.record_view = Some(RecordView::new(None, settings, self.language));
                }
                self.spawn("settings", Intent::Read, |api| {
                    api.settings().map(Payload::Settings)
                })?;
            }
        }
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), PharmError> {
        match self.view {
            View::Resource(resource) => self.load_resource(resource),
            View::Home => self.load_home(),
            View::Settings => self.spawn("settings", Intent::Read, |api| {
                api.settings().map(Payload::Settings)
            }),
        }
    }

    fn load_home(&mut self) -> Result<(), PharmError> {
        self.spawn("sections", Intent::Read, |api| {
            api.list(Resource::Content, &[("page_path", HERO_PAGE.to_string())])
                .map(Payload::Sections)
        })?;
        if self.is_authenticated() {
            self.spawn("stats", Intent::Read, |api| api.stats().map(Payload::Stats))?;
        }
        Ok(())
    }

    fn load_resource(&mut self, resource: Resource) -> Result<(), PharmError> {
        self.table.set_loading(true);
        let params = resource.list_params();
        self.spawn(resource.label(), Intent::Read, move |api| {
            api.list(resource, &params)
                .map(|rows| Payload::Rows(resource, rows))
        })
    }

    fn enter(&mut self) -> Result<(), PharmError> {
        match self.modus {
            Modus::HOME => self.open_view(View::Resource(Resource::Products))?,
            Modus::TABLE => {
                let View::Resource(resource) = self.view else {
                    return Ok(());
                };
                if let Some(row) = self.table.selected_row().cloned() {
                    let id = Row::id(&row);
                    self.record_view = Some(RecordView::new(Some(resource), row, self.language));
                    self.previous_modus = Modus::TABLE;
                    self.modus = Modus::RECORD;
                    // list rows may be abbreviated, load the full entry
                    self.spawn("record", Intent::Read, move |api| {
                        api.get(resource, id).map(|rec| Payload::Fetched(resource, rec))
                    })?;
                }
            }
            Modus::RECORD | Modus::SETTINGS => self.start_edit_field(),
            Modus::POPUP => self.exit()?,
            Modus::CMDINPUT => (),
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), PharmError> {
        match self.modus {
            Modus::HOME => {}
            Modus::TABLE => {
                if self.table.query().is_empty() {
                    self.open_view(View::Home)?;
                } else {
                    self.table.clear_query();
                }
            }
            Modus::RECORD => {
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
                self.record_view = None;
            }
            Modus::SETTINGS => self.open_view(View::Home)?,
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.popup_message = None;
            }
            Modus::CMDINPUT => {}
        }
        Ok(())
    }

    fn toggle_language(&mut self) {
        self.language = self.language.next();
        info!("Language switched to {}", self.language);
        if let View::Resource(resource) = self.view {
            let rows = self.table.rows().to_vec();
            let query = self.table.query().to_string();
            let loading = self.table.is_loading();
            let (table, rx) = Self::build_table(
                resource,
                &self.config.api_url,
                self.language,
                self.config.page_size,
            );
            self.table = table;
            self.delete_requests = rx;
            self.table.set_rows(rows);
            self.table.set_query(&query);
            self.table.set_loading(loading);
        }
        if let Some(record) = self.record_view.as_mut() {
            record.title = RecordView::title_for(record.resource, &record.record, self.language);
        }
        self.carousel
            .load_sections(&self.sections, self.language, Instant::now());
        self.set_status_message(format!("Language: {}", self.language.name()));
    }

    fn copy_to_clipboard(&mut self, text: String) {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard unavailable: {:?}", e);
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text.clone()) {
                Ok(_) => self.set_status_message(format!("Copied {text}")),
                Err(e) => trace!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    // -------------------- Requests ---------------------- //

    fn spawn<F>(&mut self, label: &str, intent: Intent, job: F) -> Result<(), PharmError>
    where
        F: FnOnce(&ApiClient) -> Result<Payload, ApiError> + Send + 'static,
    {
        self.fetcher.spawn(label, intent, &self.client, job)?;
        self.status = Status::LOADING;
        Ok(())
    }

    fn process_fetches(&mut self) -> Result<(), PharmError> {
        for outcome in self.fetcher.poll() {
            match outcome.result {
                Ok(payload) => self.apply(payload)?,
                Err(ApiError::Unauthorized) if outcome.label == LOGIN => {
                    info!("Login rejected");
                    self.set_status_message("Incorrect username or password");
                    self.enter_cmd_mode(CMDMode::LoginUser, "");
                }
                Err(ApiError::Unauthorized) => self.session_expired(),
                Err(e) => {
                    error!("{} failed: {e}", outcome.label);
                    self.table.set_loading(false);
                    let message = format!("{} failed: {e}", outcome.label);
                    match outcome.intent {
                        Intent::Write => self.show_popup(message),
                        Intent::Read => self.set_status_message(message),
                    }
                }
            }
        }
        if self.status == Status::LOADING && !self.fetcher.busy() {
            self.status = Status::READY;
        }
        Ok(())
    }

    fn apply(&mut self, payload: Payload) -> Result<(), PharmError> {
        match payload {
            Payload::Rows(resource, rows) => {
                if self.view == View::Resource(resource) {
                    self.set_status_message(format!(
                        "Loaded {} {}",
                        rows.len(),
                        resource.label().to_lowercase()
                    ));
                    self.table.set_rows(rows);
                }
            }
            Payload::Fetched(resource, record) => {
                if let Some(view) = self.record_view.as_mut()
                    && view.resource == Some(resource)
                    && view.record.identifier() == record.identifier()
                {
                    view.record = record;
                    view.title = RecordView::title_for(view.resource, &view.record, self.language);
                }
            }
            Payload::User(user) => {
                if let Some(session) = self.client.session()
                    && session.username().is_none()
                {
                    let name = user.text("username");
                    let session = Session::new(session.token(), name);
                    self.client.set_session(Some(session));
                }
                let name = self.username().unwrap_or("admin").to_string();
                self.set_status_message(format!("Logged in as {name}"));
            }
            Payload::Saved(resource, record) => {
                self.set_status_message(format!(
                    "Saved {} #{}",
                    resource.label(),
                    record.identifier().unwrap_or_default()
                ));
                if let Some(view) = self.record_view.as_mut()
                    && view.resource == Some(resource)
                    && view.record.identifier() == record.identifier()
                {
                    view.record = record;
                }
                if self.view == View::Resource(resource) {
                    self.load_resource(resource)?;
                }
            }
            Payload::Deleted(resource, id) => {
                self.set_status_message(format!("Deleted {} #{id}", resource.label()));
                if self
                    .record_view
                    .as_ref()
                    .is_some_and(|v| v.record.identifier() == Some(id))
                {
                    self.record_view = None;
                    if self.modus == Modus::RECORD {
                        self.modus = Modus::TABLE;
                    }
                }
                if self.view == View::Resource(resource) {
                    self.load_resource(resource)?;
                }
            }
            Payload::Sections(sections) => {
                self.carousel
                    .load_sections(&sections, self.language, Instant::now());
                self.sections = sections;
            }
            Payload::Stats(stats) => self.stats = Some(stats),
            Payload::Settings(settings) => {
                if self.view == View::Settings {
                    let cursor = self.record_view.as_ref().map(|v| v.curser_row).unwrap_or(0);
                    let mut view = RecordView::new(None, settings.clone(), self.language);
                    view.curser_row = cursor;
                    self.record_view = Some(view);
                }
                self.settings = Some(settings);
            }
            Payload::LoggedIn(session) => {
                let name = session.username().unwrap_or("admin").to_string();
                if let Some(store) = &self.token_store
                    && let Err(e) = store.save(&session)
                {
                    error!("Cannot persist session: {e}");
                }
                self.client.set_session(Some(session));
                self.open_view(self.view)?;
                self.set_status_message(format!("Logged in as {name}"));
            }
            Payload::Uploaded(path) => {
                let url = self.client.media_url(&path);
                self.set_status_message(format!("Uploaded {url}"));
                if let Some(target) = self.upload_target.take() {
                    self.submit_field(target.resource, target.id, target.field, Value::String(path))?;
                }
            }
            Payload::BackupCreated(name) => self.set_status_message(format!(
                "Backup created {}",
                name.unwrap_or_default()
            )),
            Payload::BackupSaved(path) => {
                self.set_status_message(format!("Backup saved to {}", path.display()))
            }
        }
        Ok(())
    }

    fn process_delete_requests(&mut self) -> Result<(), PharmError> {
        let requested: Vec<i64> = self.delete_requests.try_iter().collect();
        for id in requested {
            if let View::Resource(resource) = self.view {
                self.spawn("delete", Intent::Write, move |api| {
                    api.delete(resource, id).map(|_| Payload::Deleted(resource, id))
                })?;
            }
        }
        Ok(())
    }

    fn session_expired(&mut self) {
        info!("Session rejected by server");
        self.table.set_loading(false);
        self.logout();
        self.set_status_message("Session expired, please log in");
        self.enter_cmd_mode(CMDMode::LoginUser, "");
    }

    fn logout(&mut self) {
        self.client.set_session(None);
        self.stats = None;
        if let Some(store) = &self.token_store
            && let Err(e) = store.clear()
        {
            error!("Cannot remove token file: {e}");
        }
        self.set_status_message("Logged out");
    }

    /// Write one attribute, either of a resource entry or of the settings.
    fn submit_field(
        &mut self,
        resource: Option<Resource>,
        id: i64,
        field: String,
        value: Value,
    ) -> Result<(), PharmError> {
        match resource {
            Some(resource) => {
                let mut body = Map::new();
                body.insert(field, value);
                let body = Value::Object(body);
                self.spawn("save", Intent::Write, move |api| {
                    api.update(resource, id, &body)
                        .map(|rec| Payload::Saved(resource, rec))
                })
            }
            None => {
                let mut settings = self.settings.clone().unwrap_or_default();
                settings.0.insert(field, value);
                settings.0.remove("id");
                let body = Value::Object(settings.0);
                self.spawn("save settings", Intent::Write, move |api| {
                    api.update_settings(&body).map(Payload::Settings)
                })
            }
        }
    }

    // -------------------- Command line ---------------------- //

    fn confirm_delete(&mut self, id: i64) {
        if !self.table.can_delete() {
            self.set_status_message("This entry cannot be deleted");
            return;
        }
        self.pending_delete = Some(id);
        self.enter_cmd_mode(CMDMode::ConfirmDelete, "");
    }

    fn start_create(&mut self) {
        match self.view {
            View::Resource(r) if r.creatable() => self.enter_cmd_mode(CMDMode::Create, "{}"),
            _ => self.set_status_message("Nothing to create here"),
        }
    }

    fn start_edit_field(&mut self) {
        let Some(view) = self.record_view.as_ref() else {
            return;
        };
        if view.resource.is_some_and(|r| !r.editable()) {
            self.set_status_message("This entry is read-only");
            return;
        }
        let Some(key) = view.selected_key() else {
            return;
        };
        if matches!(key.as_str(), "id" | "created_at" | "updated_at") {
            self.set_status_message(format!("{key} is read-only"));
            return;
        }
        let current = view.record.text(&key).unwrap_or_default();
        self.editing_field = Some(key);
        self.enter_cmd_mode(CMDMode::EditField, &current);
    }

    fn start_upload(&mut self, mode: CMDMode) {
        self.upload_target = self.record_view.as_ref().and_then(|view| {
            let field = view.selected_key().filter(|k| is_media_field(k))?;
            Some(UploadTarget {
                resource: view.resource,
                id: view.record.identifier().unwrap_or_default(),
                field,
            })
        });
        self.enter_cmd_mode(mode, "");
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, prefill: &str) {
        trace!("Entering command mode {:?}", mode);
        if self.modus != Modus::CMDINPUT {
            self.previous_modus = self.modus;
        }
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.input.set(prefill);
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) -> Result<(), PharmError> {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.cmd_mode == Some(CMDMode::Search) {
                let query = self.last_input.input.clone();
                self.table.set_query(&query);
            }
            if self.last_input.finished {
                self.handle_cmd_input()?;
            }
        }
        Ok(())
    }

    fn handle_cmd_input(&mut self) -> Result<(), PharmError> {
        trace!("Handle cmd input {:?}", self.cmd_mode);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let mode = self.cmd_mode.take();
        let input = self.last_input.input.clone();
        if self.last_input.canceled {
            if mode == Some(CMDMode::Search) {
                let query = std::mem::take(&mut self.query_before_search);
                self.table.set_query(&query);
            }
            self.pending_delete = None;
            self.pending_user = None;
            self.editing_field = None;
            self.upload_target = None;
            return Ok(());
        }

        match mode {
            Some(CMDMode::Search) => self.table.set_query(&input),
            Some(CMDMode::ConfirmDelete) => {
                if let Some(id) = self.pending_delete.take()
                    && input.trim().eq_ignore_ascii_case("y")
                {
                    self.table.delete(id);
                }
            }
            Some(CMDMode::LoginUser) => {
                self.pending_user = Some(input);
                self.enter_cmd_mode(CMDMode::LoginPassword, "");
            }
            Some(CMDMode::LoginPassword) => {
                let username = self.pending_user.take().unwrap_or_default();
                self.spawn(LOGIN, Intent::Write, move |api| {
                    api.login(&username, &input).map(Payload::LoggedIn)
                })?;
            }
            Some(CMDMode::EditField) => {
                let Some(field) = self.editing_field.take() else {
                    return Ok(());
                };
                let Some(view) = self.record_view.as_ref() else {
                    return Ok(());
                };
                let value = parse_field_value(view.record.0.get(&field), &input);
                let resource = view.resource;
                let id = view.record.identifier().unwrap_or_default();
                self.submit_field(resource, id, field, value)?;
            }
            Some(CMDMode::Create) => {
                let View::Resource(resource) = self.view else {
                    return Ok(());
                };
                match serde_json::from_str::<Value>(&input) {
                    Ok(body @ Value::Object(_)) => {
                        self.spawn("create", Intent::Write, move |api| {
                            api.create(resource, &body)
                                .map(|rec| Payload::Saved(resource, rec))
                        })?;
                    }
                    Ok(_) => self.show_popup("Expected a JSON object"),
                    Err(e) => self.show_popup(format!("Invalid JSON: {e}")),
                }
            }
            Some(CMDMode::UploadImage) | Some(CMDMode::UploadPdf) => {
                let kind = if mode == Some(CMDMode::UploadImage) {
                    UploadKind::Image
                } else {
                    UploadKind::Pdf
                };
                let path = match shellexpand::full(input.trim()) {
                    Ok(p) => PathBuf::from(p.into_owned()),
                    Err(e) => {
                        self.show_popup(format!("Invalid path: {e}"));
                        return Ok(());
                    }
                };
                self.spawn("upload", Intent::Write, move |api| {
                    api.upload(kind, &path).map(Payload::Uploaded)
                })?;
            }
            None => info!("Cmd mode is none!"),
        }
        Ok(())
    }
}
