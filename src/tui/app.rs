#![forbid(unsafe_code)]

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};

use crate::api::TaskBackend;
use crate::config::Config;
use crate::core::controller::{self, DeleteOutcome, TaskListController};
use crate::core::state::{Dropdown, TaskListState};
use crate::task::columns::{self, COLUMNS};
use crate::task::model::{Task, TaskStatus};
use crate::task::sort::FieldPath;
use crate::task::user::User;
use crate::tui::{self, TerminalGuard};

pub async fn run<B: TaskBackend>(
    cfg: &Config,
    mut ctl: TaskListController<B>,
) -> anyhow::Result<()> {
    let terminal = tui::init_terminal()?;
    let mut guard = TerminalGuard::new(terminal);

    let mut app = AppState::new(cfg);
    if !cfg.ui.default_sort.trim().is_empty() {
        let key = FieldPath::new(&cfg.ui.default_sort);
        ctl.state_mut().sort(key.clone());
        if cfg.ui.default_reverse {
            ctl.state_mut().sort(key);
        }
    }
    perform(Action::Reload, &mut app, &mut ctl).await;

    let tick = Duration::from_millis(cfg.ui.tick_rate_ms);
    while !app.should_quit {
        {
            let Some(terminal) = guard.terminal.as_mut() else {
                anyhow::bail!("terminal unavailable");
            };
            terminal.draw(|f| draw(f, &mut app, ctl.state()))?;
        }

        if event::poll(tick)?
            && let Event::Key(key) = event::read()?
            && let Some(action) = handle_key(key, &mut app, ctl.state_mut())
        {
            perform(action, &mut app, &mut ctl).await;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Filtering,
    Dropdown(Dropdown),
    Editor,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorField {
    Description,
    Status,
    Assignee,
}

impl EditorField {
    fn next(self) -> Self {
        match self {
            Self::Description => Self::Status,
            Self::Status => Self::Assignee,
            Self::Assignee => Self::Description,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Description => Self::Assignee,
            Self::Status => Self::Description,
            Self::Assignee => Self::Status,
        }
    }
}

#[derive(Debug, Clone)]
struct ConfirmDialog {
    message: String,
    targets: Vec<Task>,
}

#[derive(Debug)]
enum Action {
    Reload,
    SaveEditor,
    AssignTo(User),
    ChangeStatus(TaskStatus),
    Delete { confirmed: bool },
}

#[derive(Debug)]
struct AppState {
    icons: bool,
    filtering: bool,
    filter_input: String,
    table_state: TableState,
    column: usize,
    dropdown_state: ListState,
    editor_field: EditorField,
    confirm: Option<ConfirmDialog>,
    toast: Option<String>,
    last_error: Option<String>,
    should_quit: bool,
}

impl AppState {
    fn new(cfg: &Config) -> Self {
        let mut table_state = TableState::default();
        table_state.select(Some(0));
        Self {
            icons: cfg.ui.icons,
            filtering: false,
            filter_input: String::new(),
            table_state,
            column: 0,
            dropdown_state: ListState::default(),
            editor_field: EditorField::Description,
            confirm: None,
            toast: None,
            last_error: None,
            should_quit: false,
        }
    }

    /// The confirm dialog sits above the editor, which sits above dropdowns.
    fn mode(&self, state: &TaskListState) -> Mode {
        if self.confirm.is_some() {
            Mode::Confirm
        } else if state.editor().is_some() {
            Mode::Editor
        } else if let Some(d) = state.open_dropdown() {
            Mode::Dropdown(d)
        } else if self.filtering {
            Mode::Filtering
        } else {
            Mode::Normal
        }
    }

    fn cursor(&self) -> usize {
        self.table_state.selected().unwrap_or(0)
    }

    fn clamp_cursor(&mut self, rows: usize) {
        let idx = self.cursor().min(rows.saturating_sub(1));
        self.table_state.select(Some(idx));
    }

    fn move_cursor(&mut self, delta: i64, rows: usize) {
        if rows == 0 {
            return;
        }
        let cur = i64::try_from(self.cursor()).unwrap_or(i64::MAX);
        let max = i64::try_from(rows - 1).unwrap_or(i64::MAX);
        let next = usize::try_from((cur + delta).clamp(0, max)).unwrap_or(0);
        self.table_state.select(Some(next));
    }

    fn report<T>(&mut self, result: Result<T, crate::error::TasklistError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            }
            Err(e) => {
                let hint = if e.is_transport() { " (r to retry)" } else { "" };
                self.last_error = Some(format!("{e}{hint}"));
                None
            }
        }
    }
}

fn cursor_task(app: &AppState, state: &TaskListState) -> Option<Task> {
    state.sorted_view().get(app.cursor()).cloned()
}

async fn perform<B: TaskBackend>(
    action: Action,
    app: &mut AppState,
    ctl: &mut TaskListController<B>,
) {
    app.toast = None;
    match action {
        Action::Reload => {
            let res = ctl.load_all().await;
            if app.report(res).is_some() {
                app.toast = Some(format!("{} tâches", ctl.state().tasks().len()));
            }
        }
        Action::SaveEditor => {
            let res = ctl.save_editor().await;
            if app.report(res).is_some() {
                app.toast = Some("Enregistré".to_owned());
            }
        }
        Action::AssignTo(user) => {
            ctl.state_mut().close_dropdowns();
            let name = user.username.clone();
            let res = ctl.assign_to(Some(user)).await;
            if let Some(n) = app.report(res) {
                app.toast = Some(format!("{n} tâche(s) assignée(s) à {name}"));
            }
        }
        Action::ChangeStatus(status) => {
            ctl.state_mut().close_dropdowns();
            let res = ctl.change_status(status).await;
            if let Some(n) = app.report(res) {
                app.toast = Some(format!("{n} tâche(s) : {}", status.label()));
            }
        }
        Action::Delete { confirmed } => {
            let Some(dialog) = app.confirm.take() else {
                return;
            };
            let res = ctl
                .delete_tasks(Some(dialog.targets), |_| confirmed)
                .await;
            if let Some(DeleteOutcome::Deleted(n)) = app.report(res) {
                app.toast = Some(format!("{n} tâche(s) supprimée(s)"));
            }
        }
    }
    app.clamp_cursor(ctl.state().sorted_view().len());
}

fn handle_key(key: KeyEvent, app: &mut AppState, state: &mut TaskListState) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        app.should_quit = true;
        return None;
    }

    match app.mode(state) {
        Mode::Confirm => match key.code {
            KeyCode::Char('y' | 'o') => Some(Action::Delete { confirmed: true }),
            KeyCode::Char('n') | KeyCode::Esc => Some(Action::Delete { confirmed: false }),
            _ => None,
        },
        Mode::Editor => handle_editor_key(key, app, state),
        Mode::Dropdown(dropdown) => handle_dropdown_key(key, dropdown, app, state),
        Mode::Filtering => {
            match key.code {
                KeyCode::Esc => app.filtering = false,
                KeyCode::Enter => {
                    state.set_filter(app.filter_input.clone());
                    app.filtering = false;
                    app.table_state.select(Some(0));
                }
                KeyCode::Backspace => {
                    app.filter_input.pop();
                }
                KeyCode::Char(c)
                    if !key.modifiers.contains(KeyModifiers::CONTROL)
                        && !key.modifiers.contains(KeyModifiers::ALT) =>
                {
                    app.filter_input.push(c);
                }
                _ => {}
            }
            None
        }
        Mode::Normal => handle_normal_key(key, app, state),
    }
}

fn handle_normal_key(key: KeyEvent, app: &mut AppState, state: &mut TaskListState) -> Option<Action> {
    let rows = state.sorted_view().len();
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.move_cursor(-1, rows),
        KeyCode::Down | KeyCode::Char('j') => app.move_cursor(1, rows),
        KeyCode::PageUp => app.move_cursor(-10, rows),
        KeyCode::PageDown => app.move_cursor(10, rows),
        KeyCode::Left | KeyCode::Char('h') => app.column = app.column.saturating_sub(1),
        KeyCode::Right | KeyCode::Char('l') => app.column = (app.column + 1).min(COLUMNS.len() - 1),
        KeyCode::Char('o') => state.sort(FieldPath::new(COLUMNS[app.column].path)),
        KeyCode::Char(c @ '1'..='7') => {
            let idx = (c as usize) - ('1' as usize);
            app.column = idx;
            state.sort(FieldPath::new(COLUMNS[idx].path));
        }
        KeyCode::Char(' ') => {
            if let Some(id) = cursor_task(app, state).and_then(|t| t.id) {
                state.toggle_selected(&id);
            }
            app.move_cursor(1, rows);
        }
        KeyCode::Char('a') => {
            let all = state.all_selected();
            state.set_all_selected(!all);
        }
        KeyCode::Char('/') => {
            app.filtering = true;
            app.filter_input = state.filter().to_owned();
        }
        KeyCode::Char('u') => open_dropdown(Dropdown::AssignTo, app, state),
        KeyCode::Char('s') => open_dropdown(Dropdown::ChangeStatus, app, state),
        KeyCode::Char('n') => {
            state.open_editor(None);
            app.editor_field = EditorField::Description;
        }
        KeyCode::Enter | KeyCode::Char('e') => {
            if let Some(task) = cursor_task(app, state) {
                state.open_editor(Some(&task));
                app.editor_field = EditorField::Description;
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            let mut targets: Vec<Task> = state.selected_tasks().into_iter().cloned().collect();
            if targets.is_empty() {
                targets.extend(cursor_task(app, state));
            }
            ask_delete(app, targets);
        }
        KeyCode::Char('r') => return Some(Action::Reload),
        _ => {}
    }
    None
}

fn open_dropdown(dropdown: Dropdown, app: &mut AppState, state: &mut TaskListState) {
    if !state.is_admin() {
        app.toast = Some("Réservé aux administrateurs".to_owned());
        return;
    }
    if state.selected_count() == 0 {
        app.toast = Some("Aucune tâche sélectionnée".to_owned());
        return;
    }
    state.toggle_dropdown(dropdown);
    app.dropdown_state.select(Some(0));
}

fn ask_delete(app: &mut AppState, targets: Vec<Task>) {
    if targets.is_empty() {
        return;
    }
    app.confirm = Some(ConfirmDialog {
        message: controller::delete_prompt(targets.len()).to_owned(),
        targets,
    });
}

fn dropdown_len(dropdown: Dropdown, state: &TaskListState) -> usize {
    match dropdown {
        Dropdown::AssignTo => state.users().len(),
        Dropdown::ChangeStatus => TaskStatus::ALL.len(),
    }
}

fn handle_dropdown_key(
    key: KeyEvent,
    dropdown: Dropdown,
    app: &mut AppState,
    state: &mut TaskListState,
) -> Option<Action> {
    let len = dropdown_len(dropdown, state);
    let cur = app.dropdown_state.selected().unwrap_or(0);
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => state.close_dropdowns(),
        KeyCode::Char('u') => open_dropdown(Dropdown::AssignTo, app, state),
        KeyCode::Char('s') => open_dropdown(Dropdown::ChangeStatus, app, state),
        KeyCode::Up | KeyCode::Char('k') => {
            app.dropdown_state.select(Some(cur.saturating_sub(1)));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.dropdown_state
                .select(Some((cur + 1).min(len.saturating_sub(1))));
        }
        KeyCode::Enter => {
            return match dropdown {
                Dropdown::AssignTo => state.users().get(cur).cloned().map(Action::AssignTo),
                Dropdown::ChangeStatus => TaskStatus::ALL.get(cur).copied().map(Action::ChangeStatus),
            };
        }
        _ => {}
    }
    None
}

fn handle_editor_key(key: KeyEvent, app: &mut AppState, state: &mut TaskListState) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('d')) {
        let target = state.editor().filter(|t| !t.is_new()).cloned();
        ask_delete(app, target.into_iter().collect());
        return None;
    }

    let users: Vec<User> = state.users().to_vec();
    let field = app.editor_field;
    let task = state.editor_mut()?;
    match key.code {
        KeyCode::Esc => state.close_editor(),
        KeyCode::Enter => return Some(Action::SaveEditor),
        KeyCode::Tab | KeyCode::Down => app.editor_field = field.next(),
        KeyCode::BackTab | KeyCode::Up => app.editor_field = field.prev(),
        KeyCode::Backspace if field == EditorField::Description => {
            task.description.pop();
        }
        KeyCode::Char(c)
            if field == EditorField::Description
                && !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT) =>
        {
            task.description.push(c);
        }
        KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => match field {
            EditorField::Status => {
                task.status = if key.code == KeyCode::Left {
                    cycle_back(task.status)
                } else {
                    task.status.next()
                };
            }
            EditorField::Assignee => {
                task.assigned = cycle_user(task.assigned.as_ref(), &users, key.code == KeyCode::Left);
            }
            EditorField::Description => {}
        },
        _ => {}
    }
    None
}

fn cycle_back(status: TaskStatus) -> TaskStatus {
    // Three steps forward is one step back in a ring of four.
    status.next().next().next()
}

/// Cycles through "nobody" followed by every user.
fn cycle_user(current: Option<&User>, users: &[User], backwards: bool) -> Option<User> {
    let slots = users.len() + 1;
    let pos = current
        .and_then(|u| users.iter().position(|x| x.id == u.id && x.username == u.username))
        .map_or(0, |i| i + 1);
    let next = if backwards {
        (pos + slots - 1) % slots
    } else {
        (pos + 1) % slots
    };
    next.checked_sub(1).and_then(|i| users.get(i)).cloned()
}

fn draw(f: &mut Frame<'_>, app: &mut AppState, state: &TaskListState) {
    let area = f.area();
    let outer = Block::default().title("tasklist").borders(Borders::ALL);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1), Constraint::Length(2)])
        .split(inner);

    draw_header(f, chunks[0], state);
    draw_table(f, chunks[1], app, state);
    draw_footer(f, chunks[2], app, state);

    match app.mode(state) {
        Mode::Dropdown(d) => draw_dropdown(f, app, state, d),
        Mode::Editor => draw_editor(f, app, state),
        _ => {}
    }
    if let Some(confirm) = &app.confirm {
        draw_confirm(f, confirm);
    }
}

fn draw_header(f: &mut Frame<'_>, area: Rect, state: &TaskListState) {
    let who = match state.current_user() {
        Some(u) if u.is_admin() => format!("{} (admin)", u.username),
        Some(u) => u.username.clone(),
        None => "non connecté".to_owned(),
    };
    let sort = match state.sort_state() {
        Some(s) => format!("{} {}", s.key, if s.descending { "▼" } else { "▲" }),
        None => "-".to_owned(),
    };
    let line = Line::from(vec![
        Span::styled(who, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "   {}/{} sélectionnée(s)   tri: {sort}",
            state.selected_count(),
            state.tasks().len()
        )),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_table(f: &mut Frame<'_>, area: Rect, app: &mut AppState, state: &TaskListState) {
    let sort = state.sort_state();
    let all_box = checkbox(state.all_selected(), app.icons);
    let mut header_cells = vec![Cell::from(all_box)];
    header_cells.extend(COLUMNS.iter().enumerate().map(|(i, col)| {
        let arrow = match sort {
            Some(s) if s.key.to_string() == col.path => {
                if s.descending { " ▼" } else { " ▲" }
            }
            _ => "",
        };
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if i == app.column {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        Cell::from(format!("{}{arrow}", col.title)).style(style)
    }));
    let header = Row::new(header_cells);

    let view = state.sorted_view();
    let rows = view.iter().map(|task| {
        let mut cells = vec![Cell::from(checkbox(task.selected, app.icons))];
        cells.extend(COLUMNS.iter().map(|c| {
            let text = columns::cell_text(task, c);
            if c.path == "status" {
                Cell::from(text).style(status_style(task.status))
            } else {
                Cell::from(text)
            }
        }));
        let row = Row::new(cells);
        if task.selected {
            row.style(Style::default().add_modifier(Modifier::BOLD))
        } else {
            row
        }
    });

    let widths = [
        Constraint::Length(3),
        Constraint::Length(6),
        Constraint::Percentage(35),
        Constraint::Length(14),
        Constraint::Length(11),
        Constraint::Length(16),
        Constraint::Length(16),
        Constraint::Length(16),
    ];

    let title = if state.filter().is_empty() {
        format!("Tâches ({})", view.len())
    } else {
        format!("Tâches ({}/{}) filtre: {}", view.len(), state.tasks().len(), state.filter())
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn checkbox(checked: bool, icons: bool) -> &'static str {
    match (checked, icons) {
        (true, true) => "☑",
        (false, true) => "☐",
        (true, false) => "[x]",
        (false, false) => "[ ]",
    }
}

fn status_style(status: TaskStatus) -> Style {
    match status {
        TaskStatus::Waiting => Style::default(),
        TaskStatus::InProgress => Style::default().fg(Color::Blue),
        TaskStatus::Completed => Style::default().fg(Color::Green),
        TaskStatus::Canceled => Style::default().fg(Color::Yellow),
    }
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &AppState, state: &TaskListState) {
    let keys = match app.mode(state) {
        Mode::Normal if state.is_admin() => {
            "q quit • space select • a all • 1-7/o sort • / filter • n new • e edit • d delete • u assign • s status • r reload"
        }
        Mode::Normal => {
            "q quit • space select • a all • 1-7/o sort • / filter • n new • e edit • d delete • r reload"
        }
        Mode::Filtering => "Enter apply • Esc cancel",
        Mode::Dropdown(_) => "↑/↓ choose • Enter apply • Esc close",
        Mode::Editor => "Tab field • ←/→ change • Enter save • Ctrl-d delete • Esc close",
        Mode::Confirm => "y confirm • n cancel",
    };

    let mut lines = Vec::new();
    if app.mode(state) == Mode::Filtering {
        lines.push(Line::from(vec![
            Span::styled("Filtre: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(app.filter_input.as_str()),
        ]));
    } else if let Some(err) = &app.last_error {
        lines.push(Line::from(Span::styled(
            format!("Last error: {err}"),
            Style::default().fg(Color::Red),
        )));
    } else if let Some(toast) = &app.toast {
        lines.push(Line::from(Span::styled(
            toast.as_str(),
            Style::default().fg(Color::Green),
        )));
    } else {
        lines.push(Line::from(""));
    }
    lines.push(Line::from(Span::styled(
        keys,
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_dropdown(f: &mut Frame<'_>, app: &mut AppState, state: &TaskListState, dropdown: Dropdown) {
    let (title, items): (&str, Vec<ListItem<'_>>) = match dropdown {
        Dropdown::AssignTo => (
            "Assigner à",
            state
                .users()
                .iter()
                .map(|u| ListItem::new(u.username.clone()))
                .collect(),
        ),
        Dropdown::ChangeStatus => (
            "Changer le statut",
            TaskStatus::ALL
                .iter()
                .map(|s| ListItem::new(s.label()).style(status_style(*s)))
                .collect(),
        ),
    };

    let area = centered_rect(40, 50, f.area());
    f.render_widget(Clear, area);
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut app.dropdown_state);
}

fn draw_editor(f: &mut Frame<'_>, app: &AppState, state: &TaskListState) {
    let Some(task) = state.editor() else {
        return;
    };
    let title = match &task.id {
        Some(id) => format!("Tâche #{id}"),
        None => "Nouvelle tâche".to_owned(),
    };
    let area = centered_rect(70, 40, f.area());
    f.render_widget(Clear, area);

    let field_line = |field: EditorField, label: &str, value: String| {
        let active = app.editor_field == field;
        let marker = if active { "> " } else { "  " };
        let style = if active {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{label}: "), style),
            Span::raw(value),
        ])
    };

    let mut description = task.description.clone();
    if app.editor_field == EditorField::Description {
        description.push('▏');
    }
    let mut lines = vec![
        field_line(EditorField::Description, "Tâche", description),
        field_line(EditorField::Status, "Statut", format!("◀ {} ▶", task.status.label())),
        field_line(
            EditorField::Assignee,
            "Assignée à",
            format!("◀ {} ▶", task.assignee_name().unwrap_or("personne")),
        ),
        Line::from(""),
    ];
    for (label, ts) in [
        ("Créée le", &task.created_at),
        ("Démarrée le", &task.started_at),
        ("Terminée le", &task.completed_at),
    ] {
        if let Some(ts) = ts {
            lines.push(Line::from(format!("  {label}: {}", ts.display())));
        }
    }

    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn draw_confirm(f: &mut Frame<'_>, confirm: &ConfirmDialog) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title("Supprimer");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines = vec![
        Line::from(confirm.message.clone()),
        Line::from(""),
        Line::from("[y] Oui    [n] Non"),
    ];
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
