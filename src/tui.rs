use std::collections::HashMap;
use std::io;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols,
    text::Line,
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, List,
        ListItem, Paragraph, Row, Table, TableState,
    },
};
use tokio::sync::mpsc;
use tracing::warn;

use crate::advice::Advice;
use crate::analysis::{BatchJob, DataSource};
use crate::price_history::{PriceHistorySource, PriceSeries, YahooHistory};
use crate::report::{self, DashboardRow, DashboardTable};

const CHART_DAYS: u32 = 30;
const LOG_LIMIT: usize = 200;

// --- Data & App State ---

/// Everything the viewer reads from disk.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    pub table: DashboardTable,
    pub data_sources: HashMap<String, DataSource>,
    pub currency_symbol: String,
}

enum AppEvent {
    Loaded(Result<DashboardView, String>),
    BatchFinished(Result<usize, String>),
    History {
        symbol: String,
        series: Result<PriceSeries, String>,
    },
    LatestPrice {
        symbol: String,
        price: Result<f64, String>,
    },
}

struct PriceChart {
    symbol: String,
    points: Vec<(f64, f64)>,
    first: NaiveDate,
    last: NaiveDate,
}

struct App {
    job: BatchJob,
    view: DashboardView,
    table_state: TableState,
    chart: Option<PriceChart>,
    log: Vec<String>,
    is_refreshing: bool,
}

impl App {
    fn new(job: BatchJob) -> Self {
        Self {
            job,
            view: DashboardView::default(),
            table_state: TableState::default(),
            chart: None,
            log: Vec::new(),
            is_refreshing: false,
        }
    }

    fn status(&mut self, message: impl Into<String>) {
        let line = format!("{} {}", Local::now().format("%H:%M:%S"), message.into());
        self.log.push(line);
        if self.log.len() > LOG_LIMIT {
            self.log.remove(0);
        }
    }

    fn set_view(&mut self, view: DashboardView) {
        let rows = view.table.rows.len();
        self.view = view;
        self.table_state.select(match (self.table_state.selected(), rows) {
            (_, 0) => None,
            (Some(i), n) => Some(i.min(n - 1)),
            (None, _) => Some(0),
        });
        self.status(format!("loaded {} rows", rows));
    }

    fn selected(&self) -> Option<&DashboardRow> {
        self.table_state.selected().and_then(|i| self.view.table.rows.get(i))
    }

    fn move_selection(&mut self, down: bool) {
        let n = self.view.table.rows.len();
        if n == 0 {
            return;
        }
        let next = match self.table_state.selected() {
            None => 0,
            Some(i) if down => (i + 1) % n,
            Some(i) => i.checked_sub(1).unwrap_or(n - 1),
        };
        self.table_state.select(Some(next));
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Loaded(Ok(view)) => self.set_view(view),
            AppEvent::Loaded(Err(e)) => self.status(format!("reload failed: {}", e)),
            AppEvent::BatchFinished(result) => {
                self.is_refreshing = false;
                match result {
                    Ok(n) => self.status(format!("batch finished, {} symbols analyzed", n)),
                    Err(e) => self.status(format!("batch failed: {}", e)),
                }
            }
            AppEvent::History { symbol, series } => match series {
                Ok(series) if !series.is_empty() => {
                    let points = series
                        .bars()
                        .iter()
                        .enumerate()
                        .map(|(i, bar)| (i as f64, bar.close))
                        .collect();
                    let first = series.bars()[0].date;
                    let last = series.last_date().unwrap_or(first);
                    self.chart = Some(PriceChart { symbol, points, first, last });
                }
                Ok(_) => self.status(format!("{}: no history", symbol)),
                Err(e) => self.status(format!("{}: history failed: {}", symbol, e)),
            },
            AppEvent::LatestPrice { symbol, price } => match price {
                Ok(p) => self.status(format!("{} latest close {:.2}", symbol, p)),
                Err(e) => self.status(format!("{}: latest price failed: {}", symbol, e)),
            },
        }
    }
}

// --- Data Loading ---

pub async fn load_view(job: &BatchJob) -> Result<DashboardView> {
    let table = report::load_dashboard(&job.dashboard)?;

    let (data_sources, currency_symbol) = match report::find_snapshot(&job.storage_dir).await {
        Ok(snapshot) => (snapshot.data_sources(), snapshot.currency_symbol),
        Err(e) => {
            warn!(error = %e, "no run snapshot, data sources unknown");
            (HashMap::new(), String::new())
        }
    };

    Ok(DashboardView {
        table,
        data_sources,
        currency_symbol,
    })
}

fn spawn_reload(job: BatchJob, tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let result = load_view(&job).await.map_err(|e| e.to_string());
        let _ = tx.send(AppEvent::Loaded(result)).await;
    });
}

fn spawn_history(symbol: String, days: u32, tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let series = match YahooHistory::new() {
            Ok(source) => source.daily_history(&symbol, days).await,
            Err(e) => Err(e),
        }
        .map_err(|e| e.to_string());
        let _ = tx.send(AppEvent::History { symbol, series }).await;
    });
}

fn spawn_latest_price(symbol: String, tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let price = match YahooHistory::new() {
            Ok(source) => source.latest_close(&symbol).await,
            Err(e) => Err(e),
        }
        .map_err(|e| e.to_string());
        let _ = tx.send(AppEvent::LatestPrice { symbol, price }).await;
    });
}

// --- TUI ---

pub async fn run_tui(job: BatchJob) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, job).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, job: BatchJob) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<AppEvent>(16);
    let mut app = App::new(job);

    match load_view(&app.job).await {
        Ok(view) => app.set_view(view),
        Err(e) => app.status(format!("no dashboard yet ({}), press F5 to run the batch", e)),
    }

    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        while let Ok(event) = rx.try_recv() {
            app.handle_event(event);
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key_event(key, &mut app, &tx) {
                    return Ok(());
                }
            }
        }
    }
}

fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) -> bool {
    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::Esc => app.chart = None,
        KeyCode::Up => app.move_selection(false),
        KeyCode::Down => app.move_selection(true),
        KeyCode::Enter => {
            if let Some(symbol) = app.selected().map(|r| r.symbol.clone()) {
                app.status(format!("fetching {} day chart for {}", CHART_DAYS, symbol));
                spawn_history(symbol, CHART_DAYS, tx.clone());
            }
        }
        KeyCode::Char('l') => {
            if let Some(symbol) = app.selected().map(|r| r.symbol.clone()) {
                app.status(format!("fetching latest price for {}", symbol));
                spawn_latest_price(symbol, tx.clone());
            }
        }
        KeyCode::Char('r') => {
            app.status("reloading dashboard");
            spawn_reload(app.job.clone(), tx.clone());
        }
        KeyCode::F(5) if !app.is_refreshing => {
            app.is_refreshing = true;
            app.status("running batch pipeline");
            let job = app.job.clone();
            let tx_clone = tx.clone();
            tokio::spawn(async move {
                let today = Local::now().date_naive();
                let result = crate::run_batch_job(&job, today)
                    .await
                    .map(|snapshot| snapshot.summary.analyzed())
                    .map_err(|e| format!("{:#}", e));
                let succeeded = result.is_ok();
                let _ = tx_clone.send(AppEvent::BatchFinished(result)).await;
                if succeeded {
                    let view = load_view(&job).await.map_err(|e| e.to_string());
                    let _ = tx_clone.send(AppEvent::Loaded(view)).await;
                }
            });
        }
        _ => {}
    }
    true
}

fn advice_color(advice: Option<Advice>) -> Color {
    match advice {
        Some(Advice::Buy) => Color::Green,
        Some(Advice::Sell) => Color::Red,
        Some(Advice::Hold) => Color::Yellow,
        None => Color::DarkGray,
    }
}

fn cell_number(value: Option<f64>) -> String {
    value.map_or_else(|| "–".to_string(), |v| format!("{:.2}", v))
}

fn ui(f: &mut Frame, app: &mut App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(f.size());
    let left_chunks =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).split(main_layout[0]);
    let right_chunks = Layout::vertical([
        Constraint::Percentage(45),
        Constraint::Length(5),
        Constraint::Min(0),
    ])
    .split(main_layout[1]);

    f.render_widget(
        Paragraph::new("↑/↓ select  Enter chart  l latest  r reload  F5 rerun  Esc close  q quit")
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Dashboard: {}", app.job.dashboard.display())),
            ),
        left_chunks[0],
    );

    render_table(f, app, left_chunks[1]);
    render_profit_chart(f, &app.view, right_chunks[0]);
    render_distribution(f, &app.view.table, right_chunks[1]);
    render_log(f, &app.log, right_chunks[2]);

    if let Some(chart) = &app.chart {
        let area = centered_rect(80, 70, f.size());
        f.render_widget(Clear, area);
        render_price_chart(f, chart, area);
    }

    if app.is_refreshing {
        let area = centered_rect(50, 20, main_layout[0]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Running analysis pipeline...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_table(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new(
        [
            "Stock Symbol",
            "Advice",
            "Profit",
            "RSI",
            "Live Advice",
            "Alert",
            "Purchased",
            "Data Source",
        ]
        .map(Cell::from),
    )
    .style(Style::default().bg(Color::DarkGray));

    let view = &app.view;
    let rows = view.table.rows.iter().map(|row| {
        let alerting = row.parsed_alert().is_some_and(|a| a.is_alerting());
        let profit_color = match row.profit {
            Some(p) if p < 0.0 => Color::Red,
            Some(_) => Color::Green,
            None => Color::DarkGray,
        };
        Row::new([
            Cell::from(row.symbol.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(row.advice.clone())
                .style(Style::default().fg(advice_color(row.parsed_advice()))),
            Cell::from(cell_number(row.profit)).style(Style::default().fg(profit_color)),
            Cell::from(cell_number(row.rsi)),
            Cell::from(row.live_advice().map_or("–", |l| l.as_str())),
            Cell::from(row.alert.clone()).style(if alerting {
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            }),
            Cell::from(if row.purchased() { "Yes" } else { "No" }),
            Cell::from(
                view.data_sources
                    .get(&row.symbol)
                    .map_or_else(|| "–".to_string(), |s| s.to_string()),
            )
            .style(Style::default().fg(Color::DarkGray)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(12),
            Constraint::Percentage(16),
            Constraint::Percentage(11),
            Constraint::Percentage(8),
            Constraint::Percentage(15),
            Constraint::Percentage(12),
            Constraint::Percentage(10),
            Constraint::Percentage(16),
        ],
    )
    .header(header)
    .highlight_style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
    .block(Block::default().borders(Borders::ALL).title("Portfolio"));

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_profit_chart(f: &mut Frame, view: &DashboardView, area: Rect) {
    // bars cannot go negative; losses are drawn in red at their magnitude
    let bars: Vec<Bar> = view
        .table
        .rows
        .iter()
        .filter_map(|row| row.profit.map(|p| (row, p)))
        .map(|(row, profit)| {
            Bar::default()
                .value(profit.abs().round() as u64)
                .text_value(format!("{}{:.0}", view.currency_symbol, profit))
                .label(Line::from(row.symbol.clone()))
                .style(Style::default().fg(if profit < 0.0 { Color::Red } else { Color::Green }))
        })
        .collect();

    f.render_widget(
        BarChart::default()
            .block(Block::default().borders(Borders::ALL).title("Profit by Symbol"))
            .bar_width(7)
            .bar_gap(1)
            .data(BarGroup::default().bars(&bars)),
        area,
    );
}

fn render_distribution(f: &mut Frame, table: &DashboardTable, area: Rect) {
    let lines: Vec<Line> = table
        .distribution()
        .into_iter()
        .map(|(advice, count, pct)| {
            Line::from(format!("{:<5} {:>3}  {:>5.1}%", advice.as_str(), count, pct))
                .style(Style::default().fg(advice_color(Some(advice))))
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Advice Distribution"),
        ),
        area,
    );
}

fn render_log(f: &mut Frame, log: &[String], area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = log
        .iter()
        .skip(log.len().saturating_sub(visible))
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    f.render_widget(
        List::new(items).block(Block::default().borders(Borders::ALL).title("Status")),
        area,
    );
}

fn render_price_chart(f: &mut Frame, chart: &PriceChart, area: Rect) {
    let (min, max) = chart
        .points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| (lo.min(*y), hi.max(*y)));
    let pad = ((max - min) * 0.05).max(0.01);
    let x_max = chart.points.len().saturating_sub(1).max(1) as f64;

    let datasets = vec![
        Dataset::default()
            .name("Close")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&chart.points),
    ];

    f.render_widget(
        Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} - 1 Month Close (Esc closes)", chart.symbol)),
            )
            .x_axis(
                Axis::default()
                    .bounds([0.0, x_max])
                    .labels(vec![
                        Span::raw(chart.first.format("%Y-%m-%d").to_string()),
                        Span::raw(chart.last.format("%Y-%m-%d").to_string()),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .bounds([min - pad, max + pad])
                    .labels(vec![
                        Span::raw(format!("{:.2}", min)),
                        Span::raw(format!("{:.2}", max)),
                    ]),
            ),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> BatchJob {
        BatchJob {
            input: PathBuf::from("input.csv"),
            settings: PathBuf::from("settings.csv"),
            dashboard: PathBuf::from("dashboard.csv"),
            storage_dir: PathBuf::from("storage"),
            anchor: None,
        }
    }

    fn view(symbols: &[&str]) -> DashboardView {
        DashboardView {
            table: DashboardTable {
                rows: symbols
                    .iter()
                    .map(|s| DashboardRow {
                        symbol: s.to_string(),
                        advice: "Hold".into(),
                        profit: Some(1.0),
                        rsi: Some(50.0),
                        alert: "OK".into(),
                    })
                    .collect(),
                counts: vec![(Advice::Hold, symbols.len())],
            },
            data_sources: HashMap::new(),
            currency_symbol: "$".into(),
        }
    }

    #[test]
    fn selection_wraps_both_ways() {
        let mut app = App::new(job());
        app.set_view(view(&["A", "B", "C"]));
        assert_eq!(app.selected().map(|r| r.symbol.as_str()), Some("A"));

        app.move_selection(false);
        assert_eq!(app.selected().map(|r| r.symbol.as_str()), Some("C"));
        app.move_selection(true);
        assert_eq!(app.selected().map(|r| r.symbol.as_str()), Some("A"));
    }

    #[test]
    fn reload_keeps_selection_in_range() {
        let mut app = App::new(job());
        app.set_view(view(&["A", "B", "C"]));
        app.move_selection(true);
        app.move_selection(true);
        app.set_view(view(&["A"]));
        assert_eq!(app.table_state.selected(), Some(0));
        app.set_view(view(&[]));
        assert_eq!(app.selected(), None);
    }

    #[test]
    fn quit_and_escape_keys() {
        let (tx, _rx) = mpsc::channel(4);
        let mut app = App::new(job());
        app.chart = Some(PriceChart {
            symbol: "A".into(),
            points: vec![(0.0, 1.0)],
            first: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        });

        assert!(handle_key_event(KeyEvent::from(KeyCode::Esc), &mut app, &tx));
        assert!(app.chart.is_none());
        assert!(!handle_key_event(KeyEvent::from(KeyCode::Char('q')), &mut app, &tx));
    }

    #[test]
    fn events_update_status_log() {
        let mut app = App::new(job());
        app.is_refreshing = true;
        app.handle_event(AppEvent::BatchFinished(Ok(3)));
        assert!(!app.is_refreshing);
        app.handle_event(AppEvent::LatestPrice {
            symbol: "AAPL".into(),
            price: Ok(123.456),
        });
        assert!(app.log.iter().any(|l| l.contains("batch finished, 3 symbols")));
        assert!(app.log.iter().any(|l| l.ends_with("AAPL latest close 123.46")));
    }

    #[test]
    fn history_event_opens_chart() {
        let mut app = App::new(job());
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let series = PriceSeries::from_closes(
            (0..5u64).map(|i| (start + chrono::Days::new(i), 10.0 + i as f64)),
        );
        app.handle_event(AppEvent::History {
            symbol: "AAPL".into(),
            series: Ok(series),
        });
        let chart = app.chart.as_ref().unwrap();
        assert_eq!(chart.points.len(), 5);
        assert_eq!(chart.last, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[tokio::test]
    async fn viewing_without_a_run_creates_no_storage() {
        let dir = std::env::temp_dir()
            .join(format!("portfolio-advisor-tui-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("dashboard.csv"),
            "Stock Symbol,Advice,Profit,RSI,Alert\nAAPL,Buy,12.50,25.00,RSI Too Low\n",
        )
        .unwrap();
        let job = BatchJob {
            dashboard: dir.join("dashboard.csv"),
            storage_dir: dir.join("storage"),
            ..job()
        };

        let view = load_view(&job).await.unwrap();
        assert_eq!(view.table.rows.len(), 1);
        assert!(view.data_sources.is_empty());
        assert!(!job.storage_dir.exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
