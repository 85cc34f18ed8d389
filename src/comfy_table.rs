use std::collections::HashMap;

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::advice::{Advice, Alert};
use crate::analysis::{AnalysisResult, DataSource, PortfolioSummary};
use crate::report::{DashboardRow, DashboardTable};

const BAR_WIDTH: usize = 30;
const EMPTY: &str = "–";

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn advice_color(advice: Option<Advice>) -> Color {
    match advice {
        Some(Advice::Buy) => Color::Green,
        Some(Advice::Sell) => Color::Red,
        Some(Advice::Hold) => Color::Yellow,
        None => Color::DarkGrey,
    }
}

/// Brightness in `[0.4, 1.0]` relative to the largest magnitude.
fn visibility_ratio(value: f64, top: f64) -> f64 {
    if top <= 0.0 {
        1.0
    } else {
        (0.4 + 0.6 * (value.abs() / top)).clamp(0.4, 1.0)
    }
}

fn money(currency_symbol: &str, value: f64) -> String {
    if value < 0.0 {
        format!("-{}{:.2}", currency_symbol, value.abs())
    } else {
        format!("{}{:.2}", currency_symbol, value)
    }
}

fn optional(value: Option<f64>, render: impl Fn(f64) -> String) -> String {
    value.map(render).unwrap_or_else(|| EMPTY.to_string())
}

/// Horizontal bar whose length is proportional to `|value| / top`.
pub fn text_bar(value: f64, top: f64) -> String {
    if top <= 0.0 || !value.is_finite() {
        return String::new();
    }
    let len = ((value.abs() / top) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(len.min(BAR_WIDTH))
}

fn dashboard_rows_table(
    rows: &[DashboardRow],
    currency_symbol: &str,
    sources: &HashMap<String, DataSource>,
) -> Table {
    let mut table = styled_table(&[
        "Stock Symbol",
        "Advice",
        "Profit",
        "RSI",
        "Live Advice",
        "Alert",
        "Purchased",
        "Data Source",
    ]);

    for row in rows {
        let advice = row.parsed_advice();
        let alerting = row.parsed_alert().is_some_and(|a| a.is_alerting());
        let profit_color = match row.profit {
            Some(p) if p > 0.0 => Color::Green,
            Some(p) if p < 0.0 => Color::Red,
            _ => Color::DarkGrey,
        };

        table.add_row(vec![
            Cell::new(&row.symbol).fg(Color::Cyan),
            Cell::new(&row.advice).fg(advice_color(advice)),
            Cell::new(optional(row.profit, |p| money(currency_symbol, p)))
                .fg(profit_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(optional(row.rsi, |r| format!("{:.2}", r)))
                .set_alignment(CellAlignment::Right),
            Cell::new(row.live_advice().map_or(EMPTY, |l| l.as_str())),
            if alerting {
                Cell::new(&row.alert).fg(Color::Red).add_attribute(Attribute::Bold)
            } else {
                Cell::new(&row.alert).fg(Color::DarkGrey)
            },
            Cell::new(if row.purchased() { "Yes" } else { "No" }),
            Cell::new(
                sources
                    .get(&row.symbol)
                    .map_or_else(|| EMPTY.to_string(), |s| s.to_string()),
            )
            .fg(Color::DarkGrey),
        ]);
    }
    table
}

fn distribution_table(dashboard: &DashboardTable) -> Table {
    let mut table = styled_table(&["Advice", "Count", "Share"]);
    for (advice, count, pct) in dashboard.distribution() {
        table.add_row(vec![
            Cell::new(advice).fg(advice_color(Some(advice))),
            Cell::new(count).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}%", pct)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn profit_table(rows: &[DashboardRow], currency_symbol: &str) -> Table {
    let mut table = styled_table(&["Stock Symbol", "Profit", ""]);
    let priced: Vec<(&str, f64)> = rows
        .iter()
        .filter_map(|r| r.profit.map(|p| (r.symbol.as_str(), p)))
        .collect();
    let top = priced.iter().map(|(_, p)| p.abs()).fold(0.0, f64::max);

    for (symbol, profit) in priced {
        let level = (255.0 * visibility_ratio(profit, top)) as u8;
        let color = if profit < 0.0 {
            Color::Rgb { r: level, g: 0, b: 0 }
        } else {
            Color::Rgb { r: 0, g: level, b: 0 }
        };
        table.add_row(vec![
            Cell::new(symbol),
            Cell::new(money(currency_symbol, profit)).set_alignment(CellAlignment::Right),
            Cell::new(text_bar(profit, top)).fg(color),
        ]);
    }
    table
}

/// Prints the Dashboard with the derived columns and the two breakdowns.
pub fn print_dashboard(
    dashboard: &DashboardTable,
    currency_symbol: &str,
    sources: &HashMap<String, DataSource>,
) {
    if dashboard.rows.is_empty() {
        println!("No symbols in the dashboard.");
        return;
    }
    println!("\n{}", dashboard_rows_table(&dashboard.rows, currency_symbol, sources));
    println!("\nAdvice Distribution\n{}", distribution_table(dashboard));
    println!("\nProfit by Symbol\n{}", profit_table(&dashboard.rows, currency_symbol));
}

pub fn print_run_totals(summary: &PortfolioSummary, currency_symbol: &str) {
    let mut table = styled_table(&[
        "Analyzed",
        "Total Investment (USD)",
        "Total Profit",
        "Average RSI",
    ]);
    table.add_row(vec![
        Cell::new(summary.analyzed()),
        Cell::new(format!("${:.2}", summary.total_investment))
            .set_alignment(CellAlignment::Right),
        Cell::new(money(currency_symbol, summary.total_profit))
            .set_alignment(CellAlignment::Right),
        Cell::new(optional(summary.average_rsi(), |r| format!("{:.2}", r)))
            .set_alignment(CellAlignment::Right),
    ]);
    println!("\n{}", table);
}

/// Summary row and forecast for a single analyzed symbol.
pub fn print_symbol_report(result: &AnalysisResult, currency_symbol: &str) {
    let mut summary = styled_table(&[
        "Latest RSI",
        "Advice",
        "Latest Price",
        "Buyable Shares",
        "Best Sell Date",
        "Sell Price",
        "Estimated Profit",
        "Alert",
    ]);
    summary.add_row(vec![
        Cell::new(format!("{:.2}", result.latest_rsi)),
        Cell::new(result.advice).fg(advice_color(Some(result.advice))),
        Cell::new(money(currency_symbol, result.latest_price)),
        Cell::new(result.shares),
        Cell::new(result.best_sell_date.format("%Y-%m-%d")),
        Cell::new(money(currency_symbol, result.best_sell_price)),
        Cell::new(money(currency_symbol, result.estimated_profit)),
        Cell::new(result.alert).fg(if result.alert == Alert::Ok {
            Color::DarkGrey
        } else {
            Color::Red
        }),
    ]);

    let mut forecast = styled_table(&["Forecast Date", "Predicted Price", ""]);
    let top = result.forecast.iter().map(|p| p.price).fold(0.0, f64::max);
    for point in &result.forecast {
        let marker = if point.date == result.best_sell_date { " best" } else { "" };
        forecast.add_row(vec![
            Cell::new(point.date.format("%Y-%m-%d")),
            Cell::new(money(currency_symbol, point.price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{}{}", text_bar(point.price, top), marker)).fg(Color::Cyan),
        ]);
    }

    println!("\n{} ({}, {})\n{}", result.symbol, result.data_source, result.live_advice, summary);
    println!("\n{}-Day Forecast\n{}", result.forecast.len(), forecast);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(mut table: Table) -> String {
        table.set_content_arrangement(ContentArrangement::Disabled);
        table.to_string()
    }

    fn row(
        symbol: &str,
        advice: &str,
        profit: Option<f64>,
        rsi: Option<f64>,
        alert: &str,
    ) -> DashboardRow {
        DashboardRow {
            symbol: symbol.into(),
            advice: advice.into(),
            profit,
            rsi,
            alert: alert.into(),
        }
    }

    #[test]
    fn bars_scale_with_magnitude() {
        assert_eq!(text_bar(10.0, 10.0).chars().count(), BAR_WIDTH);
        assert_eq!(text_bar(-5.0, 10.0).chars().count(), BAR_WIDTH / 2);
        assert_eq!(text_bar(0.0, 10.0), "");
        assert_eq!(text_bar(3.0, 0.0), "");
    }

    #[test]
    fn visibility_stays_in_range() {
        assert_eq!(visibility_ratio(0.0, 10.0), 0.4);
        assert_eq!(visibility_ratio(-10.0, 10.0), 1.0);
        assert_eq!(visibility_ratio(5.0, 0.0), 1.0);
    }

    #[test]
    fn money_places_sign_before_symbol() {
        assert_eq!(money("$", -12.3456), "-$12.35");
        assert_eq!(money("AED", 3.0), "AED3.00");
    }

    #[test]
    fn dashboard_shows_derived_columns() {
        let rows = vec![
            row("AAPL", "Buy", Some(12.0), Some(25.0), "RSI Too Low"),
            row("GME", "see notes", None, None, ""),
        ];
        let sources = HashMap::from([("AAPL".to_string(), DataSource::Capital)]);
        let rendered = render(dashboard_rows_table(&rows, "$", &sources));

        assert!(rendered.contains("Strong Buy"));
        assert!(rendered.contains("Capital.com"));
        assert!(rendered.contains("see notes"));
        assert!(rendered.contains("Yes"));
        assert!(rendered.contains("No"));
    }

    #[test]
    fn distribution_shows_percentages() {
        let dashboard = DashboardTable {
            rows: Vec::new(),
            counts: vec![(Advice::Buy, 1), (Advice::Hold, 3), (Advice::Sell, 0)],
        };
        let rendered = render(distribution_table(&dashboard));
        assert!(rendered.contains("25.0%"));
        assert!(rendered.contains("75.0%"));
        assert!(rendered.contains("0.0%"));
    }
}
