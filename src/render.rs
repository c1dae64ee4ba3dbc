use alerter::{AlertRule, AlertTrigger};
use analytics::{
    AccountStats, DailyDrawdown, MonthPreview, MonthlyDrawdown, MonthlyGrowth, TradeStats,
    WeeklyDrawdown, YearlyDrawdown,
};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use core_types::{AlertKind, EquityPoint, PeakState};
use engine::{AccountSync, Served, SyncOutcome};
use rust_decimal::Decimal;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn pct(value: Decimal) -> String {
    format!("{:.2}%", value)
}

fn opt_pct(value: Option<Decimal>) -> String {
    value.map(pct).unwrap_or_else(|| "-".to_string())
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// One line under each table saying how the payload was obtained.
fn provenance<T>(served: &Served<T>) -> String {
    let mut line = format!(
        "{:?}, computed {}",
        served.state,
        served.computed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if served.degraded {
        line.push_str(" (degraded: event source unavailable)");
    }
    line
}

pub fn stats(name: &str, served: &Served<AccountStats>) {
    let s = &served.payload;
    let mut table = table();
    table.set_header(vec![format!("{} ({})", name, s.account_id), String::new()]);
    let rows = [
        ("Balance", money(s.balance)),
        ("Equity", money(s.equity)),
        ("Profit", money(s.profit)),
        ("Deposits", money(s.total_deposits)),
        ("Withdrawals", money(s.total_withdrawals)),
        ("Growth", pct(s.growth_pct)),
        ("Growth this month", opt_pct(s.current_month_growth_pct)),
        ("Peak balance", money(s.peak_balance)),
        ("Drawdown", format!("{} ({})", money(s.drawdown_abs), pct(s.drawdown_pct))),
        (
            "Max drawdown",
            format!("{} ({})", money(s.max_drawdown_abs), pct(s.max_drawdown_pct)),
        ),
        ("Recovery factor", s.recovery_factor.to_string()),
        ("Trades", s.total_trades.to_string()),
        ("Win rate", pct(s.win_rate_pct)),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value]);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn daily(served: &Served<Vec<DailyDrawdown>>) {
    let mut table = table();
    table.set_header(vec!["Date", "Start balance", "Min balance", "Drawdown"]);
    for row in &served.payload {
        table.add_row(vec![
            row.date.to_string(),
            money(row.start_balance),
            money(row.min_balance),
            pct(row.drawdown_pct),
        ]);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn weekly(served: &Served<Vec<WeeklyDrawdown>>) {
    let mut table = table();
    table.set_header(vec!["Year", "Week", "From", "Drawdown"]);
    for row in &served.payload {
        table.add_row(vec![
            row.year.to_string(),
            row.week.to_string(),
            row.start_date.to_string(),
            pct(row.drawdown_pct),
        ]);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn monthly(served: &Served<Vec<MonthlyDrawdown>>) {
    let mut table = table();
    let mut header = vec!["Year".to_string()];
    header.extend(MONTHS.iter().map(|m| m.to_string()));
    header.push("Max".to_string());
    table.set_header(header);
    for row in &served.payload {
        let mut cells = vec![row.year.to_string()];
        cells.extend(row.months.iter().map(|m| opt_pct(*m)));
        cells.push(opt_pct(row.year_max));
        table.add_row(cells);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn yearly(served: &Served<Vec<YearlyDrawdown>>) {
    let mut table = table();
    table.set_header(vec!["Year", "Start balance", "Min balance", "Drawdown"]);
    for row in &served.payload {
        table.add_row(vec![
            row.year.to_string(),
            money(row.start_balance),
            money(row.min_balance),
            pct(row.drawdown_pct),
        ]);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn growth(served: &Served<Vec<MonthlyGrowth>>) {
    let mut table = table();
    let mut header = vec!["Year".to_string()];
    header.extend(MONTHS.iter().map(|m| m.to_string()));
    header.push("Total".to_string());
    header.push("P&L".to_string());
    table.set_header(header);
    for row in &served.payload {
        let mut cells = vec![row.year.to_string()];
        cells.extend(row.months.iter().map(|m| opt_pct(*m)));
        cells.push(opt_pct(row.year_total));
        cells.push(row.year_total_value.map(money).unwrap_or_else(|| "-".to_string()));
        table.add_row(cells);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn preview(served: &Served<MonthPreview>) {
    let preview = &served.payload;
    let mut table = table();
    table.set_header(vec![format!("{}-{:02}", preview.year, preview.month), String::new()]);
    table.add_row(vec![
        "Opening balance".to_string(),
        format!(
            "{} ({:?})",
            money(preview.starting_balance.value),
            preview.starting_balance.source
        ),
    ]);
    table.add_row(vec!["Capital flows".to_string(), money(preview.capital_flows)]);
    table.add_row(vec!["Trading P&L".to_string(), money(preview.trading_pnl)]);
    table.add_row(vec!["Growth".to_string(), opt_pct(preview.growth_pct)]);
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn trades(served: &Served<TradeStats>) {
    let t = &served.payload;
    let mut table = table();
    table.set_header(vec!["Metric", "Value"]);
    let rows = [
        ("Total trades", t.total_trades.to_string()),
        (
            "Won / lost / even",
            format!("{} / {} / {}", t.winning_trades, t.losing_trades, t.breakeven_trades),
        ),
        ("Win rate", pct(t.win_rate_pct)),
        ("Gross profit", money(t.gross_profit)),
        ("Gross loss", money(t.gross_loss)),
        ("Net profit", money(t.net_profit)),
        ("Profit factor", t.profit_factor.to_string()),
        ("Expected payoff", money(t.expected_payoff)),
        ("Best / worst", format!("{} / {}", money(t.best_trade), money(t.worst_trade))),
        (
            "Avg profit / loss",
            format!("{} / {}", money(t.average_profit), money(t.average_loss)),
        ),
        (
            "Max consecutive wins / losses",
            format!("{} / {}", t.max_consecutive_wins, t.max_consecutive_losses),
        ),
        ("Longs (won)", format!("{} ({})", t.longs_count, t.longs_won)),
        ("Shorts (won)", format!("{} ({})", t.shorts_count, t.shorts_won)),
        ("Sharpe ratio", t.sharpe_ratio.to_string()),
        (
            "Avg holding time",
            format!("{}m", t.average_holding_time.as_secs() / 60),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value]);
    }
    println!("{table}");
    println!("{}", provenance(served));
}

pub fn history(points: &[EquityPoint]) {
    let mut table = table();
    table.set_header(vec!["Bucket", "Balance", "Equity", "Drawdown"]);
    for p in points {
        table.add_row(vec![
            p.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            money(p.balance),
            money(p.equity),
            pct(p.drawdown_pct),
        ]);
    }
    println!("{table}");
}

pub fn peaks(peaks: &PeakState) {
    let mut table = table();
    table.set_header(vec!["Peak balance", "Peak equity", "Max drawdown"]);
    table.add_row(vec![
        money(peaks.peak_balance),
        money(peaks.peak_equity),
        format!("{} ({})", money(peaks.max_drawdown_abs), pct(peaks.max_drawdown_pct)),
    ]);
    println!("{table}");
}

pub fn sync(results: &[AccountSync]) {
    let mut table = table();
    table.set_header(vec!["Account", "Outcome"]);
    for result in results {
        let outcome = match &result.outcome {
            SyncOutcome::Synced { last_event_id } => match last_event_id {
                Some(id) => format!("synced up to event {id}"),
                None => "synced (empty ledger)".to_string(),
            },
            SyncOutcome::NoChange => "no change".to_string(),
            SyncOutcome::Error(e) => format!("error: {e}"),
        };
        table.add_row(vec![result.account_id.to_string(), outcome]);
    }
    println!("{table}");
}

fn threshold(kind: AlertKind, value: Decimal) -> String {
    if kind.is_percentage() {
        pct(value)
    } else {
        money(value)
    }
}

pub fn alerts(rules: &[AlertRule]) {
    let mut table = table();
    table.set_header(vec![
        "Id",
        "Kind",
        "Condition",
        "Threshold",
        "Status",
        "Last triggered",
        "Message",
    ]);
    for rule in rules {
        table.add_row(vec![
            rule.id.to_string(),
            rule.kind.to_string(),
            rule.condition.to_string(),
            threshold(rule.kind, rule.threshold),
            rule.status.to_string(),
            rule.triggered_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            rule.message.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

pub fn alert_history(triggers: &[AlertTrigger]) {
    let mut table = table();
    table.set_header(vec!["Time", "Rule", "Value", "Message"]);
    for trigger in triggers {
        table.add_row(vec![
            trigger.triggered_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            trigger.rule_id.to_string(),
            threshold(trigger.kind, trigger.actual_value),
            trigger.message.clone(),
        ]);
    }
    println!("{table}");
}
