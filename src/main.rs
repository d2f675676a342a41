use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mark_stats::api::{fetch_and_save_history, fetch_latest, fetch_live, import_json_dir, parse_backup};
use mark_stats::config;
use mark_stats::database::{
    create_database, export_all, get_bets, get_draws, get_next_period, import_all, save_draw,
};
use mark_stats::{
    compute_category_stats, compute_color_stats, compute_number_stats, compute_trend,
    compute_zodiac_stats,
};

#[derive(Parser)]
#[command(name = "mark-stats", version, about = "Mark Six draw records and betting statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import every JSON file in a directory (backups or feed responses)
    Import { dir: Option<PathBuf> },
    /// Fetch draw history for one or more years
    Fetch {
        #[arg(required = true)]
        years: Vec<String>,
    },
    /// Fetch and store the latest draw
    Latest {
        /// Use the ball-by-ball live feed instead
        #[arg(long)]
        live: bool,
    },
    /// Print statistics for the stored draws and bets
    Stats {
        #[arg(long, default_value_t = 200)]
        draws: i64,
        #[arg(long, default_value_t = 1000)]
        bets: i64,
    },
    /// Write a backup of every record to a file
    Export { file: PathBuf },
    /// Replace every record with the contents of a backup file
    Restore { file: PathBuf },
    /// Print the period label expected for the next draw
    NextPeriod,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let conn = create_database(&config.database_url)
        .with_context(|| format!("cannot open database {}", config.database_url))?;

    match cli.command {
        Command::Import { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.json_dir));
            let summary = import_json_dir(&conn, &dir)?;
            println!(
                "✅ Imported {} draws and {} bets from {}",
                summary.draws_added,
                summary.bets_added,
                dir.display()
            );
        }
        Command::Fetch { years } => {
            let saved = fetch_and_save_history(&conn, &config, &years).await?;
            println!("🎯 Saved {} new draws", saved.len());
        }
        Command::Latest { live } => {
            let draw = if live {
                fetch_live(&config).await?
            } else {
                fetch_latest(&config).await?
            };
            match draw {
                Some(draw) => {
                    let added = save_draw(&conn, &draw)?;
                    println!(
                        "🎰 {} | {:?} + {} {}",
                        draw.period,
                        draw.numbers,
                        draw.special,
                        if added { "(saved)" } else { "(already stored)" }
                    );
                }
                None => println!("⚠ Feed returned no draw"),
            }
        }
        Command::Stats { draws, bets } => print_stats(&conn, draws, bets)?,
        Command::Export { file } => {
            let data = export_all(&conn)?;
            fs::write(&file, serde_json::to_string_pretty(&data)?)?;
            println!(
                "💾 Exported {} draws and {} bets to {}",
                data.draws.len(),
                data.bets.len(),
                file.display()
            );
        }
        Command::Restore { file } => {
            let raw = fs::read_to_string(&file)?;
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a backup file", file.display()))?;
            let (data, skipped) = parse_backup(value)?;
            import_all(&conn, &data)?;
            println!(
                "♻️ Restored {} draws and {} bets ({} records skipped)",
                data.draws.len(),
                data.bets.len(),
                skipped
            );
        }
        Command::NextPeriod => {
            println!("{}", get_next_period(&conn, Utc::now().year())?);
        }
    }

    Ok(())
}

fn print_stats(conn: &Connection, draw_limit: i64, bet_limit: i64) -> Result<()> {
    let draws = get_draws(conn, draw_limit)?;
    let bets = get_bets(conn, bet_limit)?;
    println!("📊 {} draws, {} bets\n", draws.len(), bets.len());

    let numbers = compute_number_stats(&draws);
    println!("🔥 Hottest numbers:");
    for stat in numbers.iter().take(10) {
        println!(
            "   {:>2}  freq {:>3}  gap {:>3}  max gap {:>3}  avg gap {:.2}",
            stat.number, stat.frequency, stat.current_gap, stat.max_gap, stat.avg_gap
        );
    }

    let mut coldest = numbers.clone();
    coldest.sort_by(|a, b| b.current_gap.cmp(&a.current_gap).then(a.number.cmp(&b.number)));
    println!("\n🧊 Longest current gaps:");
    for stat in coldest.iter().take(5) {
        println!("   {:>2}  gap {:>3}", stat.number, stat.current_gap);
    }

    println!("\n🎲 Play types:");
    for stat in compute_category_stats(&bets) {
        println!(
            "   {:<14} bets {:>4}  stake {:>10.2}  result {:>10.2}  hit {:>5.1}%  profit {:>6.1}%",
            stat.play_type.to_string(),
            stat.total_bets,
            stat.total_stake,
            stat.total_result,
            stat.hit_rate * 100.0,
            stat.profit_rate * 100.0
        );
    }

    println!("\n🐉 Zodiac bets:");
    for (zodiac, result) in compute_zodiac_stats(&bets, &draws) {
        if result.total_bets > 0 {
            println!(
                "   {:<8} bets {:>4}  stake {:>10.2}  result {:>10.2}  hit {:>5.1}%",
                zodiac.to_string(),
                result.total_bets,
                result.total_stake,
                result.total_result,
                result.hit_rate * 100.0
            );
        }
    }

    println!("\n🌈 Color bets:");
    for (color, result) in compute_color_stats(&bets, &draws) {
        if result.total_bets > 0 {
            println!(
                "   {:<6} bets {:>4}  stake {:>10.2}  result {:>10.2}  hit {:>5.1}%",
                color.to_string(),
                result.total_bets,
                result.total_stake,
                result.total_result,
                result.hit_rate * 100.0
            );
        }
    }

    let trend = compute_trend(&bets, &draws);
    println!("\n📈 Trend (last {} periods):", trend.len().min(10));
    for point in trend.iter().rev().take(10).rev() {
        println!(
            "   {:<10} bets {:>3}  result {:>10.2}  cumulative {:>10.2}",
            point.period, point.total_bets, point.total_result, point.cumulative_result
        );
    }

    Ok(())
}
