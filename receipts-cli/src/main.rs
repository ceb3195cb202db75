use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use receipts_core::{
    Decimal, Durability, FileStore, LoadReport, MutationReport, Receipt, ReceiptQuery,
    ReceiptStore, Tz, distinct_categories, distinct_dates, parse_day, parse_timestamp,
    total_amount, total_by_category,
};
use receipts_ingest::BundleLoader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod state;

use config::{Config, config_path, init_config, load_config};

#[derive(Parser, Debug)]
#[command(
    name = "receipts",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RECEIPTS_BUILD_SHA"), ")"),
    about = "Local receipt and expense tracker"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Config file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Record a new receipt
    Add {
        #[arg(long)]
        merchant: String,

        #[arg(long)]
        amount: Decimal,

        /// ISO-8601 timestamp or YYYY-MM-DD (default: now)
        #[arg(long)]
        date: Option<String>,

        /// Repeat for several categories; the first is the primary one
        #[arg(long = "category")]
        categories: Vec<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        image_url: Option<String>,

        /// Explicit identifier (default: random UUID)
        #[arg(long)]
        id: Option<String>,
    },

    /// Change fields of an existing receipt
    Update {
        #[arg(long)]
        id: String,

        #[command(flatten)]
        patch: ReceiptPatch,
    },

    /// Remove every receipt with this identifier
    Delete {
        #[arg(long)]
        id: String,
    },

    /// List receipts, newest first
    List {
        /// Only this day (YYYY-MM-DD, in the configured timezone)
        #[arg(long)]
        date: Option<String>,

        /// Exact category label
        #[arg(long)]
        category: Option<String>,

        /// Case-insensitive text in merchant, notes or categories
        #[arg(long)]
        search: Option<String>,

        /// Limit number of receipts printed
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Totals per primary category plus distinct dates and categories
    Summary,

    /// Decode bundled seed data and optionally import it
    Seed {
        /// Seed file (default: configured candidates, then <home>/seed.json)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Append the seed tickets to the store
        #[arg(long, default_value_t = false)]
        import: bool,

        /// Date for imported receipts (default: now)
        #[arg(long)]
        date: Option<String>,
    },
}

/// Field changes for `update`; unset flags leave the field alone
#[derive(Args, Debug)]
struct ReceiptPatch {
    #[arg(long)]
    merchant: Option<String>,

    #[arg(long)]
    amount: Option<Decimal>,

    #[arg(long)]
    date: Option<String>,

    /// Replaces the whole category list when given
    #[arg(long = "category", conflicts_with = "clear_categories")]
    categories: Vec<String>,

    #[arg(long)]
    clear_categories: bool,

    #[arg(long, conflicts_with = "clear_notes")]
    notes: Option<String>,

    #[arg(long)]
    clear_notes: bool,

    #[arg(long, conflicts_with = "clear_image_url")]
    image_url: Option<String>,

    #[arg(long)]
    clear_image_url: bool,
}

impl ReceiptPatch {
    fn apply(self, receipt: &mut Receipt) -> Result<()> {
        if let Some(m) = self.merchant {
            receipt.merchant = m;
        }
        if let Some(a) = self.amount {
            receipt.amount = a;
        }
        if let Some(d) = self.date {
            receipt.date = parse_timestamp(&d)?;
        }

        if self.clear_categories {
            receipt.categories.clear();
        } else if !self.categories.is_empty() {
            receipt.categories = self.categories;
        }
        if self.clear_notes {
            receipt.notes = None;
        } else if self.notes.is_some() {
            receipt.notes = self.notes;
        }
        if self.clear_image_url {
            receipt.image_url = None;
        } else if self.image_url.is_some() {
            receipt.image_url = self.image_url;
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config.toml if none exists
    Init,
    /// Print the effective config
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config()?;
    init_logging(&cfg.log_level);

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => init_config()?,
            ConfigCommand::Show => {
                println!("# {}", config_path()?.display());
                println!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },

        Command::Add {
            merchant,
            amount,
            date,
            categories,
            notes,
            image_url,
            id,
        } => {
            let mut store = open_store(&cfg)?;
            let mut receipt = Receipt::new(parse_date_arg(date.as_deref())?, merchant, amount)
                .with_categories(categories);
            if let Some(id) = id {
                receipt = receipt.with_id(id);
            }
            receipt.notes = notes;
            receipt.image_url = image_url;

            let id = receipt.id.clone();
            let report = store.add(receipt)?;
            println!("Added {}", id);
            warn_if_not_durable(&report);
        }

        Command::Update { id, patch } => {
            let mut store = open_store(&cfg)?;
            let Some(mut receipt) = store.get(&id).cloned() else {
                println!("No receipt with id {} (nothing changed)", id);
                return Ok(());
            };
            patch.apply(&mut receipt)?;

            let report = store.update(receipt);
            println!("Updated {} ({} record)", id, report.affected);
            warn_if_not_durable(&report);
        }

        Command::Delete { id } => {
            let mut store = open_store(&cfg)?;
            let report = store.delete_id(&id);
            println!("Deleted {} record(s) with id {}", report.affected, id);
            warn_if_not_durable(&report);
        }

        Command::List {
            date,
            category,
            search,
            limit,
        } => {
            let store = open_store(&cfg)?;
            let tz = cfg.timezone()?;

            let mut query = ReceiptQuery::new().in_timezone(tz);
            if let Some(d) = date {
                query = query.on(parse_day(&d)?);
            }
            query.category = category;
            query.search = search;

            let rows = query.apply(store.receipts());
            for r in rows.iter().take(limit.unwrap_or(usize::MAX)) {
                print_receipt(r, &tz);
            }
            println!(
                "\n{} receipt(s), total {:.2}",
                rows.len(),
                total_amount(&rows)
            );
        }

        Command::Summary => {
            let store = open_store(&cfg)?;
            let tz = cfg.timezone()?;
            let snapshot = store.snapshot();

            println!("## Totals by category\n");
            for (label, total) in total_by_category(&snapshot) {
                println!("- {}: {:.2}", label, total);
            }
            println!("\nOverall: {:.2} across {} receipts", total_amount(&snapshot), snapshot.len());

            let dates: Vec<String> = distinct_dates(&snapshot, &tz)
                .iter()
                .map(|d| d.to_string())
                .collect();
            println!("\n## Dates ({})\n\n{}", tz, dates.join(", "));
            println!("\n## Categories\n\n{}", distinct_categories(&snapshot).join(", "));
        }

        Command::Seed { file, import, date } => seed(&cfg, file, import, date.as_deref())?,
    }

    Ok(())
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(cfg: &Config) -> Result<ReceiptStore<FileStore>> {
    let dir = cfg.data_dir()?;
    let storage = FileStore::open(&dir).with_context(|| format!("opening {}", dir.display()))?;
    let store = ReceiptStore::open(storage, cfg.storage.store.clone());
    tracing::debug!(
        dir = %store.storage().dir().display(),
        slot = %store.config().slot,
        "receipt store opened"
    );

    match store.last_load() {
        LoadReport::Corrupt(e) => eprintln!("warning: stored receipts could not be decoded ({e}); starting empty"),
        LoadReport::Unavailable(e) => eprintln!("warning: stored receipts could not be read ({e}); starting empty"),
        LoadReport::Loaded(_) | LoadReport::Empty => {}
    }
    Ok(store)
}

fn warn_if_not_durable(report: &MutationReport) {
    if let Durability::Failed(e) = &report.durability {
        eprintln!("warning: change applied but not saved: {e}");
    }
}

fn parse_date_arg(date: Option<&str>) -> Result<chrono::DateTime<Utc>> {
    match date {
        Some(d) => Ok(parse_timestamp(d)?),
        None => Ok(Utc::now()),
    }
}

fn print_receipt(r: &Receipt, tz: &Tz) {
    let local = r.date.with_timezone(tz).format("%Y-%m-%d %H:%M");
    let cats = if r.categories.is_empty() {
        "-".to_string()
    } else {
        r.categories.join(", ")
    };
    println!(
        "{} | {} | {:>10.2} | {} | [{}]{}",
        local,
        r.id,
        r.amount,
        r.merchant,
        cats,
        r.notes.as_deref().map(|n| format!(" {}", n)).unwrap_or_default()
    );
}

fn seed(cfg: &Config, file: Option<PathBuf>, import: bool, date: Option<&str>) -> Result<()> {
    let loader = match file {
        Some(f) => BundleLoader::new([f]),
        None => BundleLoader::new(cfg.seed.candidates.iter().cloned())
            .with_candidate(state::home_seed_path()?),
    };
    tracing::debug!(candidates = ?loader.candidates(), "looking for seed data");

    let bundle = match loader.load() {
        Ok(b) => b,
        Err(e) if import => bail!("cannot import seed data: {e}"),
        Err(e) => {
            println!("No seed data: {e}");
            return Ok(());
        }
    };

    println!(
        "Decoded {} bundled ticket(s) from {}",
        bundle.receipts.len(),
        bundle.source.display()
    );
    for t in &bundle.receipts {
        println!(
            "- {} | items={} | total={:.2} (card {:.2}, cash {:.2}) | taxes={:.2}",
            t.company.name,
            t.items.len(),
            t.totals.total,
            t.totals.paid_card,
            t.totals.paid_cash,
            t.tax_total()
        );
    }

    if import {
        let when = parse_date_arg(date)?;
        let mut store = open_store(cfg)?;
        let report = store.add_all(bundle.receipts.iter().map(|t| t.to_receipt(when)))?;
        println!("\nImported {} receipt(s); store now holds {}", report.affected, store.len());
        warn_if_not_durable(&report);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Receipt {
        Receipt::new(parse_timestamp("2024-01-01T09:00").unwrap(), "Cafe", Decimal::new(320, 2))
            .with_id("r1")
            .with_categories(["Food", "Work"])
            .with_notes("client lunch")
            .with_image_url("file:///r1.jpg")
    }

    fn update_patch(args: &[&str]) -> ReceiptPatch {
        let argv = ["receipts", "update", "--id", "r1"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Update { patch, .. } => patch,
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_update_without_flags_changes_nothing() {
        let mut r = stored();
        update_patch(&[]).apply(&mut r).unwrap();
        assert_eq!(r, stored());
    }

    #[test]
    fn test_update_sets_fields() {
        let mut r = stored();
        update_patch(&["--merchant", "Bistro", "--amount", "12.40", "--category", "Travel"])
            .apply(&mut r)
            .unwrap();
        assert_eq!(r.merchant, "Bistro");
        assert_eq!(r.amount, Decimal::new(1240, 2));
        assert_eq!(r.categories, ["Travel"]);
        assert_eq!(r.notes.as_deref(), Some("client lunch"));
    }

    #[test]
    fn test_update_clears_optional_fields() {
        let mut r = stored();
        update_patch(&["--clear-notes", "--clear-image-url", "--clear-categories"])
            .apply(&mut r)
            .unwrap();
        assert_eq!(r.notes, None);
        assert_eq!(r.image_url, None);
        assert!(r.categories.is_empty());
        assert_eq!(r.merchant, "Cafe");
    }

    #[test]
    fn test_update_rejects_set_and_clear_together() {
        let argv = ["receipts", "update", "--id", "r1", "--notes", "x", "--clear-notes"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_update_bad_date_is_an_error() {
        let mut r = stored();
        assert!(update_patch(&["--date", "soon"]).apply(&mut r).is_err());
        assert_eq!(r.date, stored().date);
    }
}
