use clap::{Parser, Subcommand};
use dsstore::block::BlockAddress;
use dsstore::btree::{DirectorySuperblock, DIRECTORY_NAME};
use dsstore::buddy::BuddyContainer;
use dsstore::{DsStore, FourCC, StoreOptions, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsstore", about = "Inspect and edit .DS_Store directory metadata")]
struct Cli {
    /// Log parser diagnostics (repeat for trace output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Treat non-zero offset-table padding as corruption
    #[arg(long, global = true)]
    strict: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every record
    Dump {
        input: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show allocator and B-tree metadata
    Info {
        input: PathBuf,
    },
    /// Print one record's value
    Get {
        input:    PathBuf,
        filename: String,
        code:     String,
    },
    /// Set the Finder comment of an entry
    SetComment {
        input:    PathBuf,
        filename: String,
        comment:  String,
    },
    /// Set an icon position (top-left origin)
    SetIcon {
        input:    PathBuf,
        filename: String,
        x:        u32,
        y:        u32,
    },
    /// Remove one record, or every record of a filename
    Rm {
        input:    PathBuf,
        filename: String,
        code:     Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let options = StoreOptions { strict_padding: cli.strict, ..StoreOptions::default() };

    match cli.command {

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, json } => {
            let store = open_store(&input, options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(store.records())?);
                return Ok(());
            }
            println!("{:<32} {:<6} {:<6} Value", "Filename", "Code", "Type");
            for r in store.records() {
                println!("{:<32} {:<6} {:<6} {}",
                    r.filename, r.code.to_string(), r.value.tag().to_string(), fmt_value(&r.value));
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let bytes = std::fs::read(&input)?;
            let c = BuddyContainer::parse(&bytes, options.strict_padding)?;

            println!("── Bud1 container ───────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  File size      {} B", bytes.len());
            println!("  Root block     {:#x} ({} B)", c.header.root_offset, c.header.root_size);
            println!("  Blocks ({}):", c.root.offsets.len());
            for (i, raw) in c.root.offsets.iter().enumerate() {
                if *raw == 0 {
                    continue;
                }
                let a = BlockAddress::from_raw(*raw);
                println!("    #{:<4} offset {:#08x}  size {:>6}", i, a.offset, a.size);
            }
            println!("  Table of contents:");
            for entry in &c.root.toc {
                println!("    {:<8} -> block {}", entry.name, entry.block);
            }
            let free: usize = c.root.free_lists.iter().map(Vec::len).sum();
            println!("  Free blocks    {}", free);

            if let Some(block) = c.root.toc_lookup(DIRECTORY_NAME) {
                let sb = DirectorySuperblock::read(&mut c.block_at(block)?)?;
                println!("── {} ──────────────────────────────────────────────────", DIRECTORY_NAME);
                println!("  Root node      {}", sb.root);
                println!("  Levels         {}", sb.levels);
                println!("  Records        {}", sb.records);
                println!("  Nodes          {}", sb.nodes);
                println!("  Page size      {:#x}", sb.page_size);
            }
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { input, filename, code } => {
            let store = open_store(&input, options)?;
            let code = FourCC::parse(&code)?;
            match store.value(&filename, code) {
                Some(v) => println!("{} {}", v.tag(), fmt_value(v)),
                None => {
                    eprintln!("No '{}' record for {}", code, filename);
                    std::process::exit(1);
                }
            }
        }

        // ── SetComment ───────────────────────────────────────────────────────
        Commands::SetComment { input, filename, comment } => {
            let mut store = open_store(&input, options)?;
            store.set_comments(&filename, &comment);
            store.save()?;
            println!("Updated: {}", input.display());
        }

        // ── SetIcon ──────────────────────────────────────────────────────────
        Commands::SetIcon { input, filename, x, y } => {
            let mut store = open_store(&input, options)?;
            store.set_icon_location(&filename, x, y);
            store.save()?;
            println!("Updated: {}", input.display());
        }

        // ── Rm ───────────────────────────────────────────────────────────────
        Commands::Rm { input, filename, code } => {
            let mut store = open_store(&input, options)?;
            let removed = match code {
                Some(code) => usize::from(store.remove_entry(&filename, FourCC::parse(&code)?).is_some()),
                None       => store.remove_all_entries(&filename),
            };
            store.save()?;
            println!("Removed {} record(s)", removed);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn open_store(path: &PathBuf, options: StoreOptions) -> Result<DsStore, Box<dyn std::error::Error>> {
    let mut store = DsStore::with_options(path, options);
    store.load()?;
    Ok(store)
}

fn fmt_value(v: &Value) -> String {
    match v {
        Value::Bool(b)  => b.to_string(),
        Value::Long(n)  => n.to_string(),
        Value::Shor(n)  => n.to_string(),
        Value::Comp(n)  => n.to_string(),
        Value::Dutc(t)  => dsstore::fields::dutc_to_datetime(*t)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| format!("{t:#x}")),
        Value::Type(c)  => c.to_string(),
        Value::Ustr(s)  => format!("{s:?}"),
        Value::Blob(b) | Value::Unknown { data: b, .. } => {
            if b.len() > 32 {
                format!("{}… ({} B)", hex::encode(&b[..32]), b.len())
            } else {
                hex::encode(b)
            }
        }
    }
}
