use browser::aggregator::Aggregator;
use browser::clock::SystemClock;
use browser::context::Browser;
use browser::entry::ServerListEntry;
use browser::registry_backend::RegistryBackend;
use browser::resolver::DomainResolver;
use clap::Parser;
use log::{info, warn};
use shared::ServerIdentity;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Registry address to list servers from
    #[arg(short, long, default_value = "127.0.0.1:2460")]
    registry: String,

    /// Server name filter
    #[arg(short, long, default_value = "")]
    filter: String,

    /// Favourite server `host[:port]`; may be given several times
    #[arg(long = "favorite")]
    favorites: Vec<String>,

    /// How long to keep browsing before printing the list
    #[arg(short, long, default_value = "3")]
    duration_secs: u64,

    /// Milliseconds between ticks
    #[arg(short, long, default_value = "50")]
    tick_ms: u64,
}

fn print_entry(entry: &ServerListEntry) {
    let lock = if entry.is_password_protected() { "*" } else { " " };
    let code = entry.join_code().unwrap_or("-");
    println!(
        "{} {:<32} {:>3}/{:<3} {:<8} {}",
        lock,
        entry.display_name(),
        entry.player_count(),
        entry.player_limit(),
        code,
        entry.identity()
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting browser...");
    info!("Registry: {}", args.registry);

    let mut aggregator = Aggregator::new(Rc::new(SystemClock));
    aggregator.register_backend(Box::new(RegistryBackend::new(&args.registry)));

    let updates = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&updates);
    aggregator.subscribe(Box::new(move |entries: &[ServerListEntry]| {
        *counter.borrow_mut() += 1;
        info!("Server list updated: {} entries", entries.len());
    }));

    aggregator.set_filter(&args.filter, false);
    aggregator.on_open();

    let mut browser = Browser::new(aggregator, DomainResolver::system());
    for favorite in &args.favorites {
        let identity = ServerIdentity::direct(favorite);
        if !browser.favorites_mut().add(identity) {
            warn!("Ignoring invalid favourite {:?}", favorite);
        }
    }

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));

    while Instant::now() < deadline {
        ticker.tick().await;
        browser.tick();
    }

    let entries = browser.aggregator().entries();
    println!(
        "{} of {} public server(s), {} update(s)",
        entries.len(),
        browser.aggregator().public_server_count(),
        updates.borrow()
    );
    for entry in entries {
        print_entry(entry);
    }

    if !browser.favorites().is_empty() {
        println!();
        println!("Favourites:");
        let favorites: Vec<ServerIdentity> = browser.favorites().iter().cloned().collect();
        for mut identity in favorites {
            let status = browser
                .known_status(&identity)
                .map(|snapshot| format!("{:?}", snapshot.online_status()))
                .unwrap_or_else(|| "unknown".to_string());
            let address = browser.poll_join_address(&mut identity);
            println!("  {:<32} {:<12} {:?}", identity.to_string(), status, address);
        }
    }

    Ok(())
}
