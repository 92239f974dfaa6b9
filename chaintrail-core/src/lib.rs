pub mod config;
pub mod crawl;
pub mod data;
pub mod enrich;
pub mod error;
pub mod memory;
pub mod model;
pub mod store;

use colored::Colorize;

pub use config::Config;
pub use crawl::{CrawlConfig, CrawlSummary, JobOutcome, Scheduler};
pub use data::{RunStatus, SqliteGraphStore};
pub use enrich::{EnrichmentClient, EnrichmentSummary, run_enrichment};
pub use error::{ConfigError, EnrichError, StoreError, StoreResult};
pub use memory::MemoryGraphStore;
pub use model::{AddressLabel, GraphStats, TransactionRecord};
pub use store::{GraphSession, GraphStore};

pub fn print_banner() {
    let banner = r#"
       _           _       _             _ _
   ___| |__   __ _(_)_ __ | |_ _ __ __ _(_) |
  / __| '_ \ / _` | | '_ \| __| '__/ _` | | |
 | (__| | | | (_| | | | | | |_| | | (_| | | |
  \___|_| |_|\__,_|_|_| |_|\__|_|  \__,_|_|_|
"#;
    println!("{}", banner.bright_cyan());
    println!(
        "  {} {}\n",
        "follow the money, one hop at a time".dimmed(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
