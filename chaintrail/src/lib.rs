pub mod handlers;

pub use handlers::{handle_crawl, handle_enrich, handle_stats, load_seeds_from_file, run_crawl};

// Re-export report helpers from chaintrail-core
pub use chaintrail_core::crawl::{
    CrawlConfig, CrawlProgressCallback, CrawlSummary, generate_crawl_report,
    generate_graph_report,
};
