use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("chaintrail")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("chaintrail")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and progress output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("crawl")
                .about(
                    "Follow the money from a list of seed addresses and record every \
                transaction and counterparty in the graph store.",
                )
                .arg(
                    arg!(<SEED_FILE>)
                        .help("Path to a newline-delimited file of seed addresses")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(<DEPTH>)
                        .help("How many hops to follow away from each seed")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true),
                )
                .arg(
                    arg!(-w --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of crawl jobs allowed to run at once.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                )
                .arg(
                    arg!(--"dry-run")
                        .required(false)
                        .help("Crawl into an in-memory graph and only print the totals")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("enrich")
                .about("Tag crawled addresses with entity attributions from an external service")
                .arg(
                    arg!(-b --"batch-size" <SIZE>)
                        .required(false)
                        .help("Addresses per request to the attribution service")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5000"),
                ),
        )
        .subcommand(
            command!("stats")
                .about("Print node and edge counts of the graph store")
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the counts as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_crawl_arguments() {
        let matches = command_argument_builder()
            .try_get_matches_from(["chaintrail", "crawl", "seeds.txt", "3"])
            .unwrap();
        let (name, crawl) = matches.subcommand().unwrap();
        assert_eq!(name, "crawl");
        assert_eq!(
            crawl.get_one::<PathBuf>("SEED_FILE"),
            Some(&PathBuf::from("seeds.txt"))
        );
        assert_eq!(crawl.get_one::<i64>("DEPTH"), Some(&3));
        assert_eq!(crawl.get_one::<usize>("workers"), Some(&50));
        assert!(!crawl.get_flag("dry-run"));
    }

    #[test]
    fn test_crawl_options() {
        let matches = command_argument_builder()
            .try_get_matches_from(["chaintrail", "-q", "crawl", "seeds.txt", "2", "-w", "8", "--dry-run"])
            .unwrap();
        assert!(matches.get_flag("quiet"));
        let (_, crawl) = matches.subcommand().unwrap();
        assert_eq!(crawl.get_one::<usize>("workers"), Some(&8));
        assert!(crawl.get_flag("dry-run"));
    }

    #[test]
    fn test_crawl_requires_depth() {
        let result = command_argument_builder().try_get_matches_from(["chaintrail", "crawl", "seeds.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_crawl_rejects_non_integer_depth() {
        let result =
            command_argument_builder().try_get_matches_from(["chaintrail", "crawl", "seeds.txt", "deep"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_enrich_batch_size() {
        let matches = command_argument_builder()
            .try_get_matches_from(["chaintrail", "enrich", "--batch-size", "100"])
            .unwrap();
        let (_, enrich) = matches.subcommand().unwrap();
        assert_eq!(enrich.get_one::<usize>("batch-size"), Some(&100));
    }
}
