use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use concept_mapper_core::db::{TermFilter, VocabularyTermSource};
use concept_mapper_core::logging::init_logging;
use concept_mapper_core::search::{CandidateRetriever, HecateSearcher};
use concept_mapper_core::terms::download_terms;
use concept_mapper_core::verbatim::{IndexSettings, VerbatimMapper};
use concept_mapper_core::{Config, Database};

#[derive(Parser)]
#[command(name = "concept-mapper", about = "Map clinical terms to standard concepts")]
struct Cli {
    /// Configuration file (default: config.yaml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export vocabulary terms from a SQLite database into Parquet batch files
    DownloadTerms {
        /// Vocabulary database
        #[arg(long)]
        database: PathBuf,
    },
    /// Build the verbatim index snapshot (no-op if it already exists)
    BuildIndex,
    /// Look up terms in the verbatim index
    Lookup {
        terms: Vec<String>,
    },
    /// Search candidate concepts
    Search {
        term: String,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        /// Vocabulary database; the Hecate API is used when omitted
        #[arg(long)]
        database: Option<PathBuf>,
        #[arg(long, default_value = concept_mapper_core::search::DEFAULT_HECATE_URL)]
        hecate_url: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(None),
    }
    .context("loading configuration")?;

    let log_file = config.log_folder().join("concept-mapper.log");
    init_logging(Some(&log_file)).context("initializing logging")?;

    match cli.command {
        Command::DownloadTerms { database } => {
            let db = Database::open(&database)
                .with_context(|| format!("opening {}", database.display()))?;
            let source = VocabularyTermSource::new(&db, TermFilter::from(&config.verbatim_mapping));
            let files = download_terms(&source, &config.terms_folder(), config.download_batch_size())?;
            println!("Wrote {} term files to {}", files.len(), config.terms_folder().display());
        }
        Command::BuildIndex => {
            let mapper = VerbatimMapper::load_or_build(&IndexSettings::from_config(&config))?;
            println!("Index ready: {} normalized terms", mapper.index().len());
        }
        Command::Lookup { terms } => {
            let mapper = VerbatimMapper::load_or_build(&IndexSettings::from_config(&config))?;
            for result in mapper.map_terms(&terms) {
                println!("{}\t{}\t{}", result.term, result.concept_id, result.concept_name);
            }
        }
        Command::Search {
            term,
            limit,
            database,
            hecate_url,
        } => {
            let retriever: Box<dyn CandidateRetriever> = match database {
                Some(path) => Box::new(Database::open(&path)?),
                None => Box::new(HecateSearcher::new(hecate_url)?),
            };
            for hit in retriever.search(&term, limit).unwrap_or_default() {
                println!(
                    "{}\t{}\t{}\t{:.3}",
                    hit.concept_id,
                    hit.concept_name,
                    hit.vocabulary_id.unwrap_or_default(),
                    hit.score.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
