use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Site config (YAML). Compiled defaults are used when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the live catalog and write it as the fallback snapshot.
    FetchListings(FetchListingsArgs),
    /// Print the catalog the service would serve right now.
    Listings(ListingsArgs),
    /// Show which category the rules assign to the given labels.
    Categorize(CategorizeArgs),
}

#[derive(Debug, Args)]
pub struct FetchListingsArgs {
    /// Output snapshot path. Defaults to the configured fallback snapshot,
    /// which is always overwritten.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Overwrite an existing `--out` file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ListingsArgs {
    /// Only listings in this category.
    #[arg(long)]
    pub category: Option<String>,

    /// Case-insensitive search over title, description and tags.
    #[arg(long)]
    pub query: Option<String>,

    /// Print one listing (with related items) by slug.
    #[arg(long)]
    pub slug: Option<String>,

    /// Emit JSON instead of a table.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CategorizeArgs {
    /// Tag (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Material (repeatable).
    #[arg(long = "material")]
    pub materials: Vec<String>,

    /// Shop section label.
    #[arg(long)]
    pub section: Option<String>,
}
