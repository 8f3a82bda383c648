//! CLI argument definitions for the slugtree binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Manage a multi-language slug tree stored in a SQLite file
#[derive(Parser, Debug)]
#[command(name = "slugtree")]
#[command(version)]
pub struct Cli {
    /// Database file
    #[arg(short, long, default_value = "slugtree.db", env = "SLUGTREE_DATABASE")]
    pub database: PathBuf,

    /// Tree configuration (JSON); defaults plus SLUGTREE_* variables if omitted
    #[arg(short, long, env = "SLUGTREE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Language paths are given in (the configured default if omitted)
    #[arg(short, long)]
    pub language: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and the root node
    Init,
    /// Add a child node
    Add(AddArgs),
    /// Print the tree below a path
    Tree {
        /// Path to start from
        #[arg(default_value = "")]
        path: String,
    },
    /// Change the slug of a node
    Rename {
        /// Path of the node
        path: String,
        /// New slug
        slug: String,
        /// Rename in every configured language instead of just --language
        #[arg(long)]
        all_languages: bool,
    },
    /// Move or copy a node below another node
    Paste {
        /// Path of the node to paste
        source: String,
        /// Path of the new parent
        target: String,
        /// Copy instead of move
        #[arg(long)]
        copy: bool,
    },
    /// Write a subtree to a JSON file
    Export {
        /// Path of the subtree root
        path: String,
        /// Output file
        file: PathBuf,
    },
    /// Load a JSON export below a node
    Import {
        /// Path of the node to import into
        path: String,
        /// Input file
        file: PathBuf,
    },
}

/// Arguments for the add command
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Path of the parent node
    pub parent: String,

    /// Slug, either `slug` for every language or `en=about,nl=over`
    pub slug: String,

    /// Insert right after this sibling slug
    #[arg(long, conflicts_with_all = ["before", "position"])]
    pub after: Option<String>,

    /// Insert right before this sibling slug
    #[arg(long, conflicts_with = "position")]
    pub before: Option<String>,

    /// Explicit position
    #[arg(long, allow_negative_numbers = true)]
    pub position: Option<i64>,
}
