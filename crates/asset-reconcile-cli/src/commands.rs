use asset_reconcile_core::config::ConflictScope;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "asset-reconcile")]
#[command(about = "Reconcile a media tree with the asset store that references it", long_about = None)]
pub struct Cli {
    /// Content root to reconcile
    #[arg(required_unless_present = "print_config")]
    pub root: Option<PathBuf>,

    /// Plan only and write reports (default)
    #[arg(long, conflicts_with = "execute")]
    pub dry_run: bool,

    /// Apply the plan to the tree and the store
    #[arg(long)]
    pub execute: bool,

    /// Worker threads for scanning, hashing and classification
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Configuration file (default: Reconcile.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Asset store database (overrides RECONCILE_ASSET_STORE)
    #[arg(long)]
    pub store: Option<String>,

    /// Directory reports are written to
    #[arg(long)]
    pub report_dir: Option<String>,

    /// How far canonical names must be unique
    #[arg(long, value_enum)]
    pub scope: Option<ScopeArg>,

    /// Delete store records whose file is gone and cannot be matched
    #[arg(long)]
    pub prune_orphans: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Tree,
    Directory,
}

impl From<ScopeArg> for ConflictScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Tree => ConflictScope::Tree,
            ScopeArg::Directory => ConflictScope::Directory,
        }
    }
}
