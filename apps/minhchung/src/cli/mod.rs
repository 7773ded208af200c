//! # minhchung CLI Module
//!
//! Commands run directly against the local database, except `server`.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create an empty database
//! - `status` - Registry statistics
//! - `department add|list|deactivate`, `criterion add|list|deactivate`
//! - `generate`, `list`, `show`, `update`, `delete` - Evidence codes
//! - `backup`, `restore` - Snapshot files
//! - `verify` - Integrity audit (exits non-zero on violations)

mod commands;

use crate::config::Config;
use crate::error::AppError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// minhchung - evidence-code registry
///
/// Issues codes of the form MC-{DEPT}-{CRITERION}-{SEQ}-{YEAR}-{MONTH} with
/// gap-free numbering per department, criterion and month.
#[derive(Parser, Debug)]
#[command(name = "minhchung")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to minhchung.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the registry database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// User id recorded on codes generated from the CLI
    #[arg(long, global = true, default_value_t = 0)]
    pub user_id: u64,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show registry statistics
    Status,

    /// Manage departments
    Department {
        #[command(subcommand)]
        action: ReferenceAction,
    },

    /// Manage criteria
    Criterion {
        #[command(subcommand)]
        action: ReferenceAction,
    },

    /// Issue the next evidence code
    Generate {
        /// Department id
        #[arg(short, long)]
        department: u64,

        /// Criterion id
        #[arg(short = 'C', long)]
        criterion: u64,

        /// Free-text description
        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// List evidence codes, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long, default_value_t = 10)]
        limit: u32,

        #[arg(long)]
        department: Option<u64>,

        #[arg(long)]
        criterion: Option<u64>,

        #[arg(long)]
        year: Option<u16>,

        #[arg(long)]
        month: Option<u8>,

        /// Substring of the code or description
        #[arg(short, long)]
        search: Option<String>,

        /// Only active (true) or inactive (false) codes
        #[arg(long)]
        active: Option<bool>,
    },

    /// Show one evidence code by id or code string
    Show { target: String },

    /// Change the description and/or active flag of a code
    Update {
        id: u64,

        /// New description; an empty string clears it
        #[arg(short = 'm', long)]
        description: Option<String>,

        #[arg(long)]
        active: Option<bool>,
    },

    /// Soft delete a code (its number stays taken)
    Delete { id: u64 },

    /// Write a snapshot of the registry to a file
    Backup {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Replace the registry with a snapshot file
    Restore {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Audit bucket numbering and indexes
    Verify,
}

/// Subcommands shared by departments and criteria.
#[derive(Subcommand, Debug)]
pub enum ReferenceAction {
    /// Create a new entry
    Add {
        /// Code used inside evidence codes (A-Z, 0-9, '.')
        code: String,

        /// Display name
        name: String,

        /// Accreditation standard (criteria only)
        #[arg(long)]
        standard: Option<String>,
    },

    /// List all entries
    List,

    /// Stop new codes from being issued under an entry
    Deactivate { id: u64 },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    let ctx = Context {
        config,
        json_mode: cli.json_mode,
        user_id: cli.user_id,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let mut config = ctx.config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Department { action }) => cmd_department(&ctx, action),
        Some(Commands::Criterion { action }) => cmd_criterion(&ctx, action),
        Some(Commands::Generate {
            department,
            criterion,
            description,
        }) => cmd_generate(&ctx, department, criterion, description),
        Some(Commands::List {
            page,
            limit,
            department,
            criterion,
            year,
            month,
            search,
            active,
        }) => {
            let query = crate::api::ListQuery {
                page: Some(page),
                limit: Some(limit),
                department_id: department,
                criterion_id: criterion,
                year,
                month,
                search,
                is_active: active,
            };
            cmd_list(&ctx, &query)
        }
        Some(Commands::Show { target }) => cmd_show(&ctx, &target),
        Some(Commands::Update {
            id,
            description,
            active,
        }) => cmd_update(&ctx, id, description, active),
        Some(Commands::Delete { id }) => cmd_delete(&ctx, id),
        Some(Commands::Backup { output }) => cmd_backup(&ctx, &output),
        Some(Commands::Restore { input }) => cmd_restore(&ctx, &input),
        Some(Commands::Verify) => cmd_verify(&ctx),
    }
}
