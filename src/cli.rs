//! CLI argument parsing and command definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Room dashboard for Home Assistant
#[derive(Debug, Parser)]
#[command(
    name = "roomdeck",
    author,
    version,
    about = "Room dashboard for Home Assistant",
    propagate_version = true,
    after_help = "Use 'roomdeck <command> --help' for more information about a command."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Command,
}

/// Global options available to all commands
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Output format (json, yaml, table, auto)
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        global = true,
        conflicts_with = "json"
    )]
    pub output_format: Option<OutputFormat>,

    /// Output as JSON (shorthand for -o json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Home Assistant server URL
    #[arg(short = 's', long, env = "HASS_SERVER", global = true)]
    pub server: Option<String>,

    /// Long-lived access token
    #[arg(long, env = "HASS_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Request and sync timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Skip SSL certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Override config file path
    #[arg(long, value_name = "PATH", env = "ROOMDECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase logging verbosity (stackable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long, global = true)]
    pub trace: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Hide table headers
    #[arg(long, global = true)]
    pub no_headers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[non_exhaustive]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
    Auto,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List rooms with a summary of each
    Rooms(RoomsArgs),

    /// Show the devices in one room
    Room {
        /// Room name or area id
        name: String,

        /// Include hidden devices
        #[arg(long)]
        all: bool,
    },

    /// Stream state changes as they happen
    Watch {
        /// Only show changes in this room
        #[arg(long)]
        room: Option<String>,
    },

    /// Toggle a device the way tapping its tile would
    Toggle {
        /// Entity id, name, or room/name
        target: String,
    },

    /// Turn a device on
    On { target: String },

    /// Turn a device off
    Off { target: String },

    /// Set light brightness
    #[command(after_help = "Pass '-' to read one percentage per line from stdin; \
                            values are debounced like a slider drag.")]
    Dim {
        /// Light entity id or name
        target: String,

        /// Brightness percent (0 turns the light off), or '-' for stdin
        value: String,
    },

    /// Manage the manual display order
    Order {
        #[command(subcommand)]
        command: OrderCommand,
    },

    /// Hide a room or device from the dashboard
    Hide(VisibilityArgs),

    /// Show a hidden room or device again
    Unhide(VisibilityArgs),

    /// Save server URL and access token after checking them
    Setup {
        /// Store the credentials without probing the server
        #[arg(long)]
        skip_check: bool,
    },

    /// Choose which entity domains appear on the dashboard
    Domains {
        #[command(subcommand)]
        command: DomainsCommand,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct RoomsArgs {
    /// Group rooms by floor
    #[arg(long)]
    pub floors: bool,

    /// Include hidden rooms and devices
    #[arg(long)]
    pub all: bool,

    /// List devices that are not in any room
    #[arg(long, conflicts_with = "floors")]
    pub unassigned: bool,
}

#[derive(Debug, Args)]
pub struct VisibilityArgs {
    /// Entity id or name; with --area a room name
    pub target: String,

    /// Target a room instead of a device
    #[arg(long)]
    pub area: bool,
}

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    /// Show order values of rooms, or of the devices in a room
    Get {
        /// Room to list devices of
        room: Option<String>,
    },

    /// Set the order value of a room or device
    Set {
        target: String,

        /// New order value (1-9999)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=9999))]
        value: u32,

        /// Target a room instead of a device
        #[arg(long)]
        area: bool,
    },

    /// Move a room or device to a position in its list
    Move {
        target: String,

        /// 1-based position
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        position: u64,

        /// Target a room instead of a device
        #[arg(long)]
        area: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum DomainsCommand {
    /// Show the enabled domains
    Show,

    /// Replace the enabled domains
    Set {
        /// Domains to show, e.g. light switch climate
        #[arg(required_unless_present_any = ["all", "defaults"])]
        domains: Vec<String>,

        /// Show every domain
        #[arg(long, conflicts_with = "defaults")]
        all: bool,

        /// Restore the default domain list
        #[arg(long)]
        defaults: bool,

        /// Show hidden rooms and devices by default
        #[arg(long)]
        show_hidden: Option<bool>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Get a configuration value
    Get {
        /// Configuration key (dot-separated path)
        key: Option<String>,
    },

    /// Reset configuration to defaults
    Reset,
}
