use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set proxy
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a source package from its descriptor
    #[command(arg_required_else_help = true)]
    Build {
        /// Path to the package descriptor
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        descriptor: String,

        /// Directory holding the source, build and install trees
        #[arg(required = false, short, long, value_hint = ValueHint::DirPath)]
        work_dir: Option<String>,

        /// Stages to run, in order
        #[arg(required = false, short, long, num_args = 1.., default_values = ["prepare", "build", "install"])]
        stage: Vec<String>,

        /// Reuse an already unpacked source tree
        #[arg(required = false, long)]
        skip_unpack: bool,

        /// Don't apply patches
        #[arg(required = false, long)]
        skip_patch: bool,
    },

    /// List the build dependencies of a source package
    #[command(arg_required_else_help = true)]
    Deps {
        /// Path to the package descriptor
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        descriptor: String,
    },

    /// Update the package index of a repository
    #[command(arg_required_else_help = true)]
    Index {
        /// Repository directory
        #[arg(required = true, value_hint = ValueHint::DirPath)]
        repo: String,

        /// Re-extract every package instead of reusing the published index
        #[arg(required = false, short, long)]
        force_full: bool,
    },

    /// Download a URL to a file
    #[command(arg_required_else_help = true)]
    Fetch {
        /// URL to download
        #[arg(required = true)]
        url: String,

        /// Output file; defaults to the last path segment of the URL
        #[arg(required = false, short, long, value_hint = ValueHint::FilePath)]
        output: Option<String>,

        /// Print the SHA-256 digest of the downloaded content
        #[arg(required = false, long)]
        sha256: bool,
    },

    /// Print the change-detection tag of a URL
    #[command(arg_required_else_help = true)]
    Tag {
        /// URL to check for changes
        #[arg(required = true)]
        url: String,
    },

    /// Print the effective configuration
    Config,
}
