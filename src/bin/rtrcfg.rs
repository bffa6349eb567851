//! Offline tool for configuration files: check, show, diff and commit order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use router_manager::config::{compute_delta_and_deletion, parse_config, ConfigTree, RenderOptions};
use router_manager::modules::{find_changed_modules, order_modules};
use router_manager::persistence::read_config_file;
use router_manager::template::{load_schema, SchemaTree};

#[derive(Parser)]
#[command(name = "rtrcfg")]
#[command(about = "Inspect router configuration files against a schema", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "etc/templates.toml")]
    schema: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a configuration file
    Check { file: PathBuf },
    /// Print a configuration file in canonical form
    Show {
        file: PathBuf,
        #[arg(long)]
        json: bool,
        /// Mark uncommitted nodes as the daemon's `show` does
        #[arg(long)]
        annotated: bool,
        /// Leave out values equal to their schema default
        #[arg(long)]
        suppress_defaults: bool,
    },
    /// Print the edits that take OLD to NEW
    Diff { old: PathBuf, new: PathBuf },
    /// Print the order modules would be committed in to apply a file
    Order { file: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let schema = Arc::new(load_schema(&cli.schema)?);

    match cli.command {
        Commands::Check { file } => {
            let tree = load(&schema, &file)?;
            tree.check_config_tree()?;
            println!("{}: OK ({} nodes)", file.display(), tree.node_count());
        }
        Commands::Show { file, json, annotated, suppress_defaults } => {
            let tree = load(&schema, &file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree.to_json())?);
            } else {
                print!("{}", tree.render(RenderOptions { annotate: annotated, suppress_defaults }));
            }
        }
        Commands::Diff { old, new } => {
            let old = load(&schema, &old)?;
            let new = load(&schema, &new)?;
            let (delta, deletion) = compute_delta_and_deletion(&old, &new);
            println!("# changes");
            print!("{}", delta.render(RenderOptions::default()));
            println!("# deletions");
            print!("{}", deletion.render(RenderOptions::default()));
        }
        Commands::Order { file } => {
            let tree = load(&schema, &file)?;
            let changed = find_changed_modules(&tree);
            for module in order_modules(&changed, schema.as_ref())? {
                println!("{module}");
            }
        }
    }

    Ok(())
}

fn load(schema: &Arc<SchemaTree>, path: &Path) -> Result<ConfigTree, Box<dyn std::error::Error>> {
    let (text, user) = read_config_file(path)?;
    let mut tree = parse_config(Arc::clone(schema), &text, user)?;
    tree.add_default_children(user);
    Ok(tree)
}
