use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vrmat_bridge::config::BridgeConfig;
use vrmat_bridge::operations::{export_snapshot, snapshot};
use vrmat_bridge::{Container, VrmatLibrary};

#[derive(Parser)]
#[command(name = "vrmat", version, about = "Inspect and edit vrmat material containers")]
struct Cli {
    /// Path to the native vrmat library
    #[arg(long, global = true, env = "VRMAT_LIBRARY")]
    library: Option<PathBuf>,

    /// Layout version used when saving
    #[arg(long, global = true, env = "VRMAT_SAVE_VERSION", default_value_t = 0)]
    save_version: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the document-level metadata
    Info { file: PathBuf },
    /// Print every plugin and parameter as JSON
    Dump { file: PathBuf },
    /// Add a plugin and save the result
    AddPlugin {
        file: PathBuf,
        name: String,
        #[arg(value_name = "TYPE")]
        plugin_type: String,
        class: String,
        /// Write to this file instead of overwriting the input
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write snapshot.json into a directory
    Export { file: PathBuf, dir: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = BridgeConfig {
        library_path: cli.library,
        save_version: cli.save_version,
    };
    let library = Arc::new(config.load_library().with_context(|| {
        format!("Failed to load native library {:?}", config.resolve_library_path())
    })?);

    match cli.command {
        Command::Info { file } => {
            let container = open(&library, &file)?;
            let root = container.root_meta()?;
            println!("File:     {}", file.display());
            println!("Tag:      {}", root.tag.as_deref().unwrap_or("-"));
            println!("Version:  {}", root.version);
            println!("Category: {}", root.category.as_deref().unwrap_or("-"));
            println!("Plugins:  {}", container.plugins()?.entries().count());
        }
        Command::Dump { file } => {
            let container = open(&library, &file)?;
            let dump = snapshot(&container)?;
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        Command::AddPlugin {
            file,
            name,
            plugin_type,
            class,
            out,
        } => {
            let mut container = open(&library, &file)?;
            let id = container.add_plugin(&name, &plugin_type, &class)?;
            let target = out.unwrap_or(file);
            container
                .save(&target, config.save_version)
                .with_context(|| format!("Failed to save {:?}", target))?;
            println!("Added '{}' as {} to {}", name, id, target.display());
        }
        Command::Export { file, dir } => {
            let container = open(&library, &file)?;
            let path = export_snapshot(&container, &dir)?;
            println!("Exported to {}", path.display());
        }
    }

    Ok(())
}

fn open(library: &Arc<VrmatLibrary>, file: &Path) -> Result<Container> {
    Container::open(library.clone(), file).with_context(|| format!("Failed to open {:?}", file))
}
