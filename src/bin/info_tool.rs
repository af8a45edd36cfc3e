use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use infobase::info::sanitize_code_name;
use infobase::{EngineConfig, InfoSnapshot, TypeInfo, TypeRegistry};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "info-tool")]
#[command(about = "Developer tooling for the infobase object engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in object types and their column roles.
    Types,
    /// Validate an engine configuration and print it with defaults filled in.
    Config {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a MessagePack object snapshot as JSON.
    DumpSnapshot { path: PathBuf },
    /// Turn free text into a valid code name.
    CodeName {
        text: String,
        #[arg(long)]
        max_length: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Types => print_types(TypeRegistry::global()),
        Command::Config { file } => print_config(file.as_deref()),
        Command::DumpSnapshot { path } => dump_snapshot(&path),
        Command::CodeName { text, max_length } => {
            let max_length = max_length.unwrap_or(EngineConfig::default().code_name_max_length);
            let name = sanitize_code_name(&text, max_length);
            if name.is_empty() {
                return Err(anyhow!("'{}' contains no usable code name characters", text));
            }
            println!("{}", name);
            Ok(())
        }
    }
}

fn print_types(registry: &TypeRegistry) -> Result<()> {
    for type_info in registry.types() {
        println!("{}", type_info.object_type);
        for (role, column) in roles(&type_info) {
            println!("  {:<12} {}", role, column);
        }
        let columns: Vec<&str> = type_info.schema.column_names().collect();
        println!("  {:<12} {}", "columns", columns.join(", "));
    }
    Ok(())
}

fn roles(type_info: &TypeInfo) -> Vec<(&'static str, &str)> {
    [
        ("id", &type_info.id_column),
        ("guid", &type_info.guid_column),
        ("code name", &type_info.code_name_column),
        ("display name", &type_info.display_name_column),
        ("parent", &type_info.parent_id_column),
        ("site", &type_info.site_id_column),
        ("modified", &type_info.last_modified_column),
    ]
    .into_iter()
    .filter_map(|(role, column)| column.as_deref().map(|c| (role, c)))
    .collect()
}

fn print_config(file: Option<&Path>) -> Result<()> {
    let config = match file {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn dump_snapshot(path: &Path) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot = InfoSnapshot::from_bytes(&bytes)
        .with_context(|| format!("failed to decode snapshot {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
